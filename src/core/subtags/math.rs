use serde_json::json;

use super::number;
use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::{BBTagError, EngineError, ErrorKind};

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("math", SubtagCategory::Math)
            .description("Folds numbers with an operator.")
            .signature(
                &["operator", "values+"],
                "Applies `operator` (+, -, *, /, %, ^) left to right across `values`.",
                math,
            )
            .build()?,
    ])
}

fn math(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let operator = args.value(ctx, 0);
    let operator = operator.trim();
    let apply: fn(f64, f64) -> f64 = match operator {
        "+" => |a, b| a + b,
        "-" => |a, b| a - b,
        "*" => |a, b| a * b,
        "/" => |a, b| a / b,
        "%" => |a, b| a % b,
        "^" => f64::powf,
        other => {
            return Err(BBTagError::new(ErrorKind::TypeMismatch, "Invalid operator")
                .with_detail(json!({ "operator": other })));
        }
    };

    let mut numbers = Vec::new();
    for value in args.values(ctx, 1) {
        numbers.push(number(ctx, &value)?);
    }
    let Some((first, rest)) = numbers.split_first() else {
        return Ok(None);
    };
    let result = rest.iter().fold(*first, |acc, n| apply(acc, *n));
    if !result.is_finite() {
        return Err(BBTagError::new(ErrorKind::TypeMismatch, "Result is not a finite number"));
    }
    Ok(Some(format_number(result)))
}

/// Whole numbers print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
