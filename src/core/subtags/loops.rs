use log::trace;

use super::{integer, resolve_array};
use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::core::limits::LimitKey;
use crate::errors::{BBTagError, EngineError, ErrorKind};

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("repeat", SubtagCategory::Loops)
            .alias("loop")
            .description("Runs code a number of times.")
            .signature(&["~code", "amount"], "Evaluates `code` `amount` times and joins the output.", repeat)
            .build()?,
        SubtagDefinition::builder("foreach", SubtagCategory::Loops)
            .description("Runs code once per element of an array.")
            .signature(
                &["variable", "array", "~code"],
                "Sets `variable` to each element in turn and evaluates `code`. The variable is restored afterwards.",
                foreach,
            )
            .build()?,
    ])
}

/// Runs `body` once per item. Before each iteration the loop stops if the
/// execution has left the running state and counts against the loop limit.
pub fn drive_loop<'e, I, F>(ctx: &mut BBTagContext<'e>, items: I, mut body: F) -> Result<String, BBTagError>
where
    I: IntoIterator,
    F: FnMut(&mut BBTagContext<'e>, I::Item) -> Result<String, BBTagError>,
{
    let mut output = String::new();
    for item in items {
        if !ctx.is_running() {
            trace!("Loop stopped early ({:?})", ctx.state());
            break;
        }
        ctx.check_limit(LimitKey::Loops)?;
        output.push_str(&body(ctx, item)?);
    }
    Ok(output)
}

fn repeat(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 1);
    let amount = integer(ctx, &text)?;
    if amount < 0 {
        return Err(BBTagError::new(ErrorKind::TypeMismatch, "Can't be negative"));
    }

    let Some(code) = args.get(0) else {
        return Ok(None);
    };
    drive_loop(ctx, 0..amount, |ctx, _| Ok(code.wait(ctx))).map(Some)
}

fn foreach(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let variable = args.value(ctx, 0);
    let source = args.value(ctx, 1);
    let array = resolve_array(ctx, &source)?;
    let Some(code) = args.get(2) else {
        return Ok(None);
    };

    let previous = ctx.get_variable(&variable)?;
    let result = drive_loop(ctx, array.items, |ctx, item| {
        ctx.set_variable(&variable, item)?;
        Ok(code.wait(ctx))
    });
    // Runs even after an error or cancellation.
    let restored = ctx.restore_variable(&variable, previous);

    let output = result?;
    restored?;
    Ok(Some(output))
}
