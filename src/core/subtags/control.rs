use log::debug;
use serde_json::json;

use super::{boolean, integer, number};
use crate::core::binder::BoundArgs;
use crate::core::context::{BBTagContext, RuntimeState};
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::{BBTagError, EngineError, ErrorKind};

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("if", SubtagCategory::Control)
            .description("Runs one of two branches. Only the selected branch is evaluated.")
            .signature(&["condition", "~then", "~else?"], "Runs `then` if `condition` is true, else `else`.", if_bool)
            .signature(
                &["left", "operator", "right", "~then", "~else?"],
                "Compares `left` and `right` with `operator` (==, !=, <, <=, >, >=, startswith, endswith, includes).",
                if_compare,
            )
            .build()?,
        SubtagDefinition::builder("choose", SubtagCategory::Control)
            .description("Runs the choice at a zero-based index.")
            .signature(&["index", "~choices+"], "Evaluates only `choices[index]`.", choose)
            .build()?,
        SubtagDefinition::builder("randchoose", SubtagCategory::Control)
            .description("Runs one choice picked at random.")
            .signature(&["~choices+"], "Evaluates one random choice.", randchoose)
            .build()?,
        SubtagDefinition::builder("void", SubtagCategory::Control)
            .description("Runs code and discards its output.")
            .signature(&["~code*"], "Evaluates every argument and returns nothing.", void)
            .build()?,
        SubtagDefinition::builder("return", SubtagCategory::Control)
            .description("Stops the current function, or the whole tag when forced.")
            .signature(&["force?"], "Returns from the nearest function, or ends everything if `force` is true.", ret)
            .build()?,
        SubtagDefinition::builder("try", SubtagCategory::Control)
            .description("Runs code and intercepts the errors it raises. Terminal errors still abort.")
            .signature(&["~code", "~catch?"], "Returns `code`, or `catch` if `code` raised an error.", attempt)
            .build()?,
        SubtagDefinition::builder("throw", SubtagCategory::Control)
            .description("Raises a custom error.")
            .signature(&["message?"], "Fails with `message`.", throw)
            .build()?,
    ])
}

fn branch(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>, condition: bool, then: usize) -> SubtagResult {
    let index = if condition { then } else { then + 1 };
    Ok(args.get(index).filter(|arg| arg.is_provided()).map(|arg| arg.value(ctx)))
}

fn if_bool(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let condition = ctx.plugins().booleans().parse_boolean(&text).ok_or_else(|| BBTagError::not_a_boolean(&text))?;
    branch(ctx, args, condition, 1)
}

fn if_compare(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let left = args.value(ctx, 0);
    let operator = args.value(ctx, 1);
    let right = args.value(ctx, 2);
    let condition = compare(ctx, &left, operator.trim(), &right)?;
    branch(ctx, args, condition, 3)
}

/// Numeric comparison when both sides are numbers, text comparison otherwise.
fn compare(ctx: &BBTagContext<'_>, left: &str, operator: &str, right: &str) -> Result<bool, BBTagError> {
    let ordering = match (number(ctx, left), number(ctx, right)) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r),
        _ => Some(left.cmp(right)),
    };
    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match operator {
        "==" => ordering.is_eq(),
        "!=" => ordering.is_ne(),
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        ">=" => ordering.is_ge(),
        "startswith" => left.starts_with(right),
        "endswith" => left.ends_with(right),
        "includes" => left.contains(right),
        other => {
            return Err(BBTagError::new(ErrorKind::TypeMismatch, "Invalid operator")
                .with_detail(json!({ "operator": other })));
        }
    })
}

fn choose(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let index = integer(ctx, &text)?;
    let choices = args.all(1);
    let choice = usize::try_from(index).ok().and_then(|i| choices.get(i)).ok_or_else(|| {
        BBTagError::new(ErrorKind::NotFound, "Index out of range")
            .with_detail(json!({ "index": index, "choices": choices.len() }))
    })?;
    Ok(Some(choice.value(ctx)))
}

fn randchoose(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let choices = args.all(0);
    let index = ctx.plugins().random().index(choices.len());
    Ok(choices.get(index).map(|choice| choice.value(ctx)))
}

fn void(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    for arg in args.all(0) {
        if !ctx.is_running() {
            break;
        }
        arg.value(ctx);
    }
    Ok(None)
}

fn ret(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let force = boolean(ctx, &text, false)?;
    debug!("Return requested (force: {})", force);
    ctx.set_state(if force { RuntimeState::Aborted } else { RuntimeState::Returning });
    Ok(None)
}

fn attempt(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let Some(code) = args.get(0) else {
        return Ok(None);
    };
    match code.try_value(ctx) {
        Ok(output) => Ok(Some(output)),
        Err(caught) => {
            debug!("try intercepted '{}' from {{{}}} at {}", caught.error.message, caught.subtag, caught.range);
            Ok(Some(args.value(ctx, 1)))
        }
    }
}

fn throw(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let message = args.value(ctx, 0);
    if message.is_empty() {
        return Err(BBTagError::custom("A custom error occurred"));
    }
    Err(BBTagError::custom(message))
}

#[cfg(test)]
mod tests {
    use crate::core::engine::Termination;
    use crate::core::subtags::testing::{engine, output, run};
    use crate::errors::ErrorKind;

    #[test]
    fn if_picks_one_branch() {
        assert_eq!(output("{if;true;yes;no}"), "yes");
        assert_eq!(output("{if;false;yes;no}"), "no");
        assert_eq!(output("{if;false;yes}"), "");
        assert_eq!(output("{if;maybe;yes;no}"), "`Not a boolean`");
    }

    #[test]
    fn if_compares() {
        assert_eq!(output("{if;10;>;9;yes;no}"), "yes");
        assert_eq!(output("{if;abc;==;abc;yes;no}"), "yes");
        assert_eq!(output("{if;hello;startswith;he;yes}"), "yes");
        assert_eq!(output("{if;1;~;2;yes;no}"), "`Invalid operator`");
    }

    #[test]
    fn unselected_branches_never_run() {
        let engine = engine();
        let result = run(&engine, "{if;true;{set;~a;then};{set;~b;else}}{get;~a}|{get;~b}");
        assert_eq!(result.output, "then|");

        let result = run(&engine, "{choose;1;{set;~x;a};{set;~x;b};{set;~x;c}}{get;~x}");
        assert_eq!(result.output, "b");
    }

    #[test]
    fn choose_validates_its_index() {
        assert_eq!(output("{choose;a;x;y}"), "`Not a number`");
        assert_eq!(output("{choose;2;x;y}"), "`Index out of range`");
        assert_eq!(output("{choose;-1;x;y}"), "`Index out of range`");
    }

    #[test]
    fn randchoose_uses_the_random_source() {
        assert_eq!(output("{randchoose;first;second}"), "first");
    }

    #[test]
    fn void_discards_output() {
        assert_eq!(output("{void;a;{set;~v;1}}{get;~v}"), "1");
    }

    #[test]
    fn return_ends_the_document() {
        let result = run(&engine(), "a{return}b");
        assert_eq!(result.output, "a");
        assert_eq!(result.termination, Termination::Returned);

        let result = run(&engine(), "a{return;true}b");
        assert_eq!(result.output, "a");
        assert_eq!(result.termination, Termination::Aborted);
    }

    #[test]
    fn try_intercepts_errors() {
        let result = run(&engine(), "{try;a{throw;oops}b;caught}|{try;fine;caught}|{try;{throw}}");
        assert_eq!(result.output, "caught|fine|");
        assert!(result.errors.is_empty());
        assert_eq!(result.termination, Termination::Completed);
    }

    #[test]
    fn try_only_catches_its_own_code() {
        let result = run(&engine(), "{try;x;{throw;late}}{throw;outside}");
        assert_eq!(result.output, "x`outside`");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error.message, "outside");
    }

    #[test]
    fn try_does_not_catch_terminal_errors() {
        let result = run(&engine(), "{try;{nosuchtag};caught}after");
        assert_eq!(result.termination, Termination::Aborted);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error.kind, ErrorKind::UnknownSubtag);
        assert!(!result.output.contains("caught"));
        assert!(!result.output.contains("after"));
    }

    #[test]
    fn throw_is_not_terminal() {
        let result = run(&engine(), "{throw;oops} still here");
        assert_eq!(result.output, "`oops` still here");
        assert_eq!(result.errors[0].error.kind, ErrorKind::Custom);
        assert_eq!(result.termination, Termination::Completed);
    }
}
