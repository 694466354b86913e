use super::boolean;
use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::EngineError;

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("quiet", SubtagCategory::Scope)
            .description("Sets whether lookups in the current scope suppress their error output.")
            .signature(&["value?"], "Sets the quiet flag; an empty `value` means true.", quiet)
            .build()?,
        SubtagDefinition::builder("fallback", SubtagCategory::Scope)
            .description("Sets the text shown in place of failed calls in the current scope.")
            .signature(&[], "Clears the fallback.", clear_fallback)
            .signature(&["value"], "Sets the fallback to `value`.", set_fallback)
            .build()?,
    ])
}

fn quiet(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let value = boolean(ctx, &text, true)?;
    ctx.scope_mut().quiet = Some(value);
    Ok(None)
}

fn clear_fallback(ctx: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
    ctx.scope_mut().fallback = None;
    Ok(None)
}

fn set_fallback(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let value = args.value(ctx, 0);
    ctx.scope_mut().fallback = Some(value);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::core::subtags::testing::{engine, output, run};

    #[test]
    fn fallback_replaces_error_placeholders() {
        let result = run(&engine(), "{fallback;?}{throw;bad}|{fallback}{throw;bad}");
        assert_eq!(result.output, "?|`bad`");
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn empty_fallback_hides_errors() {
        assert_eq!(output("{fallback;}a{math;+;x}b"), "ab");
    }

    #[test]
    fn quiet_flag_is_scoped() {
        assert_eq!(output("{quiet}{function;f;{quiet;false}}{func.f}{userid;nobody}"), "");
        assert_eq!(output("{quiet;maybe}"), "`Not a boolean`");
    }
}
