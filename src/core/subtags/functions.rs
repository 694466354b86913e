use log::debug;
use serde_json::{Value, json};

use super::integer;
use crate::core::binder::BoundArgs;
use crate::core::context::{BBTagContext, RuntimeState, ScopeFrame};
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::{BBTagError, EngineError, ErrorKind};

const CALL_PREFIX: &str = "func.";

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("function", SubtagCategory::Functions)
            .alias("func")
            .description("Defines a function for the rest of the execution.")
            .signature(&["name", "!code"], "Stores `code` so that `{func.name}` runs it.", define)
            .build()?,
        SubtagDefinition::builder(CALL_PREFIX, SubtagCategory::Functions)
            .prefix()
            .description("Calls a function defined with `{function}`.")
            .signature(&["args*"], "Runs the function body in a new scope with `args` as its parameters.", call)
            .build()?,
        SubtagDefinition::builder("params", SubtagCategory::Functions)
            .description("Reads the arguments of the current function call.")
            .signature(&[], "Returns every parameter as an array.", all_params)
            .signature(&["index"], "Returns the parameter at the zero-based `index`.", param)
            .build()?,
    ])
}

fn define(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let name = args.value(ctx, 0);
    let name = name.trim().to_lowercase();
    let name = name.strip_prefix(CALL_PREFIX).unwrap_or(&name);
    if name.is_empty() {
        return Err(BBTagError::custom("Must provide a name"));
    }

    let Some(body) = args.get(1).and_then(|arg| arg.statement()) else {
        return Ok(None);
    };
    ctx.define_function(name, body.clone());
    Ok(None)
}

/// A function call is the boundary for `{return}`: its scope frame is popped
/// and a non-forced return resumes the caller.
fn call(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let name = ctx.current_name().strip_prefix(CALL_PREFIX).unwrap_or_default().to_string();
    let body = ctx.function(&name).ok_or_else(|| BBTagError::not_found("function", &name))?;
    let params = args.values(ctx, 0);
    debug!("Calling function '{}' with {} parameter(s)", name, params.len());

    let parent = ctx.scope();
    let frame = ScopeFrame { quiet: parent.quiet, fallback: parent.fallback.clone(), params, ..ScopeFrame::default() };
    ctx.push_scope(frame);
    let output = ctx.eval(&body);
    ctx.pop_scope();

    if ctx.state() == RuntimeState::Returning {
        ctx.set_state(RuntimeState::Running);
    }
    Ok(Some(output))
}

fn all_params(ctx: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
    let params: Vec<Value> = ctx.scope().params.iter().cloned().map(Value::String).collect();
    Ok(Some(Value::Array(params).to_string()))
}

fn param(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let index = integer(ctx, &text)?;
    let params = &ctx.scope().params;
    usize::try_from(index).ok().and_then(|i| params.get(i)).cloned().map(Some).ok_or_else(|| {
        BBTagError::new(ErrorKind::NotFound, "Index out of range")
            .with_detail(json!({ "index": index, "params": params.len() }))
    })
}

#[cfg(test)]
mod tests {
    use crate::config::LimitConfig;
    use crate::core::context::ExecutionRequest;
    use crate::core::engine::Termination;
    use crate::core::subtags::testing::{engine, output, run};
    use crate::errors::ErrorKind;

    #[test]
    fn defines_and_calls_functions() {
        assert_eq!(output("{function;greet;Hello {params;0}!}{func.greet;Ann}"), "Hello Ann!");
        assert_eq!(output("{func;func.twice;{params;0}{params;0}}{func.TWICE;ab}"), "abab");
        assert_eq!(output("{function;all;{params}}{func.all;a;b}"), r#"["a","b"]"#);
    }

    #[test]
    fn bodies_are_not_run_at_definition() {
        assert_eq!(output("{function;f;{set;~x;1}}{get;~x}"), "");
    }

    #[test]
    fn temporaries_are_call_local() {
        assert_eq!(output("{set;~x;outer}{function;f;{set;~x;inner}{get;~x}}{func.f}|{get;~x}"), "inner|outer");
    }

    #[test]
    fn return_stops_at_the_function_boundary() {
        let result = run(&engine(), "{function;f;a{return}b}{func.f}c");
        assert_eq!(result.output, "ac");
        assert_eq!(result.termination, Termination::Completed);
    }

    #[test]
    fn forced_return_escapes_functions() {
        let result = run(&engine(), "{function;f;a{return;true}b}{func.f}c");
        assert_eq!(result.output, "a");
        assert_eq!(result.termination, Termination::Aborted);
    }

    #[test]
    fn unknown_functions_and_params() {
        assert_eq!(output("{func.missing}after"), "`No function found`after");
        assert_eq!(output("{params;0}"), "`Index out of range`");
    }

    #[test]
    fn runaway_recursion_hits_the_depth_limit() {
        let limits = LimitConfig { max_depth: 20, ..LimitConfig::default() };
        let request = ExecutionRequest::new("test").limits(limits);
        let result = engine().execute("{function;f;{func.f}}{func.f}", request);
        let error = result.errors.last().unwrap();
        assert_eq!(error.error.kind, ErrorKind::ResourceLimit);
        assert_eq!(result.termination, Termination::Aborted);
    }
}
