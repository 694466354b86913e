use log::trace;
use serde_json::Value;

use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::EngineError;
use crate::types::{render_value, text_to_value};

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("get", SubtagCategory::Variables)
            .description("Reads a variable. The prefix of the name picks its scope.")
            .signature(&["name"], "Returns the stored value of `name`, or nothing if it is unset.", get)
            .build()?,
        SubtagDefinition::builder("set", SubtagCategory::Variables)
            .description("Writes a variable. The prefix of the name picks its scope.")
            .signature(
                &["name", "values*"],
                "Resets `name` when no value is given, stores a single value as is and several as an array.",
                set,
            )
            .build()?,
    ])
}

fn get(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let name = args.value(ctx, 0);
    Ok(ctx.get_variable(&name)?.as_ref().map(render_value))
}

fn set(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let name = args.value(ctx, 0);
    let mut values = args.values(ctx, 1);
    trace!("Setting '{}' to {} value(s)", name, values.len());

    match values.len() {
        0 => ctx.reset_variable(&name)?,
        1 => {
            let value = text_to_value(&values.remove(0));
            ctx.set_variable(&name, value)?
        }
        _ => ctx.set_variable(&name, Value::Array(values.into_iter().map(Value::String).collect()))?,
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::core::scope::VariableScope;
    use crate::core::subtags::testing::{engine, output, run};
    use crate::errors::ErrorKind;

    #[test]
    fn set_then_get() {
        assert_eq!(output("{set;x;hello}{get;x}"), "hello");
        assert_eq!(output("{set;x;a;b}{get;x}"), r#"["a","b"]"#);
        assert_eq!(output("{set;x;[1,2]}{get;x}"), "[1,2]");
        assert_eq!(output("{set;x;1}{set;x}{get;x}"), "");
    }

    #[test]
    fn scopes_are_routed_to_the_store() {
        let engine = engine();
        run(&engine, "{set;tag;t}{set;@me;a}{set;_g;g}{set;*all;x}{set;~tmp;y}");

        let store = engine.store();
        assert_eq!(store.get(&VariableScope::Tag("test".into()), "tag").unwrap(), Some(json!("t")));
        assert_eq!(store.get(&VariableScope::Author("1".into()), "me").unwrap(), Some(json!("a")));
        assert_eq!(store.get(&VariableScope::Guild("2".into()), "g").unwrap(), Some(json!("g")));
        assert_eq!(store.get(&VariableScope::Global, "all").unwrap(), Some(json!("x")));
        assert_eq!(store.get(&VariableScope::Tag("test".into()), "tmp").unwrap(), None);
    }

    #[test]
    fn temporaries_do_not_outlive_the_execution() {
        let engine = engine();
        assert_eq!(run(&engine, "{set;~a;1}{get;~a}").output, "1");
        assert_eq!(run(&engine, "{get;~a}").output, "");
    }

    #[test]
    fn unavailable_scope_is_terminal() {
        let engine = engine();
        let result = engine.execute("{set;@x;1}after", crate::ExecutionRequest::new("test"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error.kind, ErrorKind::UnknownVariableScope);
        assert!(!result.output.contains("after"));
    }
}
