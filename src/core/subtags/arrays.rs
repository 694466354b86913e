use serde_json::{Value, json};

use super::{integer, resolve_array};
use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::{BBTagError, EngineError, ErrorKind};
use crate::types::{parse_array, render_value};

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("shuffle", SubtagCategory::Arrays)
            .description("Shuffles an array.")
            .signature(&[], "Returns nothing.", nothing)
            .signature(
                &["array"],
                "Returns a literal array shuffled, or shuffles the array held by a variable in place.",
                shuffle,
            )
            .build()?,
        SubtagDefinition::builder("length", SubtagCategory::Arrays)
            .description("Counts array elements, or characters of text.")
            .signature(&["value"], "Returns the length of `value`.", length)
            .build()?,
        SubtagDefinition::builder("index", SubtagCategory::Arrays)
            .description("Reads one array element.")
            .signature(&["array", "index"], "Returns the element of `array` at the zero-based `index`.", index)
            .build()?,
        SubtagDefinition::builder("join", SubtagCategory::Arrays)
            .description("Joins array elements into text.")
            .signature(&["array", "separator"], "Joins the elements of `array` with `separator`.", join)
            .build()?,
    ])
}

fn nothing(_: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
    Ok(None)
}

fn shuffle(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let mut array = resolve_array(ctx, &text)?;
    ctx.plugins().random().shuffle(&mut array.items);

    match array.variable {
        Some(name) => {
            ctx.set_variable(&name, Value::Array(array.items))?;
            Ok(None)
        }
        None => Ok(Some(Value::Array(array.items).to_string())),
    }
}

fn length(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let length = match parse_array(&text) {
        Some(items) => items.len(),
        None => text.chars().count(),
    };
    Ok(Some(length.to_string()))
}

fn index(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let array = resolve_array(ctx, &text)?;
    let position = args.value(ctx, 1);
    let position = integer(ctx, &position)?;

    usize::try_from(position)
        .ok()
        .and_then(|i| array.items.get(i))
        .map(|item| Some(render_value(item)))
        .ok_or_else(|| {
            BBTagError::new(ErrorKind::NotFound, "Index out of range")
                .with_detail(json!({ "index": position, "length": array.items.len() }))
        })
}

fn join(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let array = resolve_array(ctx, &text)?;
    let separator = args.value(ctx, 1);
    let parts: Vec<String> = array.items.iter().map(render_value).collect();
    Ok(Some(parts.join(&separator)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::core::scope::VariableScope;
    use crate::core::subtags::testing::{engine, output, run};

    #[test]
    fn literal_shuffle_leaves_the_store_alone() {
        let engine = engine();
        let result = run(&engine, "{shuffle;[1,2,3]}");
        assert_eq!(result.output, "[1,2,3]");
        assert!(result.errors.is_empty());
        assert_eq!(engine.store().get(&VariableScope::Tag("test".into()), "[1,2,3]").unwrap(), None);
    }

    #[test]
    fn variable_shuffle_writes_back() {
        let engine = engine();
        let result = run(&engine, "{set;list;a;b}{shuffle;list}|{get;list}");
        assert_eq!(result.output, r#"|["a","b"]"#);
        assert_eq!(engine.store().get(&VariableScope::Tag("test".into()), "list").unwrap(), Some(json!(["a", "b"])));
    }

    #[test]
    fn shuffle_without_arguments_is_empty() {
        assert_eq!(output("{shuffle}"), "");
        assert_eq!(output("{shuffle;nope}"), "`Not an array`");
    }

    #[test]
    fn length_of_arrays_and_text() {
        assert_eq!(output("{length;[1,2,3]}"), "3");
        assert_eq!(output("{length;héllo}"), "5");
        assert_eq!(output("{length;}"), "0");
    }

    #[test]
    fn index_and_join() {
        assert_eq!(output(r#"{index;["a","b"];1}"#), "b");
        assert_eq!(output("{index;[1];4}"), "`Index out of range`");
        assert_eq!(output("{set;~l;x;y;z}{join;~l;, }"), "x, y, z");
    }
}
