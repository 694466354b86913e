use crate::core::binder::{BoundArgs, SubtagArgument};
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagHandler, SubtagResult};
use crate::errors::EngineError;

/// Emits a fixed piece of text.
struct Constant(&'static str);

impl SubtagHandler for Constant {
    fn execute(&self, _: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
        Ok(Some(self.0.to_string()))
    }
}

fn constant(id: &str, text: &'static str, description: &str) -> Result<SubtagDefinition, EngineError> {
    SubtagDefinition::builder(id, SubtagCategory::Escapes)
        .description(description)
        .signature(&[], description, Constant(text))
        .build()
}

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        constant("lb", "{", "Returns `{`.")?,
        constant("rb", "}", "Returns `}`.")?,
        constant("semi", ";", "Returns `;`.")?,
        SubtagDefinition::builder("escapebbtag", SubtagCategory::Escapes)
            .alias("escape")
            .description("Returns its arguments as source text without running them.")
            .signature(&["!code*"], "Returns `code` verbatim.", escape)
            .build()?,
    ])
}

fn escape(_: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let parts: Vec<String> = args.all(0).iter().map(SubtagArgument::raw).collect();
    Ok(Some(parts.join(";")))
}

#[cfg(test)]
mod tests {
    use crate::core::subtags::testing::output;

    #[test]
    fn brace_escapes() {
        assert_eq!(output("{lb}get;x{rb}{semi}"), "{get;x};");
    }

    #[test]
    fn escaped_code_is_not_run() {
        assert_eq!(output("{escapebbtag;{set;~x;1};b}{get;~x}"), "{set;~x;1};b");
    }
}
