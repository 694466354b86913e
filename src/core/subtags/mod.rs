//! The standard subtag set registered by [`crate::EngineBuilder`].

use serde_json::Value;

use crate::core::context::BBTagContext;
use crate::core::definition::SubtagDefinition;
use crate::errors::{BBTagError, EngineError};
use crate::types::parse_array;

// Declare submodules
pub mod arrays;
pub mod control;
pub mod escapes;
pub mod flags;
pub mod functions;
pub mod lookup;
pub mod loops;
pub mod math;
pub mod text;
pub mod variables;

pub use loops::drive_loop;

/// Every standard definition, ready for registration.
pub fn standard_definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    let mut definitions = Vec::new();
    definitions.extend(variables::definitions()?);
    definitions.extend(control::definitions()?);
    definitions.extend(loops::definitions()?);
    definitions.extend(arrays::definitions()?);
    definitions.extend(functions::definitions()?);
    definitions.extend(flags::definitions()?);
    definitions.extend(escapes::definitions()?);
    definitions.extend(math::definitions()?);
    definitions.extend(text::definitions()?);
    definitions.extend(lookup::definitions()?);
    Ok(definitions)
}

pub(crate) fn number(ctx: &BBTagContext<'_>, text: &str) -> Result<f64, BBTagError> {
    ctx.plugins().numbers().parse_number(text).ok_or_else(|| BBTagError::not_a_number(text))
}

pub(crate) fn integer(ctx: &BBTagContext<'_>, text: &str) -> Result<i64, BBTagError> {
    ctx.plugins().numbers().parse_integer(text).ok_or_else(|| BBTagError::not_a_number(text))
}

pub(crate) fn boolean(ctx: &BBTagContext<'_>, text: &str, default: bool) -> Result<bool, BBTagError> {
    ctx.plugins().booleans().parse_boolean_or(text, default).ok_or_else(|| BBTagError::not_a_boolean(text))
}

/// An array read from document text, and the variable it came from if it was
/// not a literal.
pub(crate) struct ResolvedArray {
    pub items: Vec<Value>,
    pub variable: Option<String>,
}

/// Reads `text` as a literal JSON array, or else as the name of a variable
/// holding one.
pub(crate) fn resolve_array(ctx: &BBTagContext<'_>, text: &str) -> Result<ResolvedArray, BBTagError> {
    if let Some(items) = parse_array(text) {
        return Ok(ResolvedArray { items, variable: None });
    }

    let name = text.trim();
    let items = match ctx.get_variable(name)? {
        Some(Value::Array(items)) => Some(items),
        Some(Value::String(stored)) => parse_array(&stored),
        _ => None,
    };
    match items {
        Some(items) => Ok(ResolvedArray { items, variable: Some(name.to_string()) }),
        None => Err(BBTagError::not_an_array(text)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::Value;

    use crate::EngineBuilder;
    use crate::core::context::ExecutionRequest;
    use crate::core::engine::{Engine, ExecutionResult};
    use crate::core::entities::{Entity, EntityKind, EntityLookup, LookupOptions};
    use crate::core::plugins::{PluginSet, RandomSource};
    use crate::core::scope::ExecutionMeta;
    use crate::errors::BBTagError;

    /// Always picks the first element and never reorders.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FirstRandom;

    impl RandomSource for FirstRandom {
        fn index(&self, _len: usize) -> usize {
            0
        }

        fn shuffle(&self, _items: &mut [Value]) {}
    }

    /// Two users and one channel. Ids match exactly; names match
    /// case-insensitively unless lookups are disabled.
    #[derive(Debug, Clone, Default)]
    pub struct FakeEntities;

    impl FakeEntities {
        fn all(kind: EntityKind) -> Vec<Entity> {
            let entity = |id: &str, name: &str| Entity { id: id.to_string(), name: name.to_string(), kind };
            match kind {
                EntityKind::User => vec![entity("1", "Ann"), entity("42", "Bob")],
                EntityKind::Channel => vec![entity("3", "general")],
                _ => Vec::new(),
            }
        }
    }

    impl EntityLookup for FakeEntities {
        fn query_single(
            &self,
            _meta: &ExecutionMeta,
            kind: EntityKind,
            query: &str,
            options: LookupOptions,
        ) -> Result<Option<Entity>, BBTagError> {
            Ok(Self::all(kind)
                .into_iter()
                .find(|e| e.id == query || (!options.no_lookup && e.name.eq_ignore_ascii_case(query))))
        }

        fn get_all(&self, _meta: &ExecutionMeta, kind: EntityKind) -> Result<Vec<Entity>, BBTagError> {
            Ok(Self::all(kind))
        }
    }

    pub fn engine() -> Engine {
        EngineBuilder::new()
            .with_plugins(PluginSet::default().with_random(FirstRandom))
            .with_entities(FakeEntities)
            .build()
            .unwrap()
    }

    pub fn run(engine: &Engine, source: &str) -> ExecutionResult {
        engine.execute(source, ExecutionRequest::new("test").author("1").guild("2").channel("3"))
    }

    /// Output of `source` on a fresh engine.
    pub fn output(source: &str) -> String {
        run(&engine(), source).output
    }
}
