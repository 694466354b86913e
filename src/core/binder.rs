use log::trace;
use once_cell::unsync::OnceCell;

use crate::core::context::BBTagContext;
use crate::core::definition::{ParameterSpec, Signature, SubtagDefinition};
use crate::errors::{BBTagError, LocatedError};
use crate::types::{SourceRange, Statement};

#[derive(Debug, Clone, Copy)]
enum ArgumentSource<'s> {
    Code(&'s Statement),
    Default(&'s str),
}

/// A bound argument. Binding never evaluates anything; evaluation happens on
/// the first [`value`](Self::value) or on every [`wait`](Self::wait).
#[derive(Debug)]
pub struct SubtagArgument<'s> {
    parameter: &'s ParameterSpec,
    source: ArgumentSource<'s>,
    cache: OnceCell<String>,
}

impl<'s> SubtagArgument<'s> {
    fn code(parameter: &'s ParameterSpec, statement: &'s Statement) -> Self {
        Self { parameter, source: ArgumentSource::Code(statement), cache: OnceCell::new() }
    }

    fn omitted(parameter: &'s ParameterSpec) -> Self {
        let default = parameter.default.as_deref().unwrap_or("");
        Self { parameter, source: ArgumentSource::Default(default), cache: OnceCell::new() }
    }

    pub fn name(&self) -> &str {
        &self.parameter.name
    }

    /// Whether the caller supplied this argument.
    pub fn is_provided(&self) -> bool {
        matches!(self.source, ArgumentSource::Code(_))
    }

    pub fn range(&self) -> Option<SourceRange> {
        match self.source {
            ArgumentSource::Code(statement) => Some(statement.range),
            ArgumentSource::Default(_) => None,
        }
    }

    /// Evaluates the argument once and caches the result.
    pub fn value(&self, ctx: &mut BBTagContext<'_>) -> String {
        if let Some(value) = self.cache.get() {
            return value.clone();
        }
        let value = self.evaluate(ctx);
        let _ = self.cache.set(value.clone());
        value
    }

    /// Like [`value`](Self::value), but errors raised while evaluating are
    /// intercepted and the first one is returned instead of being reported.
    pub fn try_value(&self, ctx: &mut BBTagContext<'_>) -> Result<String, LocatedError> {
        if let Some(value) = self.cache.get() {
            return Ok(value.clone());
        }
        let (value, caught) = ctx.catch_errors(|ctx| self.evaluate(ctx));
        match caught.into_iter().next() {
            Some(error) => Err(error),
            None => {
                let _ = self.cache.set(value.clone());
                Ok(value)
            }
        }
    }

    /// Evaluates the argument again on every call. Loop bodies use this.
    pub fn wait(&self, ctx: &mut BBTagContext<'_>) -> String {
        self.evaluate(ctx)
    }

    /// The supplied code, if any.
    pub fn statement(&self) -> Option<&'s Statement> {
        match self.source {
            ArgumentSource::Code(statement) => Some(statement),
            ArgumentSource::Default(_) => None,
        }
    }

    /// Source text, never evaluated.
    pub fn raw(&self) -> String {
        match self.source {
            ArgumentSource::Code(statement) => statement.to_string(),
            ArgumentSource::Default(default) => default.to_string(),
        }
    }

    fn evaluate(&self, ctx: &mut BBTagContext<'_>) -> String {
        match self.source {
            ArgumentSource::Code(statement) => ctx.eval(statement),
            ArgumentSource::Default(default) => default.to_string(),
        }
    }

    fn is_eager(&self) -> bool {
        !self.parameter.deferred && !self.parameter.raw
    }
}

/// Arguments bound to one signature, one slot per declared parameter.
#[derive(Debug)]
pub struct BoundArgs<'s> {
    signature: &'s Signature,
    slots: Vec<Vec<SubtagArgument<'s>>>,
}

impl<'s> BoundArgs<'s> {
    pub fn signature(&self) -> &'s Signature {
        self.signature
    }

    /// The argument for parameter `index`; the first element for repeatable
    /// parameters.
    pub fn get(&self, index: usize) -> Option<&SubtagArgument<'s>> {
        self.slots.get(index).and_then(|slot| slot.first())
    }

    /// Every argument collected by parameter `index`.
    pub fn all(&self, index: usize) -> &[SubtagArgument<'s>] {
        self.slots.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn named(&self, name: &str) -> Option<&SubtagArgument<'s>> {
        let index = self.signature.parameters.iter().position(|p| p.name == name)?;
        self.get(index)
    }

    /// Evaluated value of parameter `index`, or empty text when absent.
    pub fn value(&self, ctx: &mut BBTagContext<'_>, index: usize) -> String {
        self.get(index).map(|arg| arg.value(ctx)).unwrap_or_default()
    }

    /// Evaluated values of every argument collected by parameter `index`.
    pub fn values(&self, ctx: &mut BBTagContext<'_>, index: usize) -> Vec<String> {
        self.all(index).iter().map(|arg| arg.value(ctx)).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluates value-bound arguments in source order, stopping if the
    /// execution leaves the running state.
    pub(crate) fn resolve_eager(&self, ctx: &mut BBTagContext<'_>) {
        for arg in self.slots.iter().flatten().filter(|arg| arg.is_eager() && arg.is_provided()) {
            if !ctx.is_running() {
                return;
            }
            arg.value(ctx);
        }
    }
}

/// Picks the first signature accepting `args.len()` and assigns arguments.
pub fn bind<'s>(definition: &'s SubtagDefinition, args: &'s [Statement]) -> Result<BoundArgs<'s>, BBTagError> {
    let count = args.len();
    let signature = match definition.signatures.iter().find(|s| s.accepts(count)) {
        Some(signature) => signature,
        None => return Err(no_matching_signature(definition, count)),
    };
    trace!("Binding {} arguments to {}", count, signature.usage(&definition.id));

    let mut surplus = count - signature.min_args();
    let mut supplied = args.iter();
    let mut slots = Vec::with_capacity(signature.parameters.len());

    for parameter in &signature.parameters {
        let slot = match parameter.repeat {
            Some(min) => {
                let take = min + surplus;
                surplus = 0;
                supplied.by_ref().take(take).map(|s| SubtagArgument::code(parameter, s)).collect()
            }
            None if parameter.is_required() => {
                supplied.next().map(|s| SubtagArgument::code(parameter, s)).into_iter().collect()
            }
            None if surplus > 0 => {
                surplus -= 1;
                supplied.next().map(|s| SubtagArgument::code(parameter, s)).into_iter().collect()
            }
            None => vec![SubtagArgument::omitted(parameter)],
        };
        slots.push(slot);
    }

    Ok(BoundArgs { signature, slots })
}

fn no_matching_signature(definition: &SubtagDefinition, count: usize) -> BBTagError {
    let min = definition.signatures.iter().map(Signature::min_args).min().unwrap_or(0);
    if count < min {
        return BBTagError::not_enough_arguments(min, count);
    }
    // Count lies above some signature's range; report the closest maximum below it.
    let max = definition
        .signatures
        .iter()
        .filter_map(Signature::max_args)
        .filter(|max| *max < count)
        .max()
        .unwrap_or(min);
    BBTagError::too_many_arguments(max, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::{SubtagCategory, SubtagResult};
    use crate::errors::ErrorKind;
    use crate::parser::parse;
    use crate::types::StatementPart;

    fn noop(_: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
        Ok(None)
    }

    fn args_of(source: &str) -> Vec<Statement> {
        match parse(source).values.into_iter().next() {
            Some(StatementPart::Subtag(call)) => call.args,
            other => panic!("expected a subtag, got {:?}", other),
        }
    }

    fn definition(patterns: &[&str]) -> SubtagDefinition {
        SubtagDefinition::builder("test", SubtagCategory::Text).signature(patterns, "", noop).build().unwrap()
    }

    #[test]
    fn two_to_three_arguments() {
        let definition = definition(&["a", "b", "c?"]);
        for (source, ok) in [("{t;1}", false), ("{t;1;2}", true), ("{t;1;2;3}", true), ("{t;1;2;3;4}", false)] {
            let args = args_of(source);
            let result = bind(&definition, &args);
            assert_eq!(result.is_ok(), ok, "{}", source);
            if let Err(error) = result {
                assert_eq!(error.kind, ErrorKind::NoMatchingSignature);
            }
        }
    }

    #[test]
    fn error_messages_name_the_direction() {
        let definition = definition(&["a", "b", "c?"]);
        let args = args_of("{t;1}");
        assert_eq!(bind(&definition, &args).unwrap_err().message, "Not enough arguments");
        let args = args_of("{t;1;2;3;4}");
        assert_eq!(bind(&definition, &args).unwrap_err().message, "Too many arguments");
    }

    #[test]
    fn defaults_fill_omitted_optionals() {
        let definition = definition(&["a", "b:fallback", "c"]);
        let args = args_of("{t;1;3}");
        let bound = bind(&definition, &args).unwrap();
        assert_eq!(bound.get(0).unwrap().raw(), "1");
        assert!(!bound.get(1).unwrap().is_provided());
        assert_eq!(bound.get(1).unwrap().raw(), "fallback");
        assert_eq!(bound.get(2).unwrap().raw(), "3");

        let args = args_of("{t;1;2;3}");
        let bound = bind(&definition, &args).unwrap();
        assert_eq!(bound.named("b").unwrap().raw(), "2");
    }

    #[test]
    fn overflow_goes_to_the_repeatable_parameter() {
        let definition = definition(&["index", "~choices+", "last"]);
        let args = args_of("{t;0;a;b;c;z}");
        let bound = bind(&definition, &args).unwrap();
        let choices: Vec<String> = bound.all(1).iter().map(SubtagArgument::raw).collect();
        assert_eq!(choices, vec!["a", "b", "c"]);
        assert_eq!(bound.get(2).unwrap().raw(), "z");
        assert_eq!(bound.len(), 5);
    }

    #[test]
    fn first_matching_signature_wins() {
        let definition = SubtagDefinition::builder("t", SubtagCategory::Text)
            .signature(&[], "none", noop)
            .signature(&["a"], "one", noop)
            .build()
            .unwrap();
        let args = args_of("{t;x}");
        assert_eq!(bind(&definition, &args).unwrap().signature().description, "one");
        let args = args_of("{t}");
        assert_eq!(bind(&definition, &args).unwrap().signature().description, "none");
    }
}
