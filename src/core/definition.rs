use std::{fmt, sync::Arc};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::errors::{BBTagError, EngineError};

lazy_static! {
    static ref PARAMETER: Regex =
        Regex::new(r"^(?P<mode>[~!]?)(?P<name>[A-Za-z][A-Za-z0-9_]*)(?P<arity>\?|\*|\+(?P<min>\d*))?(?::(?P<default>.*))?$")
            .unwrap();
}

/// `Ok(None)` appends nothing to the output.
pub type SubtagResult = Result<Option<String>, BBTagError>;

pub trait SubtagHandler: Send + Sync {
    fn execute(&self, ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult;
}

impl<F> SubtagHandler for F
where
    F: Fn(&mut BBTagContext<'_>, &BoundArgs<'_>) -> SubtagResult + Send + Sync,
{
    fn execute(&self, ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
        self(ctx, args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtagCategory {
    Variables,
    Control,
    Loops,
    Arrays,
    Functions,
    Scope,
    Escapes,
    Math,
    Text,
    Lookup,
}

/// One declared parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub optional: bool,
    pub default: Option<String>,
    /// Minimum argument count for a repeatable parameter.
    pub repeat: Option<usize>,
    /// The handler receives a thunk instead of a value.
    pub deferred: bool,
    /// The handler receives source text, never evaluated.
    pub raw: bool,
}

impl ParameterSpec {
    /// Compiles `[~|!]name[?|+|+N|*][:default]`.
    pub fn parse(pattern: &str) -> Result<Self, EngineError> {
        let caps = PARAMETER
            .captures(pattern)
            .ok_or_else(|| EngineError::InvalidParameter(pattern.to_string(), "malformed pattern".to_string()))?;

        let mode = caps.name("mode").map_or("", |m| m.as_str());
        let arity = caps.name("arity").map_or("", |m| m.as_str());
        let default = caps.name("default").map(|m| m.as_str().to_string());

        let repeat = match arity {
            "*" => Some(0),
            a if a.starts_with('+') => {
                let min = caps.name("min").map_or("", |m| m.as_str());
                Some(if min.is_empty() {
                    1
                } else {
                    min.parse().map_err(|_| {
                        EngineError::InvalidParameter(pattern.to_string(), "repeat minimum is too large".to_string())
                    })?
                })
            }
            _ => None,
        };
        if repeat.is_some() && default.is_some() {
            return Err(EngineError::InvalidParameter(
                pattern.to_string(),
                "repeatable parameters cannot declare a default".to_string(),
            ));
        }

        Ok(Self {
            name: caps["name"].to_string(),
            optional: arity == "?" || default.is_some(),
            default,
            repeat,
            deferred: mode == "~",
            raw: mode == "!",
        })
    }

    pub fn is_required(&self) -> bool {
        !self.optional && self.repeat.is_none()
    }
}

impl fmt::Display for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.optional, self.repeat) {
            (_, Some(_)) => write!(f, "{}...", self.name),
            (true, None) => write!(f, "[{}]", self.name),
            (false, None) => write!(f, "<{}>", self.name),
        }
    }
}

/// One accepted argument shape of a subtag.
#[derive(Clone)]
pub struct Signature {
    pub parameters: Vec<ParameterSpec>,
    pub description: String,
    pub handler: Arc<dyn SubtagHandler>,
    min: usize,
    max: Option<usize>,
}

impl Signature {
    pub fn compile(
        patterns: &[&str],
        description: &str,
        handler: Arc<dyn SubtagHandler>,
    ) -> Result<Self, EngineError> {
        let parameters = patterns.iter().map(|p| ParameterSpec::parse(p)).collect::<Result<Vec<_>, _>>()?;

        if parameters.iter().filter(|p| p.repeat.is_some()).count() > 1 {
            return Err(EngineError::InvalidParameter(
                patterns.join(";"),
                "only one parameter may repeat".to_string(),
            ));
        }

        let min = parameters.iter().map(|p| if p.is_required() { 1 } else { p.repeat.unwrap_or(0) }).sum();
        let max = if parameters.iter().any(|p| p.repeat.is_some()) { None } else { Some(parameters.len()) };

        Ok(Self { parameters, description: description.to_string(), handler, min, max })
    }

    pub fn min_args(&self) -> usize {
        self.min
    }

    /// `None` when a repeatable parameter makes the count unbounded.
    pub fn max_args(&self) -> Option<usize> {
        self.max
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    fn overlaps(&self, other: &Signature) -> bool {
        let low = self.min.max(other.min);
        match (self.max, other.max) {
            (Some(a), Some(b)) => low <= a.min(b),
            (Some(a), None) => low <= a,
            (None, Some(b)) => low <= b,
            (None, None) => true,
        }
    }

    pub fn usage(&self, name: &str) -> String {
        let mut usage = format!("{{{}", name);
        for parameter in &self.parameters {
            usage.push(';');
            usage.push_str(&parameter.to_string());
        }
        usage.push('}');
        usage
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("parameters", &self.parameters)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SubtagDefinition {
    pub id: String,
    pub aliases: Vec<String>,
    pub category: SubtagCategory,
    pub description: String,
    pub signatures: Vec<Signature>,
    /// Prefix definitions answer every name starting with `id`.
    pub prefix: bool,
}

impl SubtagDefinition {
    pub fn builder(id: &str, category: SubtagCategory) -> DefinitionBuilder {
        DefinitionBuilder {
            id: id.to_lowercase(),
            aliases: Vec::new(),
            category,
            description: String::new(),
            prefix: false,
            signatures: Vec::new(),
        }
    }
}

pub struct DefinitionBuilder {
    id: String,
    aliases: Vec<String>,
    category: SubtagCategory,
    description: String,
    prefix: bool,
    signatures: Vec<(Vec<String>, String, Arc<dyn SubtagHandler>)>,
}

impl DefinitionBuilder {
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_lowercase());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn signature<H>(mut self, parameters: &[&str], description: &str, handler: H) -> Self
    where
        H: SubtagHandler + 'static,
    {
        self.signatures.push((
            parameters.iter().map(|p| p.to_string()).collect(),
            description.to_string(),
            Arc::new(handler),
        ));
        self
    }

    /// Compiles every signature and rejects overlapping argument counts.
    pub fn build(self) -> Result<SubtagDefinition, EngineError> {
        if self.signatures.is_empty() {
            return Err(EngineError::NoSignatures(self.id));
        }

        let mut signatures = Vec::with_capacity(self.signatures.len());
        for (patterns, description, handler) in self.signatures {
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            signatures.push(Signature::compile(&patterns, &description, handler)?);
        }

        for (i, first) in signatures.iter().enumerate() {
            for (j, second) in signatures.iter().enumerate().skip(i + 1) {
                if first.overlaps(second) {
                    return Err(EngineError::AmbiguousSignatures { id: self.id, first: i, second: j });
                }
            }
        }

        Ok(SubtagDefinition {
            id: self.id,
            aliases: self.aliases,
            category: self.category,
            description: self.description,
            signatures,
            prefix: self.prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
        Ok(None)
    }

    #[test]
    fn parses_parameter_patterns() {
        let p = ParameterSpec::parse("~code").unwrap();
        assert!(p.deferred && !p.raw && p.is_required());

        let p = ParameterSpec::parse("!text*").unwrap();
        assert!(p.raw);
        assert_eq!(p.repeat, Some(0));

        let p = ParameterSpec::parse("values+2").unwrap();
        assert_eq!(p.repeat, Some(2));

        let p = ParameterSpec::parse("amount:1").unwrap();
        assert!(p.optional);
        assert_eq!(p.default.as_deref(), Some("1"));

        let p = ParameterSpec::parse("else?").unwrap();
        assert!(p.optional && p.default.is_none());
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(ParameterSpec::parse("").is_err());
        assert!(ParameterSpec::parse("1abc").is_err());
        assert!(ParameterSpec::parse("items+:x").is_err());
    }

    #[test]
    fn argument_ranges() {
        let signature = Signature::compile(&["a", "b", "c?"], "", Arc::new(noop)).unwrap();
        assert_eq!((signature.min_args(), signature.max_args()), (2, Some(3)));
        assert!(!signature.accepts(1));
        assert!(signature.accepts(2));
        assert!(signature.accepts(3));
        assert!(!signature.accepts(4));

        let repeated = Signature::compile(&["index", "~choices+"], "", Arc::new(noop)).unwrap();
        assert_eq!((repeated.min_args(), repeated.max_args()), (2, None));
    }

    #[test]
    fn overlapping_signatures_are_ambiguous() {
        let result = SubtagDefinition::builder("x", SubtagCategory::Text)
            .signature(&["a"], "", noop)
            .signature(&["a", "b?"], "", noop)
            .build();
        assert!(matches!(result, Err(EngineError::AmbiguousSignatures { first: 0, second: 1, .. })));

        let ok = SubtagDefinition::builder("x", SubtagCategory::Text)
            .signature(&[], "", noop)
            .signature(&["a", "b*"], "", noop)
            .build()
            .unwrap();
        assert_eq!(ok.signatures.len(), 2);
    }

    #[test]
    fn usage_strings() {
        let signature = Signature::compile(&["index", "~choices+"], "", Arc::new(noop)).unwrap();
        assert_eq!(signature.usage("choose"), "{choose;<index>;choices...}");
    }
}
