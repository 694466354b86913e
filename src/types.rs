use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// A position in the original document.
///
/// `index` is a byte offset; `line` and `column` are 1-based, with columns
/// counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceMarker {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl SourceMarker {
    pub const START: SourceMarker = SourceMarker { index: 0, line: 1, column: 1 };

    pub fn new(index: usize, line: usize, column: usize) -> Self {
        Self { index, line, column }
    }
}

/// Half-open range `[start.index, end.index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceRange {
    pub start: SourceMarker,
    pub end: SourceMarker,
}

impl SourceRange {
    pub fn new(start: SourceMarker, end: SourceMarker) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.index - self.start.index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

/// A sequence of literal text and subtag calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub values: Vec<StatementPart>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementPart {
    Literal { text: String, range: SourceRange },
    Subtag(SubtagCall),
}

/// `{name;arg;...}`. The name is itself a statement so it may be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtagCall {
    pub name: Statement,
    pub args: Vec<Statement>,
    pub range: SourceRange,
}

impl Statement {
    pub fn empty(at: SourceMarker) -> Self {
        Self { values: Vec::new(), range: SourceRange::new(at, at) }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the literal text when the statement contains no subtag calls.
    pub fn as_literal(&self) -> Option<String> {
        let mut text = String::new();
        for value in &self.values {
            match value {
                StatementPart::Literal { text: part, .. } => text.push_str(part),
                StatementPart::Subtag(_) => return None,
            }
        }
        Some(text)
    }

    pub fn subtags(&self) -> impl Iterator<Item = &SubtagCall> {
        self.values.iter().filter_map(|value| match value {
            StatementPart::Subtag(call) => Some(call),
            StatementPart::Literal { .. } => None,
        })
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in &self.values {
            match value {
                StatementPart::Literal { text, .. } => f.write_str(text)?,
                StatementPart::Subtag(call) => write!(f, "{}", call)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for SubtagCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.name)?;
        for arg in &self.args {
            write!(f, ";{}", arg)?;
        }
        f.write_str("}")
    }
}

/// Renders a stored variable value as document text. Strings are emitted
/// verbatim, null as nothing, everything else as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads document text as a JSON array, if it is one.
pub fn parse_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Converts document text into the value stored for it. Text that reads as a
/// JSON array is stored as an array, anything else as a string.
pub fn text_to_value(text: &str) -> Value {
    match parse_array(text) {
        Some(items) => Value::Array(items),
        None => Value::String(text.to_string()),
    }
}
