use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::types::SourceRange;

/// The category of a runtime error raised while evaluating a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownSubtag,
    NoMatchingSignature,
    TypeMismatch,
    NotFound,
    ResourceLimit,
    UnsafeInput,
    UnknownVariableScope,
    HostFailure,
    Custom,
}

impl ErrorKind {
    /// Terminal errors abort the remainder of the execution.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::ResourceLimit | ErrorKind::UnknownSubtag | ErrorKind::UnknownVariableScope
        )
    }
}

/// An error raised by the engine or a subtag handler.
///
/// Errors are plain data until the engine attaches them to the call that
/// raised them. `display` overrides the inline placeholder; an empty display
/// hides the error from the output while keeping it in the report.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message}")]
pub struct BBTagError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl BBTagError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), detail: None, display: None }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Hides the placeholder when `quiet` is set.
    pub fn quiet_if(self, quiet: bool) -> Self {
        if quiet { self.with_display("") } else { self }
    }

    pub fn unknown_subtag(name: &str) -> Self {
        Self::new(ErrorKind::UnknownSubtag, format!("Unknown subtag {}", name))
            .with_detail(json!({ "subtag": name }))
    }

    pub fn not_enough_arguments(expected: usize, got: usize) -> Self {
        Self::new(ErrorKind::NoMatchingSignature, "Not enough arguments")
            .with_detail(json!({ "expected": expected, "got": got }))
    }

    pub fn too_many_arguments(expected: usize, got: usize) -> Self {
        Self::new(ErrorKind::NoMatchingSignature, "Too many arguments")
            .with_detail(json!({ "expected": expected, "got": got }))
    }

    pub fn not_a_number(value: &str) -> Self {
        Self::new(ErrorKind::TypeMismatch, "Not a number").with_detail(json!({ "value": value }))
    }

    pub fn not_a_boolean(value: &str) -> Self {
        Self::new(ErrorKind::TypeMismatch, "Not a boolean").with_detail(json!({ "value": value }))
    }

    pub fn not_an_array(value: &str) -> Self {
        Self::new(ErrorKind::TypeMismatch, "Not an array").with_detail(json!({ "value": value }))
    }

    pub fn not_found(entity: &str, query: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("No {} found", entity))
            .with_detail(json!({ "entity": entity, "query": query }))
    }

    pub fn limit_exceeded(limit: &str, ceiling: u64) -> Self {
        Self::new(ErrorKind::ResourceLimit, format!("Too many {}", limit))
            .with_detail(json!({ "limit": limit, "ceiling": ceiling }))
    }

    pub fn unsafe_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsafeInput, message)
    }

    pub fn unknown_scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownVariableScope, message)
    }

    pub fn host(error: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::HostFailure, error.to_string())
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Custom, message)
    }
}

/// A runtime error attached to the call that raised it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedError {
    pub range: SourceRange,
    pub subtag: String,
    pub error: BBTagError,
    /// Names of the enclosing calls, outermost first.
    pub stack: Vec<String>,
}

/// Errors raised while building an engine. These indicate a programming or
/// configuration mistake and never surface from a single evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No fallback (empty prefix) variable scope is registered")]
    MissingFallbackScope,
    #[error("Variable scope prefix `{0}` is registered more than once")]
    DuplicateScopePrefix(String),
    #[error("Subtag `{0}` is already registered")]
    DuplicateSubtag(String),
    #[error("Subtag `{id}` has ambiguous signatures {first} and {second}")]
    AmbiguousSignatures { id: String, first: usize, second: usize },
    #[error("Subtag `{0}` declares no signatures")]
    NoSignatures(String),
    #[error("Invalid parameter `{0}`: {1}")]
    InvalidParameter(String, String),
    #[error("Invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds() {
        assert!(ErrorKind::ResourceLimit.is_terminal());
        assert!(ErrorKind::UnknownSubtag.is_terminal());
        assert!(ErrorKind::UnknownVariableScope.is_terminal());
        assert!(!ErrorKind::TypeMismatch.is_terminal());
        assert!(!ErrorKind::HostFailure.is_terminal());
    }

    #[test]
    fn quiet_errors_keep_their_message() {
        let error = BBTagError::not_found("user", "bob").quiet_if(true);
        assert_eq!(error.display.as_deref(), Some(""));
        assert_eq!(error.message, "No user found");
        assert_eq!(error.to_string(), "No user found");
    }

    #[test]
    fn serializes_without_empty_fields() {
        let error = BBTagError::custom("boom");
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value, json!({ "kind": "custom", "message": "boom" }));
    }
}
