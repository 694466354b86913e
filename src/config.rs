use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Ceilings applied to every execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Total loop iterations across all loop subtags.
    pub max_loops: u64,
    /// Total subtag calls.
    pub max_calls: u64,
    /// Nested call depth.
    pub max_depth: usize,
    /// External lookups made by handlers.
    pub max_requests: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self { max_loops: 10_000, max_calls: 100_000, max_depth: 200, max_requests: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: LimitConfig,
    /// Evaluation steps between scheduler yields. Zero disables yielding.
    pub yield_interval: u64,
    /// Applied to executions that do not bring their own abort signal.
    pub timeout_ms: Option<u64>,
    /// Compiled size ceiling for user supplied regular expressions.
    pub regex_size_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: LimitConfig::default(),
            yield_interval: 1_000,
            timeout_ms: None,
            regex_size_limit: 64 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "limits": { "max_loops": 3 }, "timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.limits.max_loops, 3);
        assert_eq!(config.limits.max_depth, LimitConfig::default().max_depth);
        assert_eq!(config.yield_interval, 1_000);
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(EngineConfig::from_json("{ nope"), Err(EngineError::Config(_))));
    }
}
