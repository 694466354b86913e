//! Conversion and utility capabilities consulted by subtag handlers.
//!
//! Handlers ask the execution's [`PluginSet`] for a capability instead of
//! hard-wiring a policy, so a host can swap e.g. number parsing for a single
//! execution without touching handler code. Coercions never fail loudly: an
//! unconvertible value is `None` and the handler decides which error to raise.

use std::{fmt::Debug, sync::Arc};

use regex::Regex;
use serde_json::Value;

use crate::core::context::ScopeFrame;
use crate::errors::BBTagError;

pub mod defaults;

pub use defaults::{
    SafeRegexBuilder, ScopeFallback, ScopeQuiet, StandardBooleans, StandardNumbers, ThreadRandom,
};

pub trait NumberConverter: Debug + Send + Sync {
    fn parse_number(&self, text: &str) -> Option<f64>;

    fn parse_integer(&self, text: &str) -> Option<i64> {
        self.parse_number(text)
            .filter(|n| n.fract() == 0.0 && n.abs() <= i64::MAX as f64)
            .map(|n| n as i64)
    }
}

pub trait BooleanConverter: Debug + Send + Sync {
    fn parse_boolean(&self, text: &str) -> Option<bool>;

    /// Empty text yields `default`; unparseable text yields `None`.
    fn parse_boolean_or(&self, text: &str, default: bool) -> Option<bool> {
        if text.trim().is_empty() { Some(default) } else { self.parse_boolean(text) }
    }
}

pub trait QuietFlag: Debug + Send + Sync {
    fn is_quiet(&self, scope: &ScopeFrame) -> bool;
}

pub trait FallbackValue: Debug + Send + Sync {
    /// Text substituted for a failed call, if any. May be empty.
    fn fallback(&self, scope: &ScopeFrame) -> Option<String>;
}

pub trait RegexBuilder: Debug + Send + Sync {
    fn build(&self, source: &str) -> Result<Regex, BBTagError>;
}

pub trait RandomSource: Debug + Send + Sync {
    /// An index in `0..len`. `len` is never zero.
    fn index(&self, len: usize) -> usize;
    fn shuffle(&self, items: &mut [Value]);
}

/// The capabilities available to one execution.
#[derive(Debug, Clone)]
pub struct PluginSet {
    numbers: Arc<dyn NumberConverter>,
    booleans: Arc<dyn BooleanConverter>,
    quiet: Arc<dyn QuietFlag>,
    fallback: Arc<dyn FallbackValue>,
    regex: Arc<dyn RegexBuilder>,
    random: Arc<dyn RandomSource>,
}

impl Default for PluginSet {
    fn default() -> Self {
        Self {
            numbers: Arc::new(StandardNumbers),
            booleans: Arc::new(StandardBooleans),
            quiet: Arc::new(ScopeQuiet),
            fallback: Arc::new(ScopeFallback),
            regex: Arc::new(SafeRegexBuilder::default()),
            random: Arc::new(ThreadRandom),
        }
    }
}

impl PluginSet {
    pub fn numbers(&self) -> &dyn NumberConverter {
        self.numbers.as_ref()
    }

    pub fn booleans(&self) -> &dyn BooleanConverter {
        self.booleans.as_ref()
    }

    pub fn quiet(&self) -> &dyn QuietFlag {
        self.quiet.as_ref()
    }

    pub fn fallback(&self) -> &dyn FallbackValue {
        self.fallback.as_ref()
    }

    pub fn regex(&self) -> &dyn RegexBuilder {
        self.regex.as_ref()
    }

    pub fn random(&self) -> &dyn RandomSource {
        self.random.as_ref()
    }

    pub fn with_numbers(mut self, numbers: impl NumberConverter + 'static) -> Self {
        self.numbers = Arc::new(numbers);
        self
    }

    pub fn with_booleans(mut self, booleans: impl BooleanConverter + 'static) -> Self {
        self.booleans = Arc::new(booleans);
        self
    }

    pub fn with_quiet(mut self, quiet: impl QuietFlag + 'static) -> Self {
        self.quiet = Arc::new(quiet);
        self
    }

    pub fn with_fallback(mut self, fallback: impl FallbackValue + 'static) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    pub fn with_regex(mut self, regex: impl RegexBuilder + 'static) -> Self {
        self.regex = Arc::new(regex);
        self
    }

    pub fn with_random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Arc::new(random);
        self
    }
}
