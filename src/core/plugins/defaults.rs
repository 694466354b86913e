use lazy_static::lazy_static;
use log::{debug, trace};
use rand::{Rng, seq::SliceRandom};
use regex::Regex;
use serde_json::Value;

use super::{BooleanConverter, FallbackValue, NumberConverter, QuietFlag, RandomSource, RegexBuilder};
use crate::core::context::ScopeFrame;
use crate::errors::BBTagError;

lazy_static! {
    static ref REGEX_LITERAL: Regex = Regex::new(r"(?s)^/(.*)/([a-z]*)$").unwrap();
}

/// Decimal numbers with surrounding whitespace ignored. NaN and infinities
/// are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNumbers;

impl NumberConverter for StandardNumbers {
    fn parse_number(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        text.parse::<f64>().ok().filter(|n| n.is_finite())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBooleans;

impl BooleanConverter for StandardBooleans {
    fn parse_boolean(&self, text: &str) -> Option<bool> {
        match text.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        }
    }
}

/// Reads the quiet flag of the current scope frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeQuiet;

impl QuietFlag for ScopeQuiet {
    fn is_quiet(&self, scope: &ScopeFrame) -> bool {
        scope.quiet.unwrap_or(false)
    }
}

/// Reads the fallback text of the current scope frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeFallback;

impl FallbackValue for ScopeFallback {
    fn fallback(&self, scope: &ScopeFrame) -> Option<String> {
        scope.fallback.clone()
    }
}

/// Builds regexes from `/pattern/flags` (or a bare pattern) with a compiled
/// size ceiling.
#[derive(Debug, Clone)]
pub struct SafeRegexBuilder {
    size_limit: usize,
}

impl SafeRegexBuilder {
    pub fn new(size_limit: usize) -> Self {
        Self { size_limit }
    }
}

impl Default for SafeRegexBuilder {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl RegexBuilder for SafeRegexBuilder {
    fn build(&self, source: &str) -> Result<Regex, BBTagError> {
        let (pattern, flags) = match REGEX_LITERAL.captures(source) {
            Some(caps) => (
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(2).map_or("", |m| m.as_str()),
            ),
            None => (source, ""),
        };
        trace!("Building regex '{}' with flags '{}'", pattern, flags);

        let mut builder = regex::RegexBuilder::new(pattern);
        builder.size_limit(self.size_limit).nest_limit(64);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                // Global matching is the caller's choice, not a compile flag.
                'g' => (),
                other => {
                    return Err(BBTagError::unsafe_input(format!("Unsupported regex flag `{}`", other)));
                }
            }
        }

        builder.build().map_err(|e| {
            debug!("Rejected regex '{}': {}", pattern, e);
            match e {
                regex::Error::CompiledTooBig(_) => BBTagError::unsafe_input("Unsafe regex detected"),
                other => BBTagError::unsafe_input(format!("Invalid regex: {}", other)),
            }
        })
    }
}

/// Thread-local randomness from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }

    fn shuffle(&self, items: &mut [Value]) {
        items.shuffle(&mut rand::rng());
    }
}
