use std::fmt;

use log::warn;

use crate::config::LimitConfig;
use crate::errors::BBTagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKey {
    Loops,
    Calls,
    Requests,
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKey::Loops => write!(f, "loops"),
            LimitKey::Calls => write!(f, "subtag calls"),
            LimitKey::Requests => write!(f, "requests"),
        }
    }
}

/// Per-execution resource governor.
#[derive(Debug, Clone)]
pub struct LimitTracker {
    config: LimitConfig,
    loops: u64,
    calls: u64,
    requests: u64,
}

impl LimitTracker {
    pub fn new(config: LimitConfig) -> Self {
        Self { config, loops: 0, calls: 0, requests: 0 }
    }

    /// Counts one unit of `key`. Fails, without counting, when that unit would
    /// exceed the ceiling; the caller must then skip the guarded work.
    pub fn check(&mut self, key: LimitKey) -> Result<(), BBTagError> {
        let (count, ceiling) = match key {
            LimitKey::Loops => (&mut self.loops, self.config.max_loops),
            LimitKey::Calls => (&mut self.calls, self.config.max_calls),
            LimitKey::Requests => (&mut self.requests, self.config.max_requests),
        };
        if *count >= ceiling {
            warn!("Limit exceeded: {} (ceiling {})", key, ceiling);
            return Err(BBTagError::limit_exceeded(&key.to_string(), ceiling));
        }
        *count += 1;
        Ok(())
    }

    /// Fails when a call at `depth` would nest deeper than allowed.
    pub fn check_depth(&self, depth: usize) -> Result<(), BBTagError> {
        if depth > self.config.max_depth {
            warn!("Limit exceeded: call depth {} (ceiling {})", depth, self.config.max_depth);
            return Err(BBTagError::limit_exceeded("nested calls", self.config.max_depth as u64));
        }
        Ok(())
    }

    pub fn used(&self, key: LimitKey) -> u64 {
        match key {
            LimitKey::Loops => self.loops,
            LimitKey::Calls => self.calls,
            LimitKey::Requests => self.requests,
        }
    }
}
