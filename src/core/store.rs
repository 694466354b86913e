use std::{collections::HashMap, sync::RwLock};

use log::{debug, error, trace};
use serde_json::Value;

use crate::core::scope::VariableScope;
use crate::errors::BBTagError;

/// Externally owned variable storage.
///
/// Writes must be visible to every later read within the same execution;
/// the engine never caches values read from the store.
pub trait VariableStore: Send + Sync {
    fn get(&self, scope: &VariableScope, name: &str) -> Result<Option<Value>, BBTagError>;
    fn set(&self, scope: &VariableScope, name: &str, value: Value) -> Result<(), BBTagError>;
    /// Removes the named variables from the scope.
    fn reset(&self, scope: &VariableScope, names: &[String]) -> Result<(), BBTagError>;
}

/// A process-local [`VariableStore`].
#[derive(Debug, Default)]
pub struct MemoryVariableStore {
    variables: RwLock<HashMap<(VariableScope, String), Value>>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variables.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> BBTagError {
    error!("Failed to acquire lock on variables");
    BBTagError::host("Variable lock poisoned")
}

impl VariableStore for MemoryVariableStore {
    fn get(&self, scope: &VariableScope, name: &str) -> Result<Option<Value>, BBTagError> {
        let variables = self.variables.read().map_err(|_| poisoned())?;
        let value = variables.get(&(scope.clone(), name.to_string())).cloned();
        trace!("MemoryVariableStore::get: {:?} '{}' -> {:?}", scope, name, value);
        Ok(value)
    }

    fn set(&self, scope: &VariableScope, name: &str, value: Value) -> Result<(), BBTagError> {
        let mut variables = self.variables.write().map_err(|_| poisoned())?;
        debug!("Setting variable '{}' in {:?}", name, scope);
        variables.insert((scope.clone(), name.to_string()), value);
        Ok(())
    }

    fn reset(&self, scope: &VariableScope, names: &[String]) -> Result<(), BBTagError> {
        let mut variables = self.variables.write().map_err(|_| poisoned())?;
        for name in names {
            debug!("Resetting variable '{}' in {:?}", name, scope);
            variables.remove(&(scope.clone(), name.clone()));
        }
        Ok(())
    }
}
