use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::{debug, error, trace};

use crate::core::definition::SubtagDefinition;
use crate::errors::{BBTagError, EngineError};

/// Subtag definitions keyed by normalised id and alias.
///
/// Read-mostly: definitions are registered while building an engine and then
/// shared by every execution.
#[derive(Default)]
pub struct SubtagRegistry {
    definitions: RwLock<HashMap<String, Arc<SubtagDefinition>>>,
    prefixes: RwLock<Vec<Arc<SubtagDefinition>>>,
}

pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn poisoned(table: &str) -> BBTagError {
    error!("Failed to acquire read lock on subtag {}", table);
    BBTagError::host("Subtag registry lock poisoned")
}

impl SubtagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under its id and every alias.
    pub fn register(&self, definition: SubtagDefinition) -> Result<(), EngineError> {
        let definition = Arc::new(definition);
        let mut definitions = self.definitions.write().map_err(|_| {
            error!("Failed to acquire write lock on subtag definitions");
            EngineError::Internal("Subtag registry lock poisoned".to_string())
        })?;

        let keys: Vec<String> = std::iter::once(&definition.id)
            .chain(definition.aliases.iter())
            .map(|name| normalize(name))
            .collect();
        if let Some(taken) = keys.iter().find(|key| definitions.contains_key(*key)) {
            error!("Subtag '{}' is already registered", taken);
            return Err(EngineError::DuplicateSubtag(taken.clone()));
        }

        if definition.prefix {
            let mut prefixes = self.prefixes.write().map_err(|_| {
                error!("Failed to acquire write lock on subtag prefixes");
                EngineError::Internal("Subtag registry lock poisoned".to_string())
            })?;
            prefixes.push(Arc::clone(&definition));
            // Longest prefix first so more specific definitions win.
            prefixes.sort_by(|a, b| b.id.len().cmp(&a.id.len()));
        }

        debug!("Registering subtag: {} (aliases {:?})", definition.id, definition.aliases);
        for key in keys {
            definitions.insert(key, Arc::clone(&definition));
        }
        Ok(())
    }

    pub fn register_all(&self, definitions: Vec<SubtagDefinition>) -> Result<(), EngineError> {
        definitions.into_iter().try_for_each(|definition| self.register(definition))
    }

    /// Finds a definition by exact name, then by registered prefix.
    pub fn lookup(&self, name: &str) -> Result<Option<Arc<SubtagDefinition>>, BBTagError> {
        let name = normalize(name);
        let definitions = self.definitions.read().map_err(|_| poisoned("definitions"))?;
        if let Some(definition) = definitions.get(&name) {
            return Ok(Some(Arc::clone(definition)));
        }
        drop(definitions);

        let prefixes = self.prefixes.read().map_err(|_| poisoned("prefixes"))?;
        let found = prefixes.iter().find(|d| name.starts_with(d.id.as_str()) && name.len() > d.id.len()).cloned();
        trace!("Prefix lookup for '{}': {:?}", name, found.as_ref().map(|d| d.id.as_str()));
        Ok(found)
    }

    /// Registered ids (aliases excluded), sorted.
    pub fn ids(&self) -> Vec<String> {
        let Ok(definitions) = self.definitions.read() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = definitions
            .iter()
            .filter(|(key, definition)| **key == definition.id)
            .map(|(key, _)| key.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binder::BoundArgs;
    use crate::core::context::BBTagContext;
    use crate::core::definition::{SubtagCategory, SubtagResult};
    use crate::errors::ErrorKind;

    fn noop(_: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
        Ok(None)
    }

    fn definition(id: &str) -> SubtagDefinition {
        SubtagDefinition::builder(id, SubtagCategory::Text).signature(&[], "", noop).build().unwrap()
    }

    #[test]
    fn lookup_is_case_insensitive_and_follows_aliases() {
        let registry = SubtagRegistry::new();
        let definition = SubtagDefinition::builder("length", SubtagCategory::Text)
            .alias("len")
            .signature(&[], "", noop)
            .build()
            .unwrap();
        registry.register(definition).unwrap();

        assert_eq!(registry.lookup(" LENGTH ").unwrap().unwrap().id, "length");
        assert_eq!(registry.lookup("len").unwrap().unwrap().id, "length");
        assert!(registry.lookup("randomsubtag").unwrap().is_none());
        assert_eq!(registry.ids(), vec!["length".to_string()]);
    }

    #[test]
    fn duplicates_are_rejected() {
        let registry = SubtagRegistry::new();
        registry.register(definition("get")).unwrap();
        assert!(matches!(registry.register(definition("get")), Err(EngineError::DuplicateSubtag(_))));
    }

    #[test]
    fn prefix_definitions() {
        let registry = SubtagRegistry::new();
        let func = SubtagDefinition::builder("func.", SubtagCategory::Functions)
            .prefix()
            .signature(&[], "", noop)
            .build()
            .unwrap();
        registry.register(func).unwrap();

        assert_eq!(registry.lookup("func.greet").unwrap().unwrap().id, "func.");
        assert_eq!(registry.lookup("func.").unwrap().unwrap().id, "func.");
        assert!(registry.lookup("fun").unwrap().is_none());
    }

    #[test]
    fn poisoned_lock_is_a_host_failure() {
        let registry = Arc::new(SubtagRegistry::new());
        registry.register(definition("get")).unwrap();

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.definitions.write().unwrap();
            panic!("poison the registry");
        })
        .join();

        let error = registry.lookup("get").unwrap_err();
        assert_eq!(error.kind, ErrorKind::HostFailure);
        assert!(!error.kind.is_terminal());
    }
}
