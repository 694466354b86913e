use std::sync::Arc;

use log::debug;

pub mod config;
pub mod core;
pub mod errors;
pub mod registry;
pub mod types;
mod parser;

pub use config::{EngineConfig, LimitConfig};
pub use crate::core::{
    AbortSignal, BBTagContext, Engine, ExecutionMeta, ExecutionRequest, ExecutionResult, MemoryVariableStore,
    Termination,
};
pub use errors::{BBTagError, EngineError, ErrorKind, LocatedError};
pub use parser::parse;
pub use registry::SubtagRegistry;
pub use types::{SourceMarker, SourceRange, Statement, StatementPart, SubtagCall};

use crate::core::definition::SubtagDefinition;
use crate::core::engine::{Scheduler, ThreadYield};
use crate::core::entities::EntityLookup;
use crate::core::plugins::{PluginSet, SafeRegexBuilder};
use crate::core::scope::{ScopeProvider, ScopeResolver, default_providers};
use crate::core::store::VariableStore;
use crate::core::subtags::standard_definitions;

/// Assembles an [`Engine`]. Every part has a working default: an in-memory
/// store, the standard scope prefixes, the standard plugins, thread yielding
/// and the standard subtag set.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn VariableStore>>,
    entities: Option<Arc<dyn EntityLookup>>,
    providers: Vec<ScopeProvider>,
    plugins: Option<PluginSet>,
    scheduler: Arc<dyn Scheduler>,
    definitions: Vec<SubtagDefinition>,
    standard: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            entities: None,
            providers: default_providers(),
            plugins: None,
            scheduler: Arc::new(ThreadYield),
            definitions: Vec::new(),
            standard: true,
        }
    }
}

impl EngineBuilder {
    /// Creates a builder with every default in place
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets limits, yield interval, timeout and regex ceiling
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the backend for tag, author, guild and global variables
    pub fn with_store(mut self, store: impl VariableStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets the host platform lookups
    pub fn with_entities(mut self, entities: impl EntityLookup + 'static) -> Self {
        self.entities = Some(Arc::new(entities));
        self
    }

    /// Replaces the variable scope prefixes
    pub fn with_scope_providers(mut self, providers: Vec<ScopeProvider>) -> Self {
        self.providers = providers;
        self
    }

    /// Sets the default plugins; executions may still bring their own
    pub fn with_plugins(mut self, plugins: PluginSet) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Registers an extra subtag
    pub fn register(mut self, definition: SubtagDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Leaves the standard subtag set out
    pub fn without_standard_subtags(mut self) -> Self {
        self.standard = false;
        self
    }

    /// Builds the engine, validating scopes and registrations
    pub fn build(self) -> Result<Engine, EngineError> {
        let scopes = ScopeResolver::new(self.providers)?;

        let registry = SubtagRegistry::new();
        if self.standard {
            registry.register_all(standard_definitions()?)?;
        }
        registry.register_all(self.definitions)?;
        debug!("Engine built with {} subtags", registry.ids().len());

        let plugins = self
            .plugins
            .unwrap_or_else(|| PluginSet::default().with_regex(SafeRegexBuilder::new(self.config.regex_size_limit)));

        let store: Arc<dyn VariableStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryVariableStore::new()),
        };

        Ok(Engine {
            registry,
            scopes,
            store,
            entities: self.entities,
            plugins,
            scheduler: self.scheduler,
            config: self.config,
        })
    }
}
