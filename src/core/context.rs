use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, trace};
use serde::Serialize;
use serde_json::Value;

use crate::config::LimitConfig;
use crate::core::engine::{Engine, eval_statement};
use crate::core::entities::{Entity, EntityKind, EntityLookup, LookupOptions};
use crate::core::limits::{LimitKey, LimitTracker};
use crate::core::plugins::PluginSet;
use crate::core::scope::{ExecutionMeta, VariableScope};
use crate::errors::{BBTagError, LocatedError};
use crate::types::{SourceRange, Statement};

/// Whether evaluation continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Running,
    /// Unwinding to the nearest function boundary (or the root).
    Returning,
    /// Unwinding out of the whole execution.
    Aborted,
}

/// Per-scope settings and call-local variables. The root frame lives for the
/// whole execution; each user function call pushes its own frame.
#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    pub quiet: Option<bool>,
    pub fallback: Option<String>,
    pub temporaries: HashMap<String, Value>,
    pub params: Vec<String>,
}

/// A subtag call in flight. Used for error attribution only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub name: String,
    pub range: SourceRange,
}

/// Cancels an execution from outside. Timeouts are deadlines on the same
/// signal.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Per-execution inputs supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub meta: ExecutionMeta,
    pub plugins: Option<PluginSet>,
    pub abort: Option<AbortSignal>,
    pub limits: Option<LimitConfig>,
}

impl ExecutionRequest {
    pub fn new(tag_name: &str) -> Self {
        Self {
            meta: ExecutionMeta { tag_name: tag_name.to_string(), ..ExecutionMeta::default() },
            ..Self::default()
        }
    }

    pub fn author(mut self, author_id: &str) -> Self {
        self.meta.author_id = Some(author_id.to_string());
        self
    }

    pub fn guild(mut self, guild_id: &str) -> Self {
        self.meta.guild_id = Some(guild_id.to_string());
        self
    }

    pub fn channel(mut self, channel_id: &str) -> Self {
        self.meta.channel_id = Some(channel_id.to_string());
        self
    }

    pub fn plugins(mut self, plugins: PluginSet) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    pub fn limits(mut self, limits: LimitConfig) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Mutable state of one execution.
pub struct BBTagContext<'e> {
    engine: &'e Engine,
    meta: ExecutionMeta,
    pub(crate) state: RuntimeState,
    scopes: Vec<ScopeFrame>,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) limits: LimitTracker,
    plugins: PluginSet,
    pub(crate) errors: Vec<LocatedError>,
    catches: Vec<Vec<LocatedError>>,
    functions: HashMap<String, Arc<Statement>>,
    pub(crate) abort: AbortSignal,
    pub(crate) steps: u64,
    pub(crate) cancelled: bool,
}

impl<'e> BBTagContext<'e> {
    pub(crate) fn new(engine: &'e Engine, request: ExecutionRequest) -> Self {
        let limits = request.limits.unwrap_or_else(|| engine.config().limits.clone());
        let abort = request.abort.unwrap_or_else(|| match engine.config().timeout() {
            Some(timeout) => AbortSignal::new().with_timeout(timeout),
            None => AbortSignal::new(),
        });
        Self {
            engine,
            meta: request.meta,
            state: RuntimeState::Running,
            scopes: vec![ScopeFrame::default()],
            call_stack: Vec::new(),
            limits: LimitTracker::new(limits),
            plugins: request.plugins.unwrap_or_else(|| engine.plugins().clone()),
            errors: Vec::new(),
            catches: Vec::new(),
            functions: HashMap::new(),
            abort,
            steps: 0,
            cancelled: false,
        }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn meta(&self) -> &ExecutionMeta {
        &self.meta
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    /// Evaluates a statement in this context.
    pub fn eval(&mut self, statement: &Statement) -> String {
        eval_statement(self, statement)
    }

    // --- Runtime state ---

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn set_state(&mut self, state: RuntimeState) {
        debug!("Runtime state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    pub fn is_running(&self) -> bool {
        self.state == RuntimeState::Running
    }

    pub fn check_limit(&mut self, key: LimitKey) -> Result<(), BBTagError> {
        self.limits.check(key)
    }

    pub fn limits(&self) -> &LimitTracker {
        &self.limits
    }

    pub fn errors(&self) -> &[LocatedError] {
        &self.errors
    }

    /// Runs `f` with non-terminal errors intercepted. Intercepted errors are
    /// handed back instead of reaching the execution's report; terminal errors
    /// are always reported and still abort.
    pub fn catch_errors<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (T, Vec<LocatedError>) {
        self.catches.push(Vec::new());
        let value = f(self);
        let caught = self.catches.pop().unwrap_or_default();
        (value, caught)
    }

    /// Routes an attached error to the innermost catch frame, or to the report.
    pub(crate) fn record_error(&mut self, error: LocatedError) {
        match self.catches.last_mut() {
            Some(caught) if !error.error.kind.is_terminal() => {
                trace!("Intercepted error in {{{}}} at {}", error.subtag, error.range);
                caught.push(error);
            }
            _ => self.errors.push(error),
        }
    }

    // --- Call stack ---

    pub fn call_stack(&self) -> &[CallFrame] {
        &self.call_stack
    }

    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.call_stack.last()
    }

    /// Name the current subtag was called with.
    pub fn current_name(&self) -> &str {
        self.current_frame().map_or("", |frame| frame.name.as_str())
    }

    // --- Scope frames ---

    pub fn scope(&self) -> &ScopeFrame {
        // The root frame is never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn scope_mut(&mut self) -> &mut ScopeFrame {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    pub fn push_scope(&mut self, frame: ScopeFrame) {
        trace!("Pushing scope frame (depth {})", self.scopes.len() + 1);
        self.scopes.push(frame);
    }

    pub fn pop_scope(&mut self) -> Option<ScopeFrame> {
        if self.scopes.len() > 1 { self.scopes.pop() } else { None }
    }

    pub fn is_quiet(&self) -> bool {
        self.plugins.quiet().is_quiet(self.scope())
    }

    // --- Variables ---

    fn storage(&self, raw: &str) -> Result<(Option<VariableScope>, String), BBTagError> {
        let (kind, name) = self.engine.scopes().resolve(raw)?;
        let scope = self.meta.storage_scope(kind)?;
        Ok((scope, name.to_string()))
    }

    pub fn get_variable(&self, raw: &str) -> Result<Option<Value>, BBTagError> {
        match self.storage(raw)? {
            (None, name) => Ok(self.scope().temporaries.get(&name).cloned()),
            (Some(scope), name) => self.engine.store().get(&scope, &name),
        }
    }

    pub fn set_variable(&mut self, raw: &str, value: Value) -> Result<(), BBTagError> {
        match self.storage(raw)? {
            (None, name) => {
                trace!("Setting temporary '{}'", name);
                self.scope_mut().temporaries.insert(name, value);
                Ok(())
            }
            (Some(scope), name) => self.engine.store().set(&scope, &name, value),
        }
    }

    pub fn reset_variable(&mut self, raw: &str) -> Result<(), BBTagError> {
        match self.storage(raw)? {
            (None, name) => {
                self.scope_mut().temporaries.remove(&name);
                Ok(())
            }
            (Some(scope), name) => self.engine.store().reset(&scope, &[name]),
        }
    }

    /// Puts a variable back to a previously read state.
    pub fn restore_variable(&mut self, raw: &str, previous: Option<Value>) -> Result<(), BBTagError> {
        match previous {
            Some(value) => self.set_variable(raw, value),
            None => self.reset_variable(raw),
        }
    }

    // --- User functions ---

    pub fn define_function(&mut self, name: &str, body: Statement) {
        debug!("Defining function '{}'", name);
        self.functions.insert(name.to_lowercase(), Arc::new(body));
    }

    pub fn function(&self, name: &str) -> Option<Arc<Statement>> {
        self.functions.get(&name.to_lowercase()).cloned()
    }

    // --- Host services ---

    fn entities(&self) -> Result<&'e dyn EntityLookup, BBTagError> {
        self.engine
            .entities()
            .ok_or_else(|| BBTagError::host("No entity lookup service is configured"))
    }

    /// Looks up one entity, counting against the request limit.
    pub fn query_entity(
        &mut self,
        kind: EntityKind,
        query: &str,
        options: LookupOptions,
    ) -> Result<Option<Entity>, BBTagError> {
        let entities = self.entities()?;
        self.limits.check(LimitKey::Requests)?;
        entities.query_single(&self.meta, kind, query, options)
    }

    pub fn list_entities(&mut self, kind: EntityKind) -> Result<Vec<Entity>, BBTagError> {
        let entities = self.entities()?;
        self.limits.check(LimitKey::Requests)?;
        entities.get_all(&self.meta, kind)
    }
}
