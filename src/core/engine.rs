use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::core::binder::bind;
use crate::core::context::{BBTagContext, CallFrame, ExecutionRequest, RuntimeState};
use crate::core::entities::EntityLookup;
use crate::core::limits::LimitKey;
use crate::core::plugins::PluginSet;
use crate::core::scope::ScopeResolver;
use crate::core::store::VariableStore;
use crate::errors::{BBTagError, LocatedError};
use crate::parser::parse;
use crate::registry::{SubtagRegistry, normalize};
use crate::types::{Statement, StatementPart, SubtagCall};

/// Host hook called every `yield_interval` evaluation steps.
pub trait Scheduler: Send + Sync {
    fn yield_now(&self);
}

/// Yields the OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadYield;

impl Scheduler for ThreadYield {
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// For fully synchronous hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoYield;

impl Scheduler for NoYield {
    fn yield_now(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    /// A `return` ended the document early.
    Returned,
    /// A forced return or a terminal error.
    Aborted,
    /// The abort signal fired.
    Cancelled,
}

/// Output of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub output: String,
    pub errors: Vec<LocatedError>,
    pub termination: Termination,
    pub steps: u64,
}

/// The shared, read-mostly half of the interpreter. Each execution gets its
/// own [`BBTagContext`].
pub struct Engine {
    pub(crate) registry: SubtagRegistry,
    pub(crate) scopes: ScopeResolver,
    pub(crate) store: Arc<dyn VariableStore>,
    pub(crate) entities: Option<Arc<dyn EntityLookup>>,
    pub(crate) plugins: PluginSet,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn registry(&self) -> &SubtagRegistry {
        &self.registry
    }

    pub fn scopes(&self) -> &ScopeResolver {
        &self.scopes
    }

    pub fn store(&self) -> &dyn VariableStore {
        self.store.as_ref()
    }

    pub fn entities(&self) -> Option<&dyn EntityLookup> {
        self.entities.as_deref()
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parse(&self, source: &str) -> Statement {
        parse(source)
    }

    pub fn execute(&self, source: &str, request: ExecutionRequest) -> ExecutionResult {
        let statement = parse(source);
        self.execute_statement(&statement, request)
    }

    pub fn execute_statement(&self, statement: &Statement, request: ExecutionRequest) -> ExecutionResult {
        debug!("Executing tag '{}'", request.meta.tag_name);
        let mut ctx = BBTagContext::new(self, request);
        let output = ctx.eval(statement);

        let termination = if ctx.cancelled {
            Termination::Cancelled
        } else {
            match ctx.state {
                RuntimeState::Running => Termination::Completed,
                RuntimeState::Returning => Termination::Returned,
                RuntimeState::Aborted => Termination::Aborted,
            }
        };
        info!(
            "Tag '{}' finished: {:?} after {} steps with {} errors",
            ctx.meta().tag_name,
            termination,
            ctx.steps,
            ctx.errors.len()
        );

        ExecutionResult { output, errors: std::mem::take(&mut ctx.errors), termination, steps: ctx.steps }
    }
}

/// Depth-first evaluation of a statement. Stops before the next sibling once
/// the execution leaves the running state.
pub(crate) fn eval_statement(ctx: &mut BBTagContext<'_>, statement: &Statement) -> String {
    let mut output = String::new();
    for value in &statement.values {
        if !ctx.is_running() {
            break;
        }
        match value {
            StatementPart::Literal { text, .. } => output.push_str(text),
            StatementPart::Subtag(call) => output.push_str(&eval_subtag(ctx, call)),
        }
    }
    output
}

/// Counts a step, yields on the configured interval and polls the abort
/// signal. Returns false once the execution has been cancelled.
fn tick(ctx: &mut BBTagContext<'_>) -> bool {
    ctx.steps += 1;
    let interval = ctx.engine().config().yield_interval;
    if interval > 0 && ctx.steps % interval == 0 {
        trace!("Yielding to scheduler after {} steps", ctx.steps);
        ctx.engine().scheduler.yield_now();
    }
    if ctx.abort.is_aborted() {
        if !ctx.cancelled {
            warn!("Execution cancelled after {} steps", ctx.steps);
        }
        ctx.cancelled = true;
        ctx.state = RuntimeState::Aborted;
        return false;
    }
    true
}

fn eval_subtag(ctx: &mut BBTagContext<'_>, call: &SubtagCall) -> String {
    if !tick(ctx) {
        return String::new();
    }

    let name = normalize(&ctx.eval(&call.name));
    if !ctx.is_running() {
        return String::new();
    }

    match invoke(ctx, call, &name) {
        Ok(output) => output,
        Err(error) => handle_error(ctx, call, &name, error),
    }
}

fn invoke(ctx: &mut BBTagContext<'_>, call: &SubtagCall, name: &str) -> Result<String, BBTagError> {
    let definition = ctx
        .engine()
        .registry()
        .lookup(name)?
        .ok_or_else(|| BBTagError::unknown_subtag(name))?;

    ctx.check_limit(LimitKey::Calls)?;
    ctx.limits.check_depth(ctx.call_stack.len() + 1)?;

    let bound = bind(&definition, &call.args)?;
    trace!("Calling {} at {}", name, call.range);

    ctx.call_stack.push(CallFrame { name: name.to_string(), range: call.range });
    bound.resolve_eager(ctx);
    let result = if ctx.is_running() { bound.signature().handler.execute(ctx, &bound) } else { Ok(None) };
    ctx.call_stack.pop();

    result.map(Option::unwrap_or_default)
}

/// Records the error against the call and returns the text rendered in its
/// place.
fn handle_error(ctx: &mut BBTagContext<'_>, call: &SubtagCall, name: &str, error: BBTagError) -> String {
    let placeholder = match &error.display {
        Some(display) => display.clone(),
        None => ctx
            .plugins()
            .fallback()
            .fallback(ctx.scope())
            .unwrap_or_else(|| format!("`{}`", error.message)),
    };

    if error.kind.is_terminal() {
        warn!("Terminal error in {{{}}} at {}: {}", name, call.range, error);
        ctx.state = RuntimeState::Aborted;
    } else {
        debug!("Error in {{{}}} at {}: {}", name, call.range, error);
    }

    let stack = ctx.call_stack.iter().map(|frame| frame.name.clone()).collect();
    ctx.record_error(LocatedError { range: call.range, subtag: name.to_string(), error, stack });
    placeholder
}
