// Declare submodules
pub mod binder;
pub mod context;
pub mod definition;
pub mod engine;
pub mod entities;
pub mod limits;
pub mod plugins;
pub mod scope;
pub mod store;
pub mod subtags;

// Re-export the types hosts touch most
pub use binder::{BoundArgs, SubtagArgument, bind};
pub use context::{AbortSignal, BBTagContext, ExecutionRequest, RuntimeState, ScopeFrame};
pub use definition::{SubtagCategory, SubtagDefinition, SubtagHandler, SubtagResult};
pub use engine::{Engine, ExecutionResult, NoYield, Scheduler, Termination, ThreadYield};
pub use entities::{Entity, EntityKind, EntityLookup, LookupOptions};
pub use scope::{ExecutionMeta, ScopeKind, ScopeProvider, ScopeResolver, VariableScope};
pub use store::{MemoryVariableStore, VariableStore};
