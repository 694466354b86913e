use serde::{Deserialize, Serialize};

use crate::core::scope::ExecutionMeta;
use crate::errors::BBTagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Channel,
    Role,
    Message,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Channel => "channel",
            EntityKind::Role => "role",
            EntityKind::Message => "message",
        }
    }
}

/// The parts of a platform entity the engine's handlers read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Only accept exact ids; never run a fuzzy search.
    pub no_lookup: bool,
}

/// Host platform lookups (users, channels, roles, messages). Only subtag
/// handlers call this, through [`crate::core::context::BBTagContext`].
pub trait EntityLookup: Send + Sync {
    fn query_single(
        &self,
        meta: &ExecutionMeta,
        kind: EntityKind,
        query: &str,
        options: LookupOptions,
    ) -> Result<Option<Entity>, BBTagError>;

    fn get_all(&self, meta: &ExecutionMeta, kind: EntityKind) -> Result<Vec<Entity>, BBTagError>;
}
