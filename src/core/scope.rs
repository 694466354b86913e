use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::errors::{BBTagError, EngineError};

/// Logical partition of variable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Lives in the current scope frame of one execution.
    Temporary,
    /// Persisted per tag.
    Tag,
    Author,
    Guild,
    Global,
}

/// Concrete storage scope handed to a [`crate::core::store::VariableStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "key", rename_all = "snake_case")]
pub enum VariableScope {
    Tag(String),
    Author(String),
    Guild(String),
    Global,
}

/// Who is running the document; used to key tag, author and guild storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMeta {
    pub tag_name: String,
    pub author_id: Option<String>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
}

impl ExecutionMeta {
    /// Maps a persisted scope kind to its storage scope. `Temporary` has no
    /// store representation and yields `None`.
    pub fn storage_scope(&self, kind: ScopeKind) -> Result<Option<VariableScope>, BBTagError> {
        match kind {
            ScopeKind::Temporary => Ok(None),
            ScopeKind::Tag => Ok(Some(VariableScope::Tag(self.tag_name.clone()))),
            ScopeKind::Global => Ok(Some(VariableScope::Global)),
            ScopeKind::Author => self
                .author_id
                .clone()
                .map(|id| Some(VariableScope::Author(id)))
                .ok_or_else(|| BBTagError::unknown_scope("Author variables are unavailable without an author")),
            ScopeKind::Guild => self
                .guild_id
                .clone()
                .map(|id| Some(VariableScope::Guild(id)))
                .ok_or_else(|| BBTagError::unknown_scope("Guild variables are unavailable outside a guild")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeProvider {
    pub prefix: String,
    pub kind: ScopeKind,
}

impl ScopeProvider {
    pub fn new(prefix: impl Into<String>, kind: ScopeKind) -> Self {
        Self { prefix: prefix.into(), kind }
    }
}

/// The standard prefixes: `~` temporary, `@` author, `_` guild, `*` global,
/// and no prefix for tag variables.
pub fn default_providers() -> Vec<ScopeProvider> {
    vec![
        ScopeProvider::new("", ScopeKind::Tag),
        ScopeProvider::new("~", ScopeKind::Temporary),
        ScopeProvider::new("@", ScopeKind::Author),
        ScopeProvider::new("_", ScopeKind::Guild),
        ScopeProvider::new("*", ScopeKind::Global),
    ]
}

/// Resolves raw variable names by longest matching prefix.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    providers: Vec<ScopeProvider>,
}

impl ScopeResolver {
    /// Fails when no empty-prefix provider exists or a prefix repeats.
    pub fn new(mut providers: Vec<ScopeProvider>) -> Result<Self, EngineError> {
        providers.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        for pair in providers.windows(2) {
            if pair[0].prefix == pair[1].prefix {
                return Err(EngineError::DuplicateScopePrefix(pair[0].prefix.clone()));
            }
        }
        if !providers.iter().any(|p| p.prefix.is_empty()) {
            return Err(EngineError::MissingFallbackScope);
        }

        debug!(
            "Scope resolver ready with prefixes {:?}",
            providers.iter().map(|p| p.prefix.as_str()).collect::<Vec<_>>()
        );
        Ok(Self { providers })
    }

    /// Returns the scope kind and the name with its prefix stripped.
    pub fn resolve<'n>(&self, raw: &'n str) -> Result<(ScopeKind, &'n str), BBTagError> {
        let provider = self
            .providers
            .iter()
            .find(|p| raw.starts_with(p.prefix.as_str()))
            .ok_or_else(|| BBTagError::unknown_scope(format!("No variable scope matches `{}`", raw)))?;
        let name = &raw[provider.prefix.len()..];
        trace!("Resolved variable '{}' to {:?} '{}'", raw, provider.kind, name);
        Ok((provider.kind, name))
    }

    pub fn providers(&self) -> &[ScopeProvider] {
        &self.providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let resolver = ScopeResolver::new(vec![
            ScopeProvider::new("", ScopeKind::Tag),
            ScopeProvider::new("~", ScopeKind::Temporary),
        ])
        .unwrap();
        assert_eq!(resolver.resolve("~foo").unwrap(), (ScopeKind::Temporary, "foo"));
        assert_eq!(resolver.resolve("foo").unwrap(), (ScopeKind::Tag, "foo"));
    }

    #[test]
    fn longer_prefixes_shadow_shorter_ones() {
        let resolver = ScopeResolver::new(vec![
            ScopeProvider::new("", ScopeKind::Tag),
            ScopeProvider::new("*", ScopeKind::Global),
            ScopeProvider::new("**", ScopeKind::Guild),
        ])
        .unwrap();
        assert_eq!(resolver.resolve("**x").unwrap(), (ScopeKind::Guild, "x"));
        assert_eq!(resolver.resolve("*x").unwrap(), (ScopeKind::Global, "x"));
    }

    #[test]
    fn missing_fallback_is_rejected() {
        let result = ScopeResolver::new(vec![ScopeProvider::new("~", ScopeKind::Temporary)]);
        assert!(matches!(result, Err(EngineError::MissingFallbackScope)));
    }

    #[test]
    fn duplicate_prefix_is_rejected() {
        let result = ScopeResolver::new(vec![
            ScopeProvider::new("", ScopeKind::Tag),
            ScopeProvider::new("", ScopeKind::Global),
        ]);
        assert!(matches!(result, Err(EngineError::DuplicateScopePrefix(p)) if p.is_empty()));
    }

    #[test]
    fn storage_scope_requires_ids() {
        let meta = ExecutionMeta { tag_name: "t".into(), author_id: None, guild_id: Some("g".into()), channel_id: None };
        assert_eq!(meta.storage_scope(ScopeKind::Tag).unwrap(), Some(VariableScope::Tag("t".into())));
        assert_eq!(meta.storage_scope(ScopeKind::Guild).unwrap(), Some(VariableScope::Guild("g".into())));
        assert_eq!(meta.storage_scope(ScopeKind::Temporary).unwrap(), None);
        let error = meta.storage_scope(ScopeKind::Author).unwrap_err();
        assert!(error.kind.is_terminal());
    }
}
