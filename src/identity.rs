//! Identity resolution — mapping an authenticated principal to a stored
//! identity.
//!
//! Issuing and verifying credentials is out of scope; this module only
//! resolves an already-authenticated principal name to an identity record.
//! An unresolvable principal is an authorization failure, never a silently
//! substituted default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::history::{HistoryStore, StorageResult};

/// Unique identifier for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(String);

impl IdentityId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved requester on whose behalf analysis attempts run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity with a generated id and current timestamp.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(),
            username: username.into(),
            created_at: Utc::now(),
        }
    }
}

/// Resolves an authenticated principal name to an identity record.
///
/// Returns `Ok(None)` when the principal has no identity — callers treat
/// that as an authorization failure before any record is created.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, principal: &str) -> StorageResult<Option<Identity>>;
}

/// Resolver backed by the history store's identity table.
pub struct StoreResolver {
    store: Arc<dyn HistoryStore>,
}

impl StoreResolver {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }
}

impl IdentityResolver for StoreResolver {
    fn resolve(&self, principal: &str) -> StorageResult<Option<Identity>> {
        self.store.find_identity(principal)
    }
}

/// Fixed-map resolver for testing — resolves only preregistered names.
#[derive(Default)]
pub struct StaticResolver {
    identities: HashMap<String, Identity>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity under its username.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identities.insert(identity.username.clone(), identity);
        self
    }
}

impl IdentityResolver for StaticResolver {
    fn resolve(&self, principal: &str) -> StorageResult<Option<Identity>> {
        Ok(self.identities.get(principal).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_resolver_finds_registered_identity() {
        let alice = Identity::new("alice");
        let resolver = StaticResolver::new().with_identity(alice.clone());

        let resolved = resolver.resolve("alice").unwrap();
        assert_eq!(resolved, Some(alice));
    }

    #[test]
    fn static_resolver_returns_none_for_unknown_principal() {
        let resolver = StaticResolver::new();
        assert_eq!(resolver.resolve("nobody").unwrap(), None);
    }

    #[test]
    fn identity_ids_are_unique() {
        assert_ne!(IdentityId::new(), IdentityId::new());
    }
}
