//! Narrow interfaces to the host application.
//!
//! All calls are synchronous and may block on local I/O. Handlers only call
//! them from `spawn_blocking` threads with the forwarded flag set, so a host
//! listener reacting to the mutation sees [`is_forwarded`] and stays quiet.
//!
//! Every mutation must be idempotent: a command can be delivered more than
//! once, and partially applied mutations are never rolled back.
//!
//! [`is_forwarded`]: haforward_transport::context::is_forwarded

use crate::error::HostResult;
use chrono::{DateTime, Utc};
use haforward_types::{CacheEntry, ChangeId, EntityKind, ProjectName};

/// The host's search index.
pub trait IndexHost: Send + Sync {
    fn index(&self, kind: EntityKind, id: &str) -> HostResult<()>;

    fn delete(&self, kind: EntityKind, id: &str) -> HostResult<()>;

    /// Removes every change of `project` from the index.
    fn delete_all_changes(&self, project: &ProjectName) -> HostResult<()>;
}

/// The host's in-memory caches.
pub trait CacheHost: Send + Sync {
    fn evict(&self, entry: &CacheEntry) -> HostResult<()>;
}

/// Local dispatch of domain stream events.
pub trait EventHost: Send + Sync {
    fn dispatch(&self, event: &serde_json::Value) -> HostResult<()>;
}

/// The host's list of existing projects.
pub trait ProjectListHost: Send + Sync {
    fn update(&self, project: &ProjectName, added: bool) -> HostResult<()>;
}

/// Read access to the local state of a change.
///
/// `current_timestamp` returns [`HostError::NotFound`] when the change does
/// not exist locally.
///
/// [`HostError::NotFound`]: crate::error::HostError::NotFound
pub trait ChangeStateReader: Send + Sync {
    /// Last update of the change, in seconds since the epoch.
    fn current_timestamp(&self, change: &ChangeId) -> HostResult<i64>;

    /// Hash of the change's own history.
    fn meta_fingerprint(&self, change: &ChangeId) -> HostResult<Option<String>>;

    /// Hash of the branch the change targets.
    fn target_fingerprint(&self, change: &ChangeId) -> HostResult<Option<String>>;
}

/// An entity reported by an [`EntityScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedEntity {
    pub id: String,
    pub modified: DateTime<Utc>,
}

impl ModifiedEntity {
    pub fn new(id: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            modified,
        }
    }
}

/// Enumerates entities for the catch-up scheduler.
pub trait EntityScanner: Send + Sync {
    /// Entities of `kind` modified strictly after `since`.
    fn modified_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> HostResult<Vec<ModifiedEntity>>;
}
