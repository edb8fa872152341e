//! The forwardable command model.
//!
//! A [`Command`] describes one mutation that happened on the sending node and
//! must be replayed on every peer. Commands are immutable once built; they
//! live from forwarding time until the peer has decoded and applied them.

use crate::ids::{AccountId, ChangeId, EntityKind, GroupUuid, IndexOperation};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Fingerprint of an entity's state at the time an index event was raised.
///
/// Only the change-like entities carry content hashes. The receiving side
/// compares it against its own state to decide whether a re-index would be
/// applied against data older than the sender's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEvent {
    /// Entity timestamp in seconds since the epoch.
    pub ts: i64,
    /// Hash of the entity's own history (e.g. the change meta ref).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_sha: Option<String>,
    /// Hash of the branch the entity targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sha: Option<String>,
}

impl IndexEvent {
    /// A fingerprint with only a timestamp.
    #[must_use]
    pub fn at(ts: i64) -> Self {
        Self {
            ts,
            meta_sha: None,
            target_sha: None,
        }
    }

    /// Adds the meta hash.
    pub fn with_meta(mut self, meta_sha: impl Into<String>) -> Self {
        self.meta_sha = Some(meta_sha.into());
        self
    }

    /// Adds the target branch hash.
    pub fn with_target(mut self, target_sha: impl Into<String>) -> Self {
        self.target_sha = Some(target_sha.into());
        self
    }
}

/// Re-index or delete one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntity {
    pub kind: EntityKind,
    /// `project~number` for changes, the numeric id for accounts, the UUID
    /// for groups and the project name for projects.
    pub entity_id: String,
    pub operation: IndexOperation,
    /// Batch (bulk) indexing runs on its own worker pool.
    pub batch_mode: bool,
    pub index_event: Option<IndexEvent>,
}

/// The operation a command carries.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    IndexEntity(IndexEntity),

    /// Evict one key from a named cache. `key_json` is itself a JSON
    /// document whose shape depends on the cache.
    EvictCache { cache_name: String, key_json: String },

    /// Re-dispatch a domain stream event locally.
    PostEvent { event: serde_json::Value },

    /// Add or remove a name in the project list.
    ProjectListChange { project: String, added: bool },

    /// Remove every change of a project from the index.
    DeleteAllForProject { project: String },
}

/// One forwardable operation plus the instant it was created.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub created_at: Timestamp,
    pub payload: CommandPayload,
}

impl Command {
    /// Creates a command stamped with the current time.
    #[must_use]
    pub fn new(payload: CommandPayload) -> Self {
        Self {
            created_at: Timestamp::now(),
            payload,
        }
    }

    /// Creates a command with an explicit creation time.
    #[must_use]
    pub fn with_created_at(payload: CommandPayload, created_at: Timestamp) -> Self {
        Self {
            created_at,
            payload,
        }
    }

    fn index(
        kind: EntityKind,
        entity_id: String,
        operation: IndexOperation,
        batch_mode: bool,
        index_event: Option<IndexEvent>,
    ) -> Self {
        Self::new(CommandPayload::IndexEntity(IndexEntity {
            kind,
            entity_id,
            operation,
            batch_mode,
            index_event,
        }))
    }

    pub fn index_change(change: &ChangeId, index_event: Option<IndexEvent>) -> Self {
        Self::index(
            EntityKind::Change,
            change.to_string(),
            IndexOperation::Index,
            false,
            index_event,
        )
    }

    pub fn batch_index_change(change: &ChangeId, index_event: Option<IndexEvent>) -> Self {
        Self::index(
            EntityKind::Change,
            change.to_string(),
            IndexOperation::Index,
            true,
            index_event,
        )
    }

    pub fn delete_change(change: &ChangeId) -> Self {
        Self::index(
            EntityKind::Change,
            change.to_string(),
            IndexOperation::Delete,
            false,
            None,
        )
    }

    pub fn index_account(account: AccountId, index_event: Option<IndexEvent>) -> Self {
        Self::index(
            EntityKind::Account,
            account.to_string(),
            IndexOperation::Index,
            false,
            index_event,
        )
    }

    pub fn index_group(group: &GroupUuid, index_event: Option<IndexEvent>) -> Self {
        Self::index(
            EntityKind::Group,
            group.to_string(),
            IndexOperation::Index,
            false,
            index_event,
        )
    }

    pub fn index_project(project: &str, index_event: Option<IndexEvent>) -> Self {
        Self::index(
            EntityKind::Project,
            project.to_string(),
            IndexOperation::Index,
            false,
            index_event,
        )
    }

    pub fn delete_project(project: &str) -> Self {
        Self::index(
            EntityKind::Project,
            project.to_string(),
            IndexOperation::Delete,
            false,
            None,
        )
    }

    pub fn delete_all_for_project(project: &str) -> Self {
        Self::new(CommandPayload::DeleteAllForProject {
            project: project.to_string(),
        })
    }

    pub fn evict_cache(cache_name: impl Into<String>, key_json: impl Into<String>) -> Self {
        Self::new(CommandPayload::EvictCache {
            cache_name: cache_name.into(),
            key_json: key_json.into(),
        })
    }

    pub fn post_event(event: serde_json::Value) -> Self {
        Self::new(CommandPayload::PostEvent { event })
    }

    pub fn add_to_project_list(project: &str) -> Self {
        Self::new(CommandPayload::ProjectListChange {
            project: project.to_string(),
            added: true,
        })
    }

    pub fn remove_from_project_list(project: &str) -> Self {
        Self::new(CommandPayload::ProjectListChange {
            project: project.to_string(),
            added: false,
        })
    }

    /// The wire discriminator, or a descriptive name for combinations that
    /// have none (account/group deletes).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match &self.payload {
            CommandPayload::IndexEntity(entity) => match (entity.kind, entity.operation) {
                (EntityKind::Change, IndexOperation::Index) => "update-change",
                (EntityKind::Change, IndexOperation::Delete) => "delete-change",
                (EntityKind::Account, IndexOperation::Index) => "index-account",
                (EntityKind::Group, IndexOperation::Index) => "index-group",
                (EntityKind::Project, IndexOperation::Index) => "index-project",
                (EntityKind::Project, IndexOperation::Delete) => "delete-project",
                (EntityKind::Account, IndexOperation::Delete) => "delete-account",
                (EntityKind::Group, IndexOperation::Delete) => "delete-group",
            },
            CommandPayload::EvictCache { .. } => "evict-cache",
            CommandPayload::PostEvent { .. } => "post-event",
            CommandPayload::ProjectListChange { added: true, .. } => "add-to-project-list",
            CommandPayload::ProjectListChange { added: false, .. } => "remove-from-project-list",
            CommandPayload::DeleteAllForProject { .. } => "delete-all-project-changes",
        }
    }

    /// Short identifier of what the command touches, for logs.
    #[must_use]
    pub fn subject(&self) -> String {
        match &self.payload {
            CommandPayload::IndexEntity(entity) => entity.entity_id.clone(),
            CommandPayload::EvictCache {
                cache_name,
                key_json,
            } => format!("{cache_name}[{key_json}]"),
            CommandPayload::PostEvent { event } => event
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("event")
                .to_string(),
            CommandPayload::ProjectListChange { project, .. }
            | CommandPayload::DeleteAllForProject { project } => project.clone(),
        }
    }

    /// The index payload, if this is an index command.
    #[must_use]
    pub fn as_index(&self) -> Option<&IndexEntity> {
        match &self.payload {
            CommandPayload::IndexEntity(entity) => Some(entity),
            _ => None,
        }
    }
}
