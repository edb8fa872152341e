//! Routes received commands to their handler.

use crate::cache::CacheEvictionHandler;
use crate::change::ChangeIndexHandler;
use crate::config::ApplyConfig;
use crate::entity::EntityIndexHandler;
use crate::error::{ApplyError, ApplyResult};
use crate::event::EventHandler;
use crate::host::{CacheHost, ChangeStateReader, EventHost, IndexHost, ProjectListHost};
use crate::project_list::ProjectListHandler;
use async_trait::async_trait;
use haforward_transport::{InboundHandler, InboundOutcome};
use haforward_types::{
    AccountId, CacheKeyRegistry, ChangeId, Command, CommandPayload, EntityKind, IndexEntity,
    IndexOperation, ProjectName, Timestamp,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The host collaborators commands are applied through.
#[derive(Clone)]
pub struct ApplyHosts {
    pub index: Arc<dyn IndexHost>,
    pub changes: Arc<dyn ChangeStateReader>,
    pub caches: Arc<dyn CacheHost>,
    pub events: Arc<dyn EventHost>,
    pub project_list: Arc<dyn ProjectListHost>,
}

/// Applies decoded commands with the handler for their kind.
///
/// Implements [`InboundHandler`], so every receiver (HTTP route, group
/// channel, pub/sub subscriber) hands payloads straight to it.
pub struct CommandDispatcher {
    changes: ChangeIndexHandler,
    accounts: EntityIndexHandler,
    groups: EntityIndexHandler,
    projects: EntityIndexHandler,
    caches: CacheEvictionHandler,
    events: EventHandler,
    project_list: ProjectListHandler,
}

impl CommandDispatcher {
    pub fn new(hosts: ApplyHosts, config: &ApplyConfig) -> Self {
        Self::with_cache_keys(hosts, config, CacheKeyRegistry::default())
    }

    pub fn with_cache_keys(hosts: ApplyHosts, config: &ApplyConfig, keys: CacheKeyRegistry) -> Self {
        let index_pool = config.index_pool();
        let cache_pool = config.cache_pool();
        Self {
            changes: ChangeIndexHandler::new(
                Arc::clone(&hosts.index),
                hosts.changes,
                config.index_policy(),
                index_pool.clone(),
                config.batch_pool(),
            ),
            accounts: EntityIndexHandler::new(
                EntityKind::Account,
                Arc::clone(&hosts.index),
                index_pool.clone(),
            ),
            groups: EntityIndexHandler::new(
                EntityKind::Group,
                Arc::clone(&hosts.index),
                index_pool.clone(),
            ),
            projects: EntityIndexHandler::new(EntityKind::Project, hosts.index, index_pool),
            caches: CacheEvictionHandler::new(hosts.caches, Arc::new(keys), cache_pool.clone()),
            events: EventHandler::new(hosts.events, cache_pool.clone()),
            project_list: ProjectListHandler::new(hosts.project_list, cache_pool),
        }
    }

    pub fn changes(&self) -> &ChangeIndexHandler {
        &self.changes
    }

    /// The handler for a non-change entity kind.
    pub fn entities(&self, kind: EntityKind) -> Option<&EntityIndexHandler> {
        match kind {
            EntityKind::Account => Some(&self.accounts),
            EntityKind::Group => Some(&self.groups),
            EntityKind::Project => Some(&self.projects),
            EntityKind::Change => None,
        }
    }

    /// Applies one command with the forwarded flag set.
    pub async fn apply(&self, command: &Command) -> ApplyResult<()> {
        match &command.payload {
            CommandPayload::IndexEntity(entity) => self.apply_index(entity).await,
            CommandPayload::EvictCache {
                cache_name,
                key_json,
            } => self.caches.evict(cache_name, key_json).await,
            CommandPayload::PostEvent { event } => self.events.dispatch(event.clone()).await,
            CommandPayload::ProjectListChange { project, added } => {
                self.project_list
                    .update(&ProjectName::new(project.as_str()), *added)
                    .await
            }
            CommandPayload::DeleteAllForProject { project } => {
                self.changes
                    .delete_all_for_project(&ProjectName::new(project.as_str()))
                    .await
            }
        }
    }

    async fn apply_index(&self, entity: &IndexEntity) -> ApplyResult<()> {
        let invalid = || ApplyError::InvalidId {
            kind: entity.kind,
            id: entity.entity_id.clone(),
        };
        if entity.entity_id.is_empty() {
            return Err(invalid());
        }
        match entity.kind {
            EntityKind::Change => {
                let change = ChangeId::parse(&entity.entity_id).ok_or_else(invalid)?;
                match entity.operation {
                    IndexOperation::Index => {
                        self.changes
                            .index(&change, entity.index_event.clone(), entity.batch_mode)
                            .await
                    }
                    IndexOperation::Delete => self.changes.delete(&change).await,
                }
            }
            EntityKind::Account => {
                entity
                    .entity_id
                    .parse::<AccountId>()
                    .map_err(|_| invalid())?;
                self.accounts.apply(&entity.entity_id, entity.operation).await
            }
            EntityKind::Group => self.groups.apply(&entity.entity_id, entity.operation).await,
            EntityKind::Project => self.projects.apply(&entity.entity_id, entity.operation).await,
        }
    }

    /// Re-indexes one entity through the regular apply path.
    pub async fn reindex(&self, kind: EntityKind, id: &str) -> ApplyResult<()> {
        let command = Command::new(CommandPayload::IndexEntity(IndexEntity {
            kind,
            entity_id: id.to_string(),
            operation: IndexOperation::Index,
            batch_mode: true,
            index_event: None,
        }));
        self.apply(&command).await
    }

    /// Applies `command` and reduces the result to an [`InboundOutcome`].
    pub async fn handle_command(&self, command: &Command) -> InboundOutcome {
        let type_name = command.type_name();
        let subject = command.subject();
        match self.apply(command).await {
            Ok(()) => {
                match command.created_at.elapsed_until(Timestamp::now()) {
                    Some(latency) => debug!("Applied {type_name} {subject} after {latency:?}"),
                    None => debug!("Applied {type_name} {subject}"),
                }
                InboundOutcome::Applied
            }
            Err(ApplyError::AlreadyInFlight(_)) => {
                debug!("{type_name} {subject} is already being applied");
                InboundOutcome::InFlight
            }
            Err(
                e @ (ApplyError::UnsupportedOperation { .. }
                | ApplyError::InvalidId { .. }
                | ApplyError::Codec(_)),
            ) => {
                warn!("Rejected {type_name} {subject}: {e}");
                InboundOutcome::Rejected
            }
            Err(e) => {
                error!("Failed to apply {type_name} {subject}: {e}");
                InboundOutcome::Failed
            }
        }
    }

    /// Cancels pending index retries.
    pub fn shutdown(&self) {
        self.changes.shutdown();
    }
}

#[async_trait]
impl InboundHandler for CommandDispatcher {
    async fn handle(&self, payload: &[u8]) -> InboundOutcome {
        match haforward_types::decode(payload) {
            Ok(command) => self.handle_command(&command).await,
            Err(e) => {
                warn!("Rejected forwarded command: {e}");
                InboundOutcome::Rejected
            }
        }
    }
}
