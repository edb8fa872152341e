//! Forwarded account, group and project index updates.

use crate::error::{ApplyError, ApplyResult};
use crate::handler::{HandlerCore, blocking};
use crate::host::IndexHost;
use crate::inflight::InFlightSet;
use haforward_transport::WorkerPool;
use haforward_types::{EntityKind, IndexOperation};
use std::sync::Arc;
use tracing::debug;

/// Applies index commands for one non-change entity kind.
///
/// Only projects can be deleted; account and group deletes are rejected
/// with [`ApplyError::UnsupportedOperation`] without touching the host.
pub struct EntityIndexHandler {
    kind: EntityKind,
    core: HandlerCore,
    index: Arc<dyn IndexHost>,
    pool: WorkerPool,
}

impl EntityIndexHandler {
    pub fn new(kind: EntityKind, index: Arc<dyn IndexHost>, pool: WorkerPool) -> Self {
        let name = match kind {
            EntityKind::Account => "account index",
            EntityKind::Group => "group index",
            EntityKind::Project => "project index",
            EntityKind::Change => "change index",
        };
        Self {
            kind,
            core: HandlerCore::new(name),
            index,
            pool,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn supports_delete(&self) -> bool {
        self.kind == EntityKind::Project
    }

    pub fn in_flight(&self) -> &InFlightSet {
        self.core.in_flight()
    }

    pub async fn apply(&self, id: &str, operation: IndexOperation) -> ApplyResult<()> {
        match operation {
            IndexOperation::Index => self.index(id).await,
            IndexOperation::Delete => self.delete(id).await,
        }
    }

    pub async fn index(&self, id: &str) -> ApplyResult<()> {
        let kind = self.kind;
        let index = Arc::clone(&self.index);
        let owned = id.to_string();
        self.core
            .apply(&self.pool, id, async move {
                blocking(move || {
                    index.index(kind, &owned)?;
                    debug!("Indexed {kind} {owned}");
                    Ok(())
                })
                .await
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> ApplyResult<()> {
        if !self.supports_delete() {
            return Err(ApplyError::UnsupportedOperation {
                kind: self.kind,
                operation: IndexOperation::Delete,
            });
        }
        let kind = self.kind;
        let index = Arc::clone(&self.index);
        let owned = id.to_string();
        self.core
            .apply(&self.pool, id, async move {
                blocking(move || {
                    index.delete(kind, &owned)?;
                    debug!("Deleted {kind} {owned} from the index");
                    Ok(())
                })
                .await
            })
            .await
    }
}
