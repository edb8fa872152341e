//! Forwarded change index updates.

use crate::error::{ApplyError, ApplyResult, HostError};
use crate::handler::{HandlerCore, blocking};
use crate::host::{ChangeStateReader, IndexHost};
use crate::inflight::InFlightSet;
use crate::staleness::StalenessChecker;
use haforward_transport::{FailsafePolicy, Retryable, WorkerPool};
use haforward_types::{ChangeId, EntityKind, IndexEvent, ProjectName};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Applies change index and delete commands.
///
/// A re-index is retried under the index policy while the local change is
/// older than the sender's. A change that no longer exists locally is
/// removed from the index instead.
pub struct ChangeIndexHandler {
    core: HandlerCore,
    index: Arc<dyn IndexHost>,
    reader: Arc<dyn ChangeStateReader>,
    policy: FailsafePolicy,
    pool: WorkerPool,
    batch_pool: WorkerPool,
    cancel: CancellationToken,
}

impl ChangeIndexHandler {
    pub fn new(
        index: Arc<dyn IndexHost>,
        reader: Arc<dyn ChangeStateReader>,
        policy: FailsafePolicy,
        pool: WorkerPool,
        batch_pool: WorkerPool,
    ) -> Self {
        Self {
            core: HandlerCore::new("change index"),
            index,
            reader,
            policy,
            pool,
            batch_pool,
            cancel: CancellationToken::new(),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        self.core.in_flight()
    }

    /// Re-indexes `change` once local state is at least as new as `event`.
    pub async fn index(
        &self,
        change: &ChangeId,
        event: Option<IndexEvent>,
        batch_mode: bool,
    ) -> ApplyResult<()> {
        let id = change.to_string();
        let pool = if batch_mode {
            &self.batch_pool
        } else {
            &self.pool
        };
        let attempt = IndexAttempt {
            index: Arc::clone(&self.index),
            reader: Arc::clone(&self.reader),
            change: change.clone(),
            event,
        };
        let work = attempt.run_until_current(self.policy.clone(), self.cancel.clone());
        self.core.apply(pool, &id, work).await
    }

    /// Removes `change` from the index.
    pub async fn delete(&self, change: &ChangeId) -> ApplyResult<()> {
        let key = change.to_string();
        let id = key.clone();
        let index = Arc::clone(&self.index);
        self.core
            .apply(&self.pool, &key, async move {
                blocking(move || Ok(index.delete(EntityKind::Change, &id)?)).await
            })
            .await
    }

    /// Removes every change of `project` from the index.
    pub async fn delete_all_for_project(&self, project: &ProjectName) -> ApplyResult<()> {
        let key = format!("{project}~*");
        let index = Arc::clone(&self.index);
        let project = project.clone();
        self.core
            .apply(&self.batch_pool, &key, async move {
                blocking(move || {
                    index.delete_all_changes(&project)?;
                    info!("Removed all changes of {project} from the index");
                    Ok(())
                })
                .await
            })
            .await
    }

    /// Cancels pending index retries.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Everything one re-index needs, owned so it can outlive the caller.
struct IndexAttempt {
    index: Arc<dyn IndexHost>,
    reader: Arc<dyn ChangeStateReader>,
    change: ChangeId,
    event: Option<IndexEvent>,
}

impl IndexAttempt {
    async fn run_until_current(
        self,
        policy: FailsafePolicy,
        cancel: CancellationToken,
    ) -> ApplyResult<()> {
        let id = self.change.to_string();
        let last_error: Mutex<Option<ApplyError>> = Mutex::new(None);
        let label = format!("index change {id}");

        let attempts = policy
            .run(&label, &cancel, |_| {
                let index = Arc::clone(&self.index);
                let reader = Arc::clone(&self.reader);
                let change = self.change.clone();
                let event = self.event.clone();
                let last_error = &last_error;
                async move {
                    let outcome = blocking(move || {
                        index_if_current(index.as_ref(), reader.as_ref(), &change, event.as_ref())
                    })
                    .await;
                    outcome.map_err(|e| {
                        let stand_in = AttemptError {
                            retryable: e.is_retryable(),
                            message: e.to_string(),
                        };
                        *last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                        stand_in
                    })
                }
            })
            .await;

        if attempts.succeeded {
            return Ok(());
        }
        let last = last_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match last {
            Some(e) if !e.is_retryable() => Err(e),
            _ => Err(ApplyError::Exhausted {
                id,
                attempts: attempts.made,
            }),
        }
    }
}

/// Reported to the retry policy while the real error is kept for the caller.
struct AttemptError {
    retryable: bool,
    message: String,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// One attempt: `Ok(false)` while local state is behind the sender's.
fn index_if_current(
    index: &dyn IndexHost,
    reader: &dyn ChangeStateReader,
    change: &ChangeId,
    event: Option<&IndexEvent>,
) -> ApplyResult<bool> {
    let id = change.to_string();
    let checker = StalenessChecker::new(reader, change);
    let current = checker.is_up_to_date(event).and_then(|current| {
        if current {
            index.index(EntityKind::Change, &id)?;
        }
        Ok(current)
    });
    match current {
        Ok(true) => {
            debug!("Indexed change {id}");
            Ok(true)
        }
        Ok(false) => {
            debug!("Change {id} is behind the sender, not indexing yet");
            Ok(false)
        }
        Err(HostError::NotFound(_)) => {
            debug!("Change {id} not found locally, removing it from the index");
            index.delete(EntityKind::Change, &id)?;
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}
