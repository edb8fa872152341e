//! Behaviour shared by every forwarded-apply handler.
//!
//! An apply claims its id in the handler's [`InFlightSet`], is spawned onto
//! its worker pool and runs there with the forwarded flag set. Host calls go
//! through [`blocking`], which re-establishes the flag on the blocking
//! thread. The id is released and the flag cleared however the apply ends.

use crate::error::{ApplyError, ApplyResult};
use crate::inflight::InFlightSet;
use haforward_transport::{WorkerPool, context};
use std::future::Future;
use tracing::debug;

/// In-flight guard plus forwarded scope for one handler.
#[derive(Debug, Clone)]
pub(crate) struct HandlerCore {
    name: &'static str,
    in_flight: InFlightSet,
}

impl HandlerCore {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: InFlightSet::new(),
        }
    }

    pub(crate) fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Runs `work` for `id` on `pool`, unless `id` is already being applied.
    ///
    /// The work is spawned, so dropping the returned future only detaches
    /// the caller. The id stays claimed until the spawned apply finishes.
    pub(crate) async fn apply<T, Fut>(&self, pool: &WorkerPool, id: &str, work: Fut) -> ApplyResult<T>
    where
        Fut: Future<Output = ApplyResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let Some(guard) = self.in_flight.try_acquire(id) else {
            debug!("{}: {id} is already being applied", self.name);
            return Err(ApplyError::AlreadyInFlight(id.to_string()));
        };
        let handle = pool.spawn(async move {
            let _guard = guard;
            context::forwarded(work).await
        });
        match handle.await {
            Ok(Some(result)) => result,
            Ok(None) => Err(ApplyError::PoolClosed(pool.name().to_string())),
            Err(e) => Err(ApplyError::Task(e.to_string())),
        }
    }
}

/// Runs a host call on a blocking thread with the forwarded flag set.
pub(crate) async fn blocking<T, F>(work: F) -> ApplyResult<T>
where
    F: FnOnce() -> ApplyResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || context::run_forwarded(work))
        .await
        .map_err(|e| ApplyError::Task(e.to_string()))?
}
