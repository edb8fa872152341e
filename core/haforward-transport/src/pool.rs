//! Bounded worker pools.
//!
//! Each event class (single indexing, batch indexing, outbound delivery,
//! catch-up) owns a pool so that a flood in one class cannot starve the
//! others. A pool caps the number of concurrently running jobs; blocking
//! host calls inside a job still go through `spawn_blocking`.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// A named concurrency limit for spawned jobs.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` jobs at once (at least one).
    pub fn new(name: &str, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name: Arc::from(name),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `job` once a slot is free. Returns `None` after [`close`](Self::close).
    pub async fn run<F: Future>(&self, job: F) -> Option<F::Output> {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("worker pool {} is closed, dropping job", self.name);
                return None;
            }
        };
        Some(job.await)
    }

    /// Spawns `job` on the runtime, gated by this pool.
    pub fn spawn<F>(&self, job: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let pool = self.clone();
        tokio::spawn(async move { pool.run(job).await })
    }

    /// Stops admitting new jobs. Jobs already running complete.
    pub fn close(&self) {
        self.permits.close();
    }
}
