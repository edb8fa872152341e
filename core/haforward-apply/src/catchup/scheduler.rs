//! Periodic re-index of entities modified since the last checkpoint.

use super::checkpoint::CheckpointStore;
use crate::config::AutoReindexConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{ApplyError, ApplyResult};
use crate::host::{EntityScanner, ModifiedEntity};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use haforward_transport::WorkerPool;
use haforward_types::EntityKind;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub reindexed: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for ScanReport {
    fn add_assign(&mut self, other: Self) {
        self.reindexed += other.reindexed;
        self.failed += other.failed;
    }
}

/// Re-drives the apply path for entities a peer's message never reached.
///
/// For each configured kind the scheduler asks the host for entities
/// modified after the stored checkpoint, re-indexes them and advances the
/// checkpoint. The checkpoint never passes an entity whose re-index failed,
/// so the next scan picks it up again.
pub struct AutoReindexScheduler {
    dispatcher: Arc<CommandDispatcher>,
    scanner: Arc<dyn EntityScanner>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: AutoReindexConfig,
    pool: WorkerPool,
}

impl AutoReindexScheduler {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        scanner: Arc<dyn EntityScanner>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: AutoReindexConfig,
    ) -> Self {
        let pool = WorkerPool::new("auto-reindex", config.threads);
        Self {
            dispatcher,
            scanner,
            checkpoints,
            config,
            pool,
        }
    }

    /// Spawns the periodic scan. Returns `None` when disabled.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Auto reindex is disabled");
            return None;
        }
        info!(
            "Auto reindex starts in {:?}, then every {:?}",
            self.config.initial_delay(),
            self.config.period()
        );
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.initial_delay()) => {}
            }
            let mut ticker = tokio::time::interval(self.config.period());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(report) if report.failed > 0 => {
                                warn!("Auto reindex: {} reindexed, {} failed", report.reindexed, report.failed)
                            }
                            Ok(report) => debug!("Auto reindex: {} reindexed", report.reindexed),
                            Err(e) => error!("Auto reindex failed: {e}"),
                        }
                    }
                }
            }
            debug!("Auto reindex stopped");
        }))
    }

    /// Scans every configured kind once.
    pub async fn run_once(&self) -> ApplyResult<ScanReport> {
        let mut total = ScanReport::default();
        for &kind in &self.config.kinds {
            total += self.scan(kind).await?;
        }
        Ok(total)
    }

    async fn scan(&self, kind: EntityKind) -> ApplyResult<ScanReport> {
        let Some(since) = self.checkpoints.load(kind).await? else {
            let now = Utc::now();
            self.checkpoints.advance(kind, now).await?;
            info!("No {kind} checkpoint yet, starting from {now}");
            return Ok(ScanReport::default());
        };

        let scanner = Arc::clone(&self.scanner);
        let mut modified = tokio::task::spawn_blocking(move || scanner.modified_since(kind, since))
            .await
            .map_err(|e| ApplyError::Task(e.to_string()))??;
        if modified.is_empty() {
            return Ok(ScanReport::default());
        }
        modified.sort_by_key(|entity| entity.modified);
        info!("Reindexing {} {kind}(s) modified since {since}", modified.len());

        let results = join_all(modified.iter().map(|entity| {
            self.pool
                .run(self.dispatcher.reindex(kind, &entity.id))
        }))
        .await;

        let mut report = ScanReport::default();
        let mut failures = Vec::new();
        for (entity, result) in modified.iter().zip(results) {
            match result {
                // Someone else is applying it right now.
                Some(Ok(())) | Some(Err(ApplyError::AlreadyInFlight(_))) => report.reindexed += 1,
                Some(Err(e)) => {
                    warn!("Auto reindex of {kind} {} failed: {e}", entity.id);
                    failures.push(entity.modified);
                }
                None => failures.push(entity.modified),
            }
        }
        report.failed = failures.len();

        let first_failure = failures.into_iter().min();
        if let Some(next) = next_checkpoint(since, &modified, first_failure) {
            self.checkpoints.advance(kind, next).await?;
        }
        Ok(report)
    }
}

/// The latest entity timestamp strictly before the first failure.
fn next_checkpoint(
    since: DateTime<Utc>,
    modified: &[ModifiedEntity],
    first_failure: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    modified
        .iter()
        .map(|entity| entity.modified)
        .filter(|ts| first_failure.is_none_or(|failed| *ts < failed))
        .max()
        .filter(|ts| *ts > since)
}
