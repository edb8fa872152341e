//! Receiving-side configuration.

use haforward_transport::{FailsafePolicy, RetryConfig, WorkerPool};
use haforward_types::EntityKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Apply handler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// How long a change re-index waits for local state to catch up.
    pub index: RetryConfig,
    /// Concurrent single-entity index applies.
    pub threads: usize,
    /// Concurrent batch index applies.
    pub batch_threads: usize,
    /// Concurrent cache evictions, events and project list updates.
    pub cache_threads: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            index: RetryConfig::default()
                .with_max_tries(2)
                .with_retry_interval(Duration::from_secs(30)),
            threads: 4,
            batch_threads: 1,
            cache_threads: 4,
        }
    }
}

impl ApplyConfig {
    pub fn index_policy(&self) -> FailsafePolicy {
        FailsafePolicy::from(&self.index)
    }

    pub fn index_pool(&self) -> WorkerPool {
        WorkerPool::new("forwarded-index", self.threads)
    }

    pub fn batch_pool(&self) -> WorkerPool {
        WorkerPool::new("forwarded-batch-index", self.batch_threads)
    }

    pub fn cache_pool(&self) -> WorkerPool {
        WorkerPool::new("forwarded-cache", self.cache_threads)
    }
}

/// Catch-up scheduler settings. Disabled unless `enabled` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReindexConfig {
    pub enabled: bool,
    pub initial_delay_secs: u64,
    pub period_secs: u64,
    /// Concurrent re-index applies during one scan.
    pub threads: usize,
    /// Directory holding one checkpoint file per entity kind.
    pub data_dir: PathBuf,
    pub kinds: Vec<EntityKind>,
}

impl Default for AutoReindexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_secs: 10,
            period_secs: 60,
            threads: 1,
            data_dir: PathBuf::from("data/high-availability"),
            kinds: EntityKind::ALL.to_vec(),
        }
    }
}

impl AutoReindexConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs.max(1))
    }
}
