//! Forwarded cache evictions.

use crate::error::ApplyResult;
use crate::handler::{HandlerCore, blocking};
use crate::host::CacheHost;
use crate::inflight::InFlightSet;
use haforward_transport::WorkerPool;
use haforward_types::{CacheEntry, CacheKeyRegistry};
use std::sync::Arc;
use tracing::debug;

/// Decodes eviction keys per cache and evicts them locally.
pub struct CacheEvictionHandler {
    core: HandlerCore,
    cache: Arc<dyn CacheHost>,
    keys: Arc<CacheKeyRegistry>,
    pool: WorkerPool,
}

impl CacheEvictionHandler {
    pub fn new(cache: Arc<dyn CacheHost>, keys: Arc<CacheKeyRegistry>, pool: WorkerPool) -> Self {
        Self {
            core: HandlerCore::new("cache eviction"),
            cache,
            keys,
            pool,
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        self.core.in_flight()
    }

    /// Evicts the key `key_json` from `cache_name`.
    ///
    /// A key that does not match the shape registered for the cache is
    /// rejected before anything is evicted.
    pub async fn evict(&self, cache_name: &str, key_json: &str) -> ApplyResult<()> {
        let entry = CacheEntry::new(cache_name, self.keys.decode(cache_name, key_json)?);
        let id = format!("{cache_name}[{key_json}]");
        let cache = Arc::clone(&self.cache);
        self.core
            .apply(&self.pool, &id, async move {
                blocking(move || {
                    cache.evict(&entry)?;
                    debug!("Evicted {:?} from {}", entry.key, entry.full_name());
                    Ok(())
                })
                .await
            })
            .await
    }
}
