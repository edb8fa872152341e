//! The forwarding contract and its backend-independent implementation.
//!
//! [`Forwarder`] is what local listeners call: one method per high-level
//! operation, each resolving to `true` when every reachable peer
//! acknowledged. [`CommandForwarder`] implements it on top of any
//! [`Delivery`] backend by encoding the command once, running it on the
//! outbound worker pool and retrying each target under the
//! [`FailsafePolicy`].

use crate::error::ForwardResult;
use crate::pool::WorkerPool;
use crate::result::DeliveryResults;
use crate::retry::FailsafePolicy;
use crate::stats::ForwarderStats;
use async_trait::async_trait;
use haforward_types::{
    AccountId, CacheKey, CacheKeyRegistry, ChangeId, Command, GroupUuid, IndexEvent, ProjectName,
    Timestamp,
};
use std::sync::{Arc, LazyLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

static DEFAULT_CACHE_KEYS: LazyLock<CacheKeyRegistry> = LazyLock::new(CacheKeyRegistry::default);

/// Sends local mutations to peer instances.
///
/// Implementors provide [`forward`](Forwarder::forward); the per-operation
/// methods build the matching [`Command`]. Failures never escape as errors:
/// every method resolves to `false` and the cause is logged.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Delivers one command to all peers.
    async fn forward(&self, command: Command) -> bool;

    /// Registry used to encode eviction keys.
    fn cache_keys(&self) -> &CacheKeyRegistry {
        &DEFAULT_CACHE_KEYS
    }

    async fn index_change(&self, change: &ChangeId, event: Option<IndexEvent>) -> bool {
        self.forward(Command::index_change(change, event)).await
    }

    async fn batch_index_change(&self, change: &ChangeId, event: Option<IndexEvent>) -> bool {
        self.forward(Command::batch_index_change(change, event)).await
    }

    async fn delete_change_from_index(&self, change: &ChangeId) -> bool {
        self.forward(Command::delete_change(change)).await
    }

    async fn delete_all_changes_for_project(&self, project: &ProjectName) -> bool {
        self.forward(Command::delete_all_for_project(project.as_str()))
            .await
    }

    async fn index_account(&self, account: AccountId, event: Option<IndexEvent>) -> bool {
        self.forward(Command::index_account(account, event)).await
    }

    async fn index_group(&self, group: &GroupUuid, event: Option<IndexEvent>) -> bool {
        self.forward(Command::index_group(group, event)).await
    }

    async fn index_project(&self, project: &ProjectName, event: Option<IndexEvent>) -> bool {
        self.forward(Command::index_project(project.as_str(), event))
            .await
    }

    async fn delete_project(&self, project: &ProjectName) -> bool {
        self.forward(Command::delete_project(project.as_str())).await
    }

    /// Forwards a domain stream event.
    async fn send(&self, event: serde_json::Value) -> bool {
        self.forward(Command::post_event(event)).await
    }

    /// Forwards the eviction of one cache key.
    async fn evict(&self, cache_name: &str, key: &CacheKey) -> bool {
        match self.cache_keys().encode(cache_name, key) {
            Ok(key_json) => self.forward(Command::evict_cache(cache_name, key_json)).await,
            Err(e) => {
                error!("Cannot forward eviction from {cache_name}: {e}");
                false
            }
        }
    }

    async fn add_to_project_list(&self, project: &ProjectName) -> bool {
        self.forward(Command::add_to_project_list(project.as_str()))
            .await
    }

    async fn remove_from_project_list(&self, project: &ProjectName) -> bool {
        self.forward(Command::remove_from_project_list(project.as_str()))
            .await
    }
}

/// An encoded command ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Unique per forwarded command; repeated across retries.
    pub request_id: String,
    pub type_name: &'static str,
    /// Entity id or cache key, for logs.
    pub subject: String,
    pub created_at: Timestamp,
    /// JSON wire form of the command.
    pub body: Vec<u8>,
}

impl OutboundRequest {
    /// Encodes `command` under a fresh request id.
    pub fn encode(command: &Command) -> ForwardResult<Self> {
        Ok(Self {
            request_id: Uuid::new_v4().to_string(),
            type_name: command.type_name(),
            subject: command.subject(),
            created_at: command.created_at,
            body: haforward_types::encode(command)?,
        })
    }
}

/// A single-attempt delivery backend.
///
/// The forwarder asks for the current targets once per command and retries
/// each target independently; an empty target list means there is no peer to
/// reach and the command fails without retrying.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Recipients for the next command (peer URLs, the group, a topic).
    async fn targets(&self) -> Vec<String>;

    /// Makes one delivery attempt to `target`.
    async fn attempt(
        &self,
        target: &str,
        request: &OutboundRequest,
    ) -> ForwardResult<DeliveryResults>;
}

/// [`Forwarder`] over any [`Delivery`] backend.
pub struct CommandForwarder<D: Delivery> {
    delivery: Arc<D>,
    policy: FailsafePolicy,
    pool: WorkerPool,
    stats: Arc<ForwarderStats>,
    cache_keys: CacheKeyRegistry,
    cancel: CancellationToken,
}

impl<D: Delivery> CommandForwarder<D> {
    /// Creates a forwarder delivering through `delivery` on `pool`.
    pub fn new(delivery: D, policy: FailsafePolicy, pool: WorkerPool) -> Self {
        Self {
            delivery: Arc::new(delivery),
            policy,
            pool,
            stats: Arc::new(ForwarderStats::new()),
            cache_keys: CacheKeyRegistry::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the registry used to encode eviction keys.
    pub fn with_cache_keys(mut self, cache_keys: CacheKeyRegistry) -> Self {
        self.cache_keys = cache_keys;
        self
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    pub fn stats(&self) -> Arc<ForwarderStats> {
        Arc::clone(&self.stats)
    }

    /// Starts delivering `command` and returns immediately.
    ///
    /// The handle resolves to the same outcome [`forward`](Forwarder::forward)
    /// would return; dropping it detaches the delivery.
    pub fn submit(&self, command: Command) -> JoinHandle<bool> {
        let request = match OutboundRequest::encode(&command) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    "Cannot forward {} {}: {e}",
                    command.type_name(),
                    command.subject()
                );
                return tokio::spawn(async { false });
            }
        };

        let delivery = Arc::clone(&self.delivery);
        let policy = self.policy.clone();
        let stats = Arc::clone(&self.stats);
        let cancel = self.cancel.clone();
        let pool = self.pool.clone();

        tokio::spawn(async move {
            pool.run(deliver(&*delivery, &policy, &stats, &cancel, &request))
                .await
                .unwrap_or(false)
        })
    }

    /// Cancels pending retry delays and stops accepting new deliveries.
    pub fn shutdown(&self) {
        info!("Shutting down {} forwarder", self.delivery.backend());
        self.cancel.cancel();
        self.pool.close();
    }
}

#[async_trait]
impl<D: Delivery> Forwarder for CommandForwarder<D> {
    async fn forward(&self, command: Command) -> bool {
        self.submit(command).await.unwrap_or(false)
    }

    fn cache_keys(&self) -> &CacheKeyRegistry {
        &self.cache_keys
    }
}

async fn deliver<D: Delivery>(
    delivery: &D,
    policy: &FailsafePolicy,
    stats: &ForwarderStats,
    cancel: &CancellationToken,
    request: &OutboundRequest,
) -> bool {
    stats.record_sent();

    let targets = delivery.targets().await;
    if targets.is_empty() {
        debug!(
            "No peers to receive {} {} via {}",
            request.type_name,
            request.subject,
            delivery.backend()
        );
        stats.record_outcome(false, None);
        return false;
    }

    let per_target = targets.iter().map(|target| async move {
        let label = format!(
            "forward {} {} to {target}",
            request.type_name, request.subject
        );
        policy
            .run(&label, cancel, |attempt| {
                if attempt > 1 {
                    stats.record_retry();
                }
                async move {
                    delivery
                        .attempt(target, request)
                        .await
                        .map(|results| results.all_succeeded())
                }
            })
            .await
    });
    let attempts = futures::future::join_all(per_target).await;

    let succeeded = attempts.iter().all(|a| a.succeeded);
    let latency = request.created_at.elapsed_until(Timestamp::now());
    stats.record_outcome(succeeded, latency.filter(|_| succeeded));

    if succeeded {
        debug!(
            "Forwarded {} {} [{}] via {}",
            request.type_name,
            request.subject,
            request.request_id,
            delivery.backend()
        );
    } else {
        error!(
            "Failed to forward {} {} [{}] via {}",
            request.type_name,
            request.subject,
            request.request_id,
            delivery.backend()
        );
    }
    succeeded
}
