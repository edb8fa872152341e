//! Forwarder configuration.

use crate::error::{ForwardError, ForwardResult};
use crate::group::GroupConfig;
use crate::http::HttpConfig;
use crate::listener::CacheForwardingConfig;
use crate::pool::WorkerPool;
use crate::pubsub::PubSubConfig;
use crate::retry::{FailsafePolicy, RetryConfig};
use serde::{Deserialize, Serialize};

/// Which backend carries commands to peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Http,
    Group,
    Pubsub,
}

/// Sending-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub backend: BackendKind,
    pub retry: RetryConfig,
    /// Concurrent outbound deliveries.
    pub threads: usize,
    pub http: HttpConfig,
    pub group: GroupConfig,
    pub pubsub: PubSubConfig,
    pub cache: CacheForwardingConfig,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            retry: RetryConfig::default(),
            threads: 4,
            http: HttpConfig::default(),
            group: GroupConfig::default(),
            pubsub: PubSubConfig::default(),
            cache: CacheForwardingConfig::default(),
        }
    }
}

impl ForwarderConfig {
    pub fn policy(&self) -> FailsafePolicy {
        FailsafePolicy::from(&self.retry)
    }

    pub fn outbound_pool(&self) -> WorkerPool {
        WorkerPool::new("forward-outbound", self.threads)
    }

    /// Checks the settings of the selected backend.
    pub fn validate(&self) -> ForwardResult<()> {
        if self.retry.max_tries == 0 {
            return Err(ForwardError::Config("retry.max_tries must be at least 1".into()));
        }
        if self.threads == 0 {
            return Err(ForwardError::Config("threads must be at least 1".into()));
        }
        self.cache.compile()?;

        match self.backend {
            BackendKind::Http => {
                for peer in &self.http.peers {
                    reqwest::Url::parse(peer)
                        .map_err(|e| ForwardError::Config(format!("invalid peer URL {peer}: {e}")))?;
                }
                if self.http.password.is_some() && self.http.user.is_none() {
                    return Err(ForwardError::Config("http.password set without http.user".into()));
                }
            }
            BackendKind::Group => {
                for addr in self.group.listen_addrs.iter().chain(&self.group.peers) {
                    addr.parse::<libp2p::Multiaddr>()
                        .map_err(|e| ForwardError::Config(format!("invalid multiaddr {addr}: {e}")))?;
                }
            }
            BackendKind::Pubsub => {
                if self.pubsub.topic.is_empty() {
                    return Err(ForwardError::Config("pubsub.topic must not be empty".into()));
                }
                if self.pubsub.max_delivery_attempts == 0 {
                    return Err(ForwardError::Config(
                        "pubsub.max_delivery_attempts must be at least 1".into(),
                    ));
                }
                if let Some(remote) = &self.pubsub.remote {
                    reqwest::Url::parse(&remote.endpoint).map_err(|e| {
                        ForwardError::Config(format!(
                            "invalid pubsub endpoint {}: {e}",
                            remote.endpoint
                        ))
                    })?;
                    if remote.project.is_empty() {
                        return Err(ForwardError::Config(
                            "pubsub.remote.project must not be empty".into(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
