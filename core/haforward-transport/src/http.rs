//! Point-to-point delivery over HTTP.
//!
//! Each command is POSTed to every configured peer. Peers are retried
//! independently so a slow peer does not delay acknowledgement from the
//! others.

use crate::error::{ForwardError, ForwardResult};
use crate::forwarder::{Delivery, OutboundRequest};
use crate::result::{DeliveryResult, DeliveryResults, ForwardStatus};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Path peers accept forwarded commands on.
pub const FORWARD_PATH: &str = "/plugins/high-availability/forward";

/// Liveness path.
pub const HEALTH_PATH: &str = "/plugins/high-availability/health";

/// Header carrying the request id, identical across retries.
pub const REQUEST_ID_HEADER: &str = "x-ha-request-id";

/// Point-to-point backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URLs of the peers (e.g. `https://node-b:8080`).
    pub peers: Vec<String>,
    /// Basic-auth user shared by the cluster.
    pub user: Option<String>,
    pub password: Option<String>,
    /// TCP connect timeout (milliseconds).
    pub connection_timeout_ms: u64,
    /// Whole-request timeout (milliseconds).
    pub socket_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            user: None,
            password: None,
            connection_timeout_ms: 5000,
            socket_timeout_ms: 5000,
        }
    }
}

/// HTTP [`Delivery`] backend.
pub struct HttpDelivery {
    client: Client,
    config: HttpConfig,
}

impl HttpDelivery {
    /// Creates the backend and its connection pool.
    pub fn new(config: HttpConfig) -> ForwardResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connection_timeout_ms))
            .timeout(Duration::from_millis(config.socket_timeout_ms))
            .build()
            .map_err(|e| ForwardError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn peers(&self) -> &[String] {
        &self.config.peers
    }

    fn forward_url(peer: &str) -> String {
        format!("{}{}", peer.trim_end_matches('/'), FORWARD_PATH)
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    fn backend(&self) -> &'static str {
        "http"
    }

    async fn targets(&self) -> Vec<String> {
        self.config.peers.clone()
    }

    async fn attempt(
        &self,
        target: &str,
        request: &OutboundRequest,
    ) -> ForwardResult<DeliveryResults> {
        let mut builder = self
            .client
            .post(Self::forward_url(target))
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, &request.request_id)
            .body(request.body.clone());
        if let Some(user) = &self.config.user {
            builder = builder.basic_auth(user, self.config.password.as_deref());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            debug!("{target} answered {status} for {}", request.request_id);
            return Err(ForwardError::Status {
                status: status.as_u16(),
            });
        }

        Ok(DeliveryResults::single(DeliveryResult::new(
            &request.request_id,
            target,
            ForwardStatus::Success,
        )))
    }
}

/// Maps a transport error onto the recoverable/unrecoverable taxonomy.
pub(crate) fn classify(err: reqwest::Error) -> ForwardError {
    if err.is_timeout() {
        return ForwardError::Timeout;
    }
    if is_tls_failure(&err) {
        return ForwardError::Tls(err.to_string());
    }
    ForwardError::Network(err.to_string())
}

/// rustls reports handshake and certificate problems as `InvalidData` I/O
/// errors somewhere below the connect error.
fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::InvalidData {
                return true;
            }
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}
