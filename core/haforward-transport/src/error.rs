//! Error types for the forwarding layer.

use haforward_types::CodecError;
use thiserror::Error;

/// Result type for forwarding operations.
pub type ForwardResult<T> = Result<T, ForwardError>;

/// Errors that can occur while delivering a command to peers.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Network error (connection refused, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The peer did not answer in time.
    #[error("operation timed out")]
    Timeout,

    /// The peer answered with a non-success HTTP status.
    #[error("peer responded with HTTP {status}")]
    Status { status: u16 },

    /// TLS handshake or certificate failure.
    #[error("TLS failure: {0}")]
    Tls(String),

    /// The command could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The message broker rejected or failed an operation.
    #[error("broker error: {0}")]
    Broker(String),

    /// Unknown subscription or topic.
    #[error("not found: {0}")]
    NotFound(String),

    /// Channel to a background task closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The operation was cancelled by shutdown.
    #[error("cancelled")]
    Cancelled,
}

impl ForwardError {
    /// Returns true if another attempt may succeed.
    ///
    /// HTTP 409 means the peer is already applying the same entity and is
    /// retried like a server error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ForwardError::Network(_) | ForwardError::Timeout | ForwardError::Broker(_) => true,
            ForwardError::ChannelClosed => true,
            ForwardError::Status { status } => *status == 409 || *status >= 500,
            ForwardError::Tls(_)
            | ForwardError::Codec(_)
            | ForwardError::Config(_)
            | ForwardError::NotFound(_)
            | ForwardError::Cancelled => false,
        }
    }
}
