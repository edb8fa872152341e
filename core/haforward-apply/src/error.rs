//! Error types for applying forwarded commands.

use haforward_transport::Retryable;
use haforward_types::{CodecError, EntityKind, IndexOperation};
use thiserror::Error;

/// Result type for apply operations.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Result type for host collaborator calls.
pub type HostResult<T> = Result<T, HostError>;

/// Errors reported by the host application's collaborators.
#[derive(Debug, Error)]
pub enum HostError {
    /// The entity does not exist locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host cannot serve the call right now (e.g. index closed).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other host failure.
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HostError::Unavailable(_))
    }
}

/// Errors that can occur while applying a forwarded command.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Another apply for the same id is running on this node.
    #[error("already in flight: {0}")]
    AlreadyInFlight(String),

    /// The entity kind does not support the operation.
    #[error("{operation} is not supported for {kind}")]
    UnsupportedOperation {
        kind: EntityKind,
        operation: IndexOperation,
    },

    /// The entity id does not parse for its kind.
    #[error("invalid {kind} id: {id}")]
    InvalidId { kind: EntityKind, id: String },

    /// The cache key could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A host collaborator failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Local state never caught up with the sender within the retry budget.
    #[error("{id} not current after {attempts} attempts")]
    Exhausted { id: String, attempts: u32 },

    /// The worker pool was shut down.
    #[error("worker pool {0} is closed")]
    PoolClosed(String),

    /// The blocking host call panicked or was cancelled.
    #[error("apply task failed: {0}")]
    Task(String),

    /// Checkpoint persistence failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl ApplyError {
    /// Whether a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApplyError::AlreadyInFlight(_) | ApplyError::Exhausted { .. } => true,
            ApplyError::Host(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl Retryable for ApplyError {
    fn is_retryable(&self) -> bool {
        ApplyError::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_io_aborts_retries() {
        let err = ApplyError::from(HostError::Io(std::io::Error::other("disk full")));
        assert!(!err.is_retryable());
        assert!(ApplyError::from(HostError::Unavailable("index closed".into())).is_retryable());
        assert!(ApplyError::AlreadyInFlight("foo~1".into()).is_retryable());
        assert!(
            !ApplyError::UnsupportedOperation {
                kind: EntityKind::Account,
                operation: IndexOperation::Delete,
            }
            .is_retryable()
        );
    }
}
