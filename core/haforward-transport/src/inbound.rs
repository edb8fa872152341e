//! Receiving-side seam shared by all transports.

use async_trait::async_trait;
use std::fmt;

/// What happened to one received command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The command was applied (or was a no-op by design).
    Applied,
    /// Applying failed; the sender may retry.
    Failed,
    /// The same entity is already being applied on this node.
    InFlight,
    /// The command could not be decoded or is not supported.
    Rejected,
}

impl InboundOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InboundOutcome::Applied)
    }

    /// Whether a transport with redelivery should hand the message out again.
    pub fn should_redeliver(&self) -> bool {
        matches!(self, InboundOutcome::Failed | InboundOutcome::InFlight)
    }
}

impl fmt::Display for InboundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InboundOutcome::Applied => "applied",
            InboundOutcome::Failed => "failed",
            InboundOutcome::InFlight => "in-flight",
            InboundOutcome::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Decodes and applies raw command bytes received from a peer.
///
/// Implementations must not panic on bad input and must not block the
/// calling task on host I/O.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> InboundOutcome;
}
