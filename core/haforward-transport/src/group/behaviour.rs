//! Network behaviour combining mDNS discovery and the forwarding protocol.

use crate::error::{ForwardError, ForwardResult};
use crate::group::codec::ForwardCodec;
use libp2p::{
    mdns,
    request_response::{self, ProtocolSupport},
    swarm::{NetworkBehaviour, behaviour::toggle::Toggle},
};
use std::iter;
use std::time::Duration;
use tracing::debug;

/// The forwarding protocol identifier.
pub const FORWARD_PROTOCOL: &str = "/haforward/forward/1.0.0";

#[derive(NetworkBehaviour)]
pub struct ForwardBehaviour {
    /// mDNS for finding members on the local network.
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    /// Request-response carrying forwarded commands.
    pub forward: request_response::Behaviour<ForwardCodec>,
}

impl ForwardBehaviour {
    pub fn new(
        local_peer_id: libp2p::PeerId,
        enable_mdns: bool,
        request_timeout: Duration,
    ) -> ForwardResult<Self> {
        let mdns = if enable_mdns {
            let behaviour = mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)
                .map_err(|e| ForwardError::Network(format!("mDNS unavailable: {e}")))?;
            Toggle::from(Some(behaviour))
        } else {
            debug!("mDNS disabled");
            Toggle::from(None)
        };

        let forward = request_response::Behaviour::new(
            iter::once((FORWARD_PROTOCOL, ProtocolSupport::Full)),
            request_response::Config::default().with_request_timeout(request_timeout),
        );

        Ok(Self { mdns, forward })
    }
}
