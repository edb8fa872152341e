//! libp2p implementation of [`GroupChannel`].

use crate::error::{ForwardError, ForwardResult};
use crate::group::behaviour::{ForwardBehaviour, ForwardBehaviourEvent};
use crate::group::codec::{ForwardRequest, ForwardResponse};
use crate::group::{GroupChannel, MemberReply};
use crate::inbound::InboundHandler;
use crate::result::ForwardStatus;
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    Multiaddr, PeerId, Swarm,
    identity::Keypair,
    mdns,
    request_response::{self, OutboundRequestId, ResponseChannel},
    swarm::SwarmEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the libp2p group channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Multiaddrs to listen on.
    pub listen_addrs: Vec<String>,
    /// Members to dial at startup (`/ip4/.../udp/.../quic-v1/p2p/<id>`).
    pub peers: Vec<String>,
    /// Discover members on the local network.
    pub enable_mdns: bool,
    /// How long a member has to answer (milliseconds).
    pub request_timeout_ms: u64,
    /// Connection idle timeout (seconds).
    pub idle_timeout_secs: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec!["/ip4/0.0.0.0/udp/0/quic-v1".to_string()],
            peers: Vec::new(),
            enable_mdns: true,
            request_timeout_ms: 5000,
            idle_timeout_secs: 60,
        }
    }
}

/// Command sent to the swarm event loop.
enum SwarmCommand {
    SendRequest {
        peer_id: PeerId,
        payload: Vec<u8>,
        response_tx: oneshot::Sender<ForwardResult<bool>>,
    },
    SendResponse {
        channel: ResponseChannel<ForwardResponse>,
        applied: bool,
    },
}

/// Group membership and broadcast over libp2p (QUIC).
///
/// Members are the peers this node currently holds a connection to.
pub struct P2pGroupChannel {
    local_peer_id: PeerId,
    keypair: Keypair,
    config: GroupConfig,
    members: Arc<RwLock<HashSet<PeerId>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    command_tx: Option<mpsc::Sender<SwarmCommand>>,
    cancel: CancellationToken,
}

impl P2pGroupChannel {
    /// Creates a channel with a random identity.
    pub fn new(config: GroupConfig) -> Self {
        Self::with_keypair(Keypair::generate_ed25519(), config)
    }

    /// Creates a channel with a specific identity.
    pub fn with_keypair(keypair: Keypair, config: GroupConfig) -> Self {
        Self {
            local_peer_id: PeerId::from(keypair.public()),
            keypair,
            config,
            members: Arc::new(RwLock::new(HashSet::new())),
            listen_addrs: Arc::new(RwLock::new(Vec::new())),
            command_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn is_running(&self) -> bool {
        self.command_tx.is_some()
    }

    /// Addresses the swarm is listening on, once bound.
    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().await.clone()
    }

    fn parse_addrs(addrs: &[String]) -> ForwardResult<Vec<Multiaddr>> {
        addrs
            .iter()
            .map(|a| {
                a.parse()
                    .map_err(|e| ForwardError::Config(format!("invalid multiaddr {a}: {e}")))
            })
            .collect()
    }

    fn create_swarm(&self) -> ForwardResult<Swarm<ForwardBehaviour>> {
        let behaviour = ForwardBehaviour::new(
            self.local_peer_id,
            self.config.enable_mdns,
            Duration::from_millis(self.config.request_timeout_ms),
        )?;
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);

        let swarm = libp2p::SwarmBuilder::with_existing_identity(self.keypair.clone())
            .with_tokio()
            .with_quic()
            .with_behaviour(|_| behaviour)
            .map_err(|e| ForwardError::Network(format!("failed to create behaviour: {e}")))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        Ok(swarm)
    }

    /// Starts listening and answering forwarded commands with `handler`.
    pub async fn start(&mut self, handler: Arc<dyn InboundHandler>) -> ForwardResult<()> {
        if self.is_running() {
            return Ok(());
        }

        let mut swarm = self.create_swarm()?;
        for addr in Self::parse_addrs(&self.config.listen_addrs)? {
            swarm
                .listen_on(addr.clone())
                .map_err(|e| ForwardError::Network(format!("failed to listen on {addr}: {e}")))?;
        }
        for addr in Self::parse_addrs(&self.config.peers)? {
            if let Err(e) = swarm.dial(addr.clone()) {
                warn!("Failed to dial group member {addr}: {e}");
            }
        }

        let (command_tx, command_rx) = mpsc::channel(64);
        self.command_tx = Some(command_tx.clone());
        self.cancel = CancellationToken::new();

        let event_loop = EventLoop {
            swarm,
            command_rx,
            command_tx,
            members: Arc::clone(&self.members),
            listen_addrs: Arc::clone(&self.listen_addrs),
            handler,
            cancel: self.cancel.clone(),
            local_peer_id: self.local_peer_id,
        };
        tokio::spawn(event_loop.run());

        info!("Group channel started, peer ID: {}", self.local_peer_id);
        Ok(())
    }

    /// Stops the event loop. Pending broadcasts fail.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.command_tx = None;
        info!("Group channel stopped");
    }
}

impl Drop for P2pGroupChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl GroupChannel for P2pGroupChannel {
    fn local_member(&self) -> String {
        self.local_peer_id.to_string()
    }

    async fn members(&self) -> Vec<String> {
        let members = self.members.read().await;
        std::iter::once(self.local_peer_id)
            .chain(members.iter().copied())
            .map(|p| p.to_string())
            .collect()
    }

    async fn broadcast(&self, payload: &[u8]) -> ForwardResult<Vec<MemberReply>> {
        let command_tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| ForwardError::Config("group channel not started".to_string()))?;

        let peers: Vec<PeerId> = self.members.read().await.iter().copied().collect();
        let mut pending = Vec::with_capacity(peers.len());
        for peer_id in peers {
            let (response_tx, response_rx) = oneshot::channel();
            command_tx
                .send(SwarmCommand::SendRequest {
                    peer_id,
                    payload: payload.to_vec(),
                    response_tx,
                })
                .await
                .map_err(|_| ForwardError::ChannelClosed)?;
            pending.push((peer_id, response_rx));
        }

        let replies = futures::future::join_all(pending.into_iter().map(
            |(peer_id, response_rx)| async move {
                let status = match response_rx.await {
                    Ok(Ok(true)) => ForwardStatus::Success,
                    Ok(Ok(false)) => ForwardStatus::Failure,
                    Ok(Err(e)) => {
                        debug!("No answer from {peer_id}: {e}");
                        ForwardStatus::Failure
                    }
                    Err(_) => ForwardStatus::Failure,
                };
                MemberReply::new(peer_id.to_string(), status)
            },
        ))
        .await;
        Ok(replies)
    }
}

struct EventLoop {
    swarm: Swarm<ForwardBehaviour>,
    command_rx: mpsc::Receiver<SwarmCommand>,
    command_tx: mpsc::Sender<SwarmCommand>,
    members: Arc<RwLock<HashSet<PeerId>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    handler: Arc<dyn InboundHandler>,
    cancel: CancellationToken,
    local_peer_id: PeerId,
}

impl EventLoop {
    async fn run(mut self) {
        let mut pending_requests: HashMap<OutboundRequestId, oneshot::Sender<ForwardResult<bool>>> =
            HashMap::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                event = self.swarm.select_next_some() => {
                    self.on_swarm_event(event, &mut pending_requests).await;
                }

                Some(command) = self.command_rx.recv() => {
                    match command {
                        SwarmCommand::SendRequest { peer_id, payload, response_tx } => {
                            let request_id = self
                                .swarm
                                .behaviour_mut()
                                .forward
                                .send_request(&peer_id, ForwardRequest(payload));
                            pending_requests.insert(request_id, response_tx);
                        }
                        SwarmCommand::SendResponse { channel, applied } => {
                            if self
                                .swarm
                                .behaviour_mut()
                                .forward
                                .send_response(channel, ForwardResponse { applied })
                                .is_err()
                            {
                                warn!("Failed to send response (channel closed)");
                            }
                        }
                    }
                }
            }
        }
        debug!("Group channel event loop exited");
    }

    async fn on_swarm_event(
        &mut self,
        event: SwarmEvent<ForwardBehaviourEvent>,
        pending_requests: &mut HashMap<OutboundRequestId, oneshot::Sender<ForwardResult<bool>>>,
    ) {
        match event {
            SwarmEvent::Behaviour(ForwardBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                for (peer_id, addr) in peers {
                    if peer_id == self.local_peer_id {
                        continue;
                    }
                    info!("mDNS discovered member: {peer_id} at {addr}");
                    self.swarm.add_peer_address(peer_id, addr.clone());
                    if !self.swarm.is_connected(&peer_id) {
                        if let Err(e) = self.swarm.dial(addr) {
                            debug!("Dial {peer_id} failed: {e}");
                        }
                    }
                }
            }
            SwarmEvent::Behaviour(ForwardBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer_id, _addr) in peers {
                    debug!("mDNS member expired: {peer_id}");
                }
            }
            SwarmEvent::Behaviour(ForwardBehaviourEvent::Forward(event)) => match event {
                request_response::Event::Message { peer, message, .. } => match message {
                    request_response::Message::Request {
                        request, channel, ..
                    } => {
                        let handler = Arc::clone(&self.handler);
                        let command_tx = self.command_tx.clone();
                        tokio::spawn(async move {
                            let outcome = handler.handle(&request.0).await;
                            debug!("Command from {peer}: {outcome}");
                            let reply = SwarmCommand::SendResponse {
                                channel,
                                applied: outcome.is_success(),
                            };
                            if command_tx.send(reply).await.is_err() {
                                warn!("Event loop gone before replying to {peer}");
                            }
                        });
                    }
                    request_response::Message::Response {
                        request_id,
                        response,
                    } => {
                        if let Some(response_tx) = pending_requests.remove(&request_id) {
                            let _ = response_tx.send(Ok(response.applied));
                        }
                    }
                },
                request_response::Event::OutboundFailure {
                    request_id, error, ..
                } => {
                    if let Some(response_tx) = pending_requests.remove(&request_id) {
                        let _ = response_tx.send(Err(ForwardError::Network(format!(
                            "outbound request failed: {error}"
                        ))));
                    }
                }
                request_response::Event::InboundFailure { peer, error, .. } => {
                    warn!("Inbound request from {peer} failed: {error}");
                }
                request_response::Event::ResponseSent { .. } => {}
            },
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                if self.members.write().await.insert(peer_id) {
                    info!("Member joined: {peer_id}");
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                if num_established == 0 && self.members.write().await.remove(&peer_id) {
                    info!("Member left: {peer_id} ({cause:?})");
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {address}");
                self.listen_addrs.write().await.push(address);
            }
            _ => {}
        }
    }
}
