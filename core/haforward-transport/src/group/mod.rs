//! Group broadcast delivery.
//!
//! A [`GroupChannel`] knows the current membership view and can send one
//! message to every other member, collecting their replies. The libp2p
//! implementation discovers members with mDNS and static peer addresses and
//! exchanges commands over a request-response protocol.

mod behaviour;
pub mod codec;
mod p2p;

pub use codec::{ForwardCodec, ForwardRequest, ForwardResponse};
pub use p2p::{GroupConfig, P2pGroupChannel};

use crate::error::ForwardResult;
use crate::forwarder::{Delivery, OutboundRequest};
use crate::result::{DeliveryResult, DeliveryResults, ForwardStatus};
use async_trait::async_trait;
use tracing::debug;

/// The reply of one member to a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReply {
    pub member: String,
    pub status: ForwardStatus,
}

impl MemberReply {
    pub fn new(member: impl Into<String>, status: ForwardStatus) -> Self {
        Self {
            member: member.into(),
            status,
        }
    }
}

/// Membership view plus broadcast request/reply.
#[async_trait]
pub trait GroupChannel: Send + Sync + 'static {
    /// This node's member name.
    fn local_member(&self) -> String;

    /// Current members, including this node.
    async fn members(&self) -> Vec<String>;

    /// Sends `payload` to every other member and collects their replies.
    /// Members that do not answer in time are reported as failures.
    async fn broadcast(&self, payload: &[u8]) -> ForwardResult<Vec<MemberReply>>;
}

/// Name of the single broadcast target.
const GROUP_TARGET: &str = "group";

/// [`Delivery`] that broadcasts over a [`GroupChannel`].
pub struct GroupDelivery<C: GroupChannel> {
    channel: C,
}

impl<C: GroupChannel> GroupDelivery<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}

#[async_trait]
impl<C: GroupChannel> Delivery for GroupDelivery<C> {
    fn backend(&self) -> &'static str {
        "group"
    }

    /// No target while this node is alone in the group.
    async fn targets(&self) -> Vec<String> {
        let members = self.channel.members().await;
        if members.len() < 2 {
            debug!("Group has {} member(s); nothing to broadcast to", members.len());
            return Vec::new();
        }
        vec![GROUP_TARGET.to_string()]
    }

    async fn attempt(
        &self,
        _target: &str,
        request: &OutboundRequest,
    ) -> ForwardResult<DeliveryResults> {
        let replies = self.channel.broadcast(&request.body).await?;
        Ok(replies
            .into_iter()
            .map(|reply| DeliveryResult::new(&request.request_id, reply.member, reply.status))
            .collect())
    }
}
