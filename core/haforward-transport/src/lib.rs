//! Sending side of cross-node forwarding.
//!
//! This crate provides:
//! - The [`Forwarder`] contract called by local listeners
//! - [`CommandForwarder`], which runs any [`Delivery`] backend under the
//!   bounded [`FailsafePolicy`] on a dedicated worker pool
//! - Three backends: point-to-point HTTP, group broadcast over libp2p and
//!   publish/subscribe
//! - The loop-prevention [`context`]
//! - The [`InboundHandler`] seam that every receiver hands payloads to

mod config;
pub mod context;
mod error;
mod forwarder;
pub mod group;
pub mod http;
mod inbound;
mod listener;
mod pool;
pub mod pubsub;
mod result;
mod retry;
mod stats;

pub use config::{BackendKind, ForwarderConfig};
pub use error::{ForwardError, ForwardResult};
pub use forwarder::{CommandForwarder, Delivery, Forwarder, OutboundRequest};
pub use group::{GroupChannel, GroupConfig, GroupDelivery, MemberReply, P2pGroupChannel};
pub use http::{HttpConfig, HttpDelivery};
pub use inbound::{InboundHandler, InboundOutcome};
pub use listener::{CacheForwardingConfig, ForwardingListener};
pub use pool::WorkerPool;
pub use pubsub::{
    Broker, HttpBroker, HttpBrokerConfig, MemoryBroker, PubSubConfig, PubSubDelivery,
    PubSubSubscriber,
};
pub use result::{DeliveryResult, DeliveryResults, ForwardStatus};
pub use retry::{Attempts, FailsafePolicy, RetryConfig, Retryable};
pub use stats::{ForwarderStats, StatsSnapshot};
