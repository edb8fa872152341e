//! Publish/subscribe delivery.
//!
//! Every node publishes to one shared topic and consumes through its own
//! subscription. Messages carry the sender's instance id as an attribute;
//! each subscription is created with a broker-side filter that drops
//! messages carrying the subscriber's own id, so a node never receives what
//! it published.

mod delivery;
mod memory;
mod remote;
mod subscriber;

pub use delivery::PubSubDelivery;
pub use memory::MemoryBroker;
pub use remote::{HttpBroker, HttpBrokerConfig};
pub use subscriber::PubSubSubscriber;

use crate::error::ForwardResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Attribute holding the publishing node's instance id.
pub const INSTANCE_ID_ATTRIBUTE: &str = "instanceId";

/// Attribute holding the command discriminator.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Pub/sub backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Topic shared by the cluster.
    pub topic: String,
    /// Prefix of this node's subscription; the instance id is appended.
    pub subscription_prefix: String,
    /// Deliveries before a message is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Messages pulled per poll.
    pub max_messages: usize,
    /// Delay between empty polls (milliseconds).
    pub poll_interval_ms: u64,
    /// How long a nacked message waits before it is delivered again
    /// (milliseconds).
    pub redelivery_delay_ms: u64,
    /// Remote broker shared by every node. Without it the broker lives in
    /// memory and only reaches nodes hosted by the same process.
    pub remote: Option<HttpBrokerConfig>,
}

impl PubSubConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            topic: "haforward-commands".to_string(),
            subscription_prefix: "haforward".to_string(),
            max_delivery_attempts: 5,
            max_messages: 32,
            poll_interval_ms: 500,
            redelivery_delay_ms: 10_000,
            remote: None,
        }
    }
}

/// A published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl PubSubMessage {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A message handed to a subscriber, pending ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message_id: String,
    pub message: PubSubMessage,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_attempt: u32,
}

/// Broker-side filter: drop messages whose attribute equals a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    excluded: Vec<(String, String)>,
}

impl SubscriptionFilter {
    /// Accepts everything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Excludes messages published by `instance_id`.
    pub fn exclude_origin(instance_id: impl Into<String>) -> Self {
        Self::none().exclude(INSTANCE_ID_ATTRIBUTE, instance_id)
    }

    /// Adds an `attribute != value` clause.
    pub fn exclude(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.excluded.push((attribute.into(), value.into()));
        self
    }

    /// The filter in the broker's attribute expression syntax, e.g.
    /// `attributes.instanceId != "abc"`. Empty when nothing is excluded.
    pub fn expression(&self) -> String {
        self.excluded
            .iter()
            .map(|(attr, value)| format!("attributes.{attr} != {value:?}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn matches(&self, message: &PubSubMessage) -> bool {
        self.excluded
            .iter()
            .all(|(attr, value)| message.attribute(attr) != Some(value.as_str()))
    }
}

/// Subscription settings applied at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub topic: String,
    pub filter: SubscriptionFilter,
    pub max_delivery_attempts: u32,
    /// Minimum wait before a nacked message is redelivered.
    pub redelivery_delay: Duration,
}

/// Minimal broker interface used by the pub/sub backend.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Returns the broker's name for logs.
    fn provider_name(&self) -> &'static str;

    /// Publishes a message; returns the broker-assigned message id.
    async fn publish(&self, topic: &str, message: PubSubMessage) -> ForwardResult<String>;

    /// Creates the subscription if it does not already exist.
    async fn ensure_subscription(&self, name: &str, spec: SubscriptionSpec) -> ForwardResult<()>;

    /// Pulls up to `max` messages without waiting.
    async fn pull(&self, subscription: &str, max: usize) -> ForwardResult<Vec<ReceivedMessage>>;

    /// Acknowledges a message; it will not be delivered again.
    async fn ack(&self, subscription: &str, ack_id: &str) -> ForwardResult<()>;

    /// Negatively acknowledges a message. It is redelivered once the
    /// subscription's redelivery delay has passed.
    async fn nack(&self, subscription: &str, ack_id: &str) -> ForwardResult<()>;
}
