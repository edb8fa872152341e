//! In-process broker.

use crate::error::{ForwardError, ForwardResult};
use crate::pubsub::{Broker, PubSubMessage, ReceivedMessage, SubscriptionSpec};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Queued {
    message_id: String,
    message: PubSubMessage,
    attempts: u32,
    /// Set on nack; the message is held back until then.
    not_before: Option<Instant>,
}

#[derive(Debug)]
struct Subscription {
    spec: SubscriptionSpec,
    ready: VecDeque<Queued>,
    outstanding: HashMap<String, Queued>,
    dead_letters: Vec<PubSubMessage>,
}

#[derive(Debug, Default)]
struct State {
    subscriptions: HashMap<String, Subscription>,
}

/// A [`Broker`] held in memory, shared by every node of a single process.
///
/// Filters are applied at publish time, like a server-side subscription
/// filter: excluded messages never reach the subscription. A nacked message
/// is not handed out again before the subscription's redelivery delay.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ForwardResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ForwardError::Broker("broker state poisoned".to_string()))
    }

    /// Messages waiting for delivery on a subscription.
    pub fn backlog(&self, subscription: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|state| state.subscriptions.get(subscription).map(|s| s.ready.len()))
            .unwrap_or(0)
    }

    /// Messages dropped after exhausting their delivery attempts.
    pub fn dead_letters(&self, subscription: &str) -> Vec<PubSubMessage> {
        self.lock()
            .ok()
            .and_then(|state| {
                state
                    .subscriptions
                    .get(subscription)
                    .map(|s| s.dead_letters.clone())
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, topic: &str, message: PubSubMessage) -> ForwardResult<String> {
        let message_id = Uuid::new_v4().to_string();
        let mut state = self.lock()?;
        for (name, subscription) in state.subscriptions.iter_mut() {
            if subscription.spec.topic != topic {
                continue;
            }
            if !subscription.spec.filter.matches(&message) {
                debug!("{name}: filtered out {message_id}");
                continue;
            }
            subscription.ready.push_back(Queued {
                message_id: message_id.clone(),
                message: message.clone(),
                attempts: 0,
                not_before: None,
            });
        }
        Ok(message_id)
    }

    async fn ensure_subscription(&self, name: &str, spec: SubscriptionSpec) -> ForwardResult<()> {
        let mut state = self.lock()?;
        state
            .subscriptions
            .entry(name.to_string())
            .or_insert_with(|| Subscription {
                spec,
                ready: VecDeque::new(),
                outstanding: HashMap::new(),
                dead_letters: Vec::new(),
            });
        Ok(())
    }

    async fn pull(&self, subscription: &str, max: usize) -> ForwardResult<Vec<ReceivedMessage>> {
        let mut state = self.lock()?;
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| ForwardError::NotFound(format!("subscription {subscription}")))?;

        let now = Instant::now();
        let mut received = Vec::new();
        let mut held = VecDeque::new();
        while received.len() < max {
            let Some(mut queued) = sub.ready.pop_front() else {
                break;
            };
            if queued.not_before.is_some_and(|due| due > now) {
                held.push_back(queued);
                continue;
            }
            queued.attempts += 1;
            let ack_id = Uuid::new_v4().to_string();
            received.push(ReceivedMessage {
                ack_id: ack_id.clone(),
                message_id: queued.message_id.clone(),
                message: queued.message.clone(),
                delivery_attempt: queued.attempts,
            });
            sub.outstanding.insert(ack_id, queued);
        }
        // Held messages keep their place ahead of the rest.
        while let Some(queued) = held.pop_back() {
            sub.ready.push_front(queued);
        }
        Ok(received)
    }

    async fn ack(&self, subscription: &str, ack_id: &str) -> ForwardResult<()> {
        let mut state = self.lock()?;
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| ForwardError::NotFound(format!("subscription {subscription}")))?;
        sub.outstanding.remove(ack_id);
        Ok(())
    }

    async fn nack(&self, subscription: &str, ack_id: &str) -> ForwardResult<()> {
        let mut state = self.lock()?;
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| ForwardError::NotFound(format!("subscription {subscription}")))?;
        let Some(mut queued) = sub.outstanding.remove(ack_id) else {
            return Ok(());
        };
        if queued.attempts >= sub.spec.max_delivery_attempts {
            warn!(
                "{subscription}: dead-lettering {} after {} deliveries",
                queued.message_id, queued.attempts
            );
            sub.dead_letters.push(queued.message);
        } else {
            queued.not_before = Some(Instant::now() + sub.spec.redelivery_delay);
            sub.ready.push_back(queued);
        }
        Ok(())
    }
}
