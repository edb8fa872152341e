use crate::error::ForwardResult;
use crate::inbound::{InboundHandler, InboundOutcome};
use crate::pubsub::{
    Broker, PubSubConfig, ReceivedMessage, SubscriptionFilter, SubscriptionSpec, TYPE_ATTRIBUTE,
};
use futures::future::join_all;
use haforward_types::InstanceId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pulls forwarded commands from this node's subscription.
///
/// A pulled batch is handled concurrently. Applied and rejected messages are
/// acknowledged; failed and in-flight ones are nacked so the broker
/// redelivers them, after its redelivery delay, until the subscription's
/// delivery limit.
pub struct PubSubSubscriber<B: Broker> {
    broker: Arc<B>,
    handler: Arc<dyn InboundHandler>,
    instance_id: InstanceId,
    subscription: String,
    config: PubSubConfig,
}

impl<B: Broker> PubSubSubscriber<B> {
    pub fn new(
        broker: Arc<B>,
        handler: Arc<dyn InboundHandler>,
        instance_id: InstanceId,
        config: PubSubConfig,
    ) -> Self {
        let subscription = format!("{}-{}", config.subscription_prefix, instance_id);
        Self {
            broker,
            handler,
            instance_id,
            subscription,
            config,
        }
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Creates the subscription with the self-exclusion filter.
    pub async fn provision(&self) -> ForwardResult<()> {
        let spec = SubscriptionSpec {
            topic: self.config.topic.clone(),
            filter: SubscriptionFilter::exclude_origin(self.instance_id.to_string()),
            max_delivery_attempts: self.config.max_delivery_attempts,
            redelivery_delay: self.config.redelivery_delay(),
        };
        self.broker.ensure_subscription(&self.subscription, spec).await?;
        info!(
            "Subscribed {} to {} on {}",
            self.subscription,
            self.config.topic,
            self.broker.provider_name()
        );
        Ok(())
    }

    /// Processes one batch; returns the number of messages handled.
    pub async fn poll_once(&self) -> ForwardResult<usize> {
        let messages = self
            .broker
            .pull(&self.subscription, self.config.max_messages)
            .await?;
        let count = messages.len();

        // Each message is acked or nacked as soon as its own apply ends.
        let settled = join_all(messages.iter().map(|received| self.settle(received))).await;
        for result in settled {
            result?;
        }
        Ok(count)
    }

    async fn settle(&self, received: &ReceivedMessage) -> ForwardResult<()> {
        let outcome = self.handler.handle(&received.message.data).await;
        let kind = received.message.attribute(TYPE_ATTRIBUTE).unwrap_or("command");
        if outcome.should_redeliver() {
            debug!(
                "{kind} {} {outcome} (delivery {}), nacking",
                received.message_id, received.delivery_attempt
            );
            self.broker.nack(&self.subscription, &received.ack_id).await
        } else {
            if outcome != InboundOutcome::Applied {
                warn!("{kind} {} {outcome}, dropping", received.message_id);
            }
            self.broker.ack(&self.subscription, &received.ack_id).await
        }
    }

    /// Polls until `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let idle = Duration::from_millis(self.config.poll_interval_ms);
            loop {
                let wait = match self.poll_once().await {
                    Ok(0) => idle,
                    Ok(_) => Duration::ZERO,
                    Err(e) => {
                        warn!("{}: pull failed: {e}", self.subscription);
                        idle
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            debug!("{}: subscriber stopped", self.subscription);
        })
    }
}
