use crate::error::ForwardResult;
use crate::forwarder::{Delivery, OutboundRequest};
use crate::pubsub::{Broker, INSTANCE_ID_ATTRIBUTE, PubSubMessage, TYPE_ATTRIBUTE};
use crate::result::{DeliveryResult, DeliveryResults, ForwardStatus};
use async_trait::async_trait;
use haforward_types::InstanceId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// [`Delivery`] that publishes each command once to the cluster topic.
pub struct PubSubDelivery<B: Broker> {
    broker: Arc<B>,
    topic: String,
    instance_id: InstanceId,
}

impl<B: Broker> PubSubDelivery<B> {
    pub fn new(broker: Arc<B>, topic: impl Into<String>, instance_id: InstanceId) -> Self {
        Self {
            broker,
            topic: topic.into(),
            instance_id,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl<B: Broker> Delivery for PubSubDelivery<B> {
    fn backend(&self) -> &'static str {
        "pubsub"
    }

    async fn targets(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    async fn attempt(
        &self,
        target: &str,
        request: &OutboundRequest,
    ) -> ForwardResult<DeliveryResults> {
        let attributes = HashMap::from([
            (INSTANCE_ID_ATTRIBUTE.to_string(), self.instance_id.to_string()),
            (TYPE_ATTRIBUTE.to_string(), request.type_name.to_string()),
        ]);
        let message_id = self
            .broker
            .publish(
                target,
                PubSubMessage {
                    data: request.body.clone(),
                    attributes,
                },
            )
            .await?;
        debug!(
            "Published {} as {message_id} on {} ({})",
            request.request_id,
            target,
            self.broker.provider_name()
        );
        Ok(DeliveryResults::single(DeliveryResult::new(
            &request.request_id,
            target,
            ForwardStatus::Success,
        )))
    }
}
