//! Broker reached over the Cloud Pub/Sub REST API.
//!
//! Each node talks to the same project, so the topic and every node's
//! subscription live on the service and commands cross process boundaries.

use crate::error::{ForwardError, ForwardResult};
use crate::http::classify;
use crate::pubsub::{Broker, PubSubMessage, ReceivedMessage, SubscriptionSpec};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Longest retry backoff the service accepts.
const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Connection settings for [`HttpBroker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBrokerConfig {
    /// Base URL of the API (e.g. `https://pubsub.googleapis.com`).
    pub endpoint: String,
    /// Project owning the topic and subscriptions.
    pub project: String,
    /// OAuth2 bearer token; omitted for emulators.
    pub access_token: Option<String>,
    /// Topic receiving messages that exhausted their deliveries. Without it
    /// the service redelivers forever.
    pub dead_letter_topic: Option<String>,
    /// Whole-request timeout (milliseconds).
    pub timeout_ms: u64,
}

impl Default for HttpBrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://pubsub.googleapis.com".to_string(),
            project: String::new(),
            access_token: None,
            dead_letter_topic: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    data: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubscription {
    topic: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    filter: String,
    retry_policy: RetryPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    dead_letter_policy: Option<DeadLetterPolicy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetryPolicy {
    minimum_backoff: String,
    maximum_backoff: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadLetterPolicy {
    dead_letter_topic: String,
    max_delivery_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
    return_immediately: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceived>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceived {
    ack_id: String,
    message: WirePulled,
    /// Only reported when the subscription has a dead-letter policy.
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePulled {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AckRequest<'a> {
    ack_ids: [&'a str; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadline<'a> {
    ack_ids: [&'a str; 1],
    ack_deadline_seconds: u32,
}

/// A [`Broker`] backed by a Cloud Pub/Sub compatible REST service.
///
/// Nacks release the message at once; the subscription's retry policy then
/// holds it back for the redelivery delay before it is handed out again.
pub struct HttpBroker {
    client: Client,
    config: HttpBrokerConfig,
}

impl HttpBroker {
    pub fn new(config: HttpBrokerConfig) -> ForwardResult<Self> {
        if config.project.is_empty() {
            return Err(ForwardError::Config(
                "pubsub.remote.project must not be empty".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ForwardError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{topic}", self.config.project)
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/v1/projects/{}/{resource}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> ForwardResult<Response> {
        let response = self.authorized(builder).send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        debug!("{what}: broker answered {status}");
        Err(match status {
            StatusCode::NOT_FOUND => ForwardError::NotFound(what.to_string()),
            _ => ForwardError::Status {
                status: status.as_u16(),
            },
        })
    }

    async fn post_json<T: Serialize>(&self, resource: &str, body: &T) -> ForwardResult<Response> {
        self.send(self.client.post(self.url(resource)).json(body), resource)
            .await
    }
}

/// Renders a duration the way the API's JSON mapping expects (`"1.500s"`).
fn backoff(delay: Duration) -> String {
    format!("{:.3}s", delay.min(MAX_BACKOFF).as_secs_f64())
}

fn decode_message(wire: WireReceived) -> ForwardResult<ReceivedMessage> {
    let data = BASE64
        .decode(wire.message.data.as_bytes())
        .map_err(|e| ForwardError::Broker(format!("invalid message data: {e}")))?;
    Ok(ReceivedMessage {
        ack_id: wire.ack_id,
        message_id: wire.message.message_id,
        message: PubSubMessage {
            data,
            attributes: wire.message.attributes,
        },
        delivery_attempt: wire.delivery_attempt.unwrap_or(1),
    })
}

#[async_trait]
impl Broker for HttpBroker {
    fn provider_name(&self) -> &'static str {
        "cloud pub/sub"
    }

    async fn publish(&self, topic: &str, message: PubSubMessage) -> ForwardResult<String> {
        let request = PublishRequest {
            messages: vec![WireMessage {
                data: BASE64.encode(&message.data),
                attributes: message.attributes,
            }],
        };
        let response = self
            .post_json(&format!("topics/{topic}:publish"), &request)
            .await?;
        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| ForwardError::Broker(format!("invalid publish response: {e}")))?;
        published
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| ForwardError::Broker("publish returned no message id".into()))
    }

    async fn ensure_subscription(&self, name: &str, spec: SubscriptionSpec) -> ForwardResult<()> {
        let delay = backoff(spec.redelivery_delay);
        let body = CreateSubscription {
            topic: self.topic_path(&spec.topic),
            filter: spec.filter.expression(),
            retry_policy: RetryPolicy {
                minimum_backoff: delay.clone(),
                maximum_backoff: delay,
            },
            dead_letter_policy: self.config.dead_letter_topic.as_ref().map(|topic| {
                DeadLetterPolicy {
                    dead_letter_topic: self.topic_path(topic),
                    max_delivery_attempts: spec.max_delivery_attempts,
                }
            }),
        };
        let resource = format!("subscriptions/{name}");
        let request = self.client.put(self.url(&resource)).json(&body);
        match self.send(request, &resource).await {
            Ok(_) => {
                info!("Created subscription {name} on {}", spec.topic);
                Ok(())
            }
            Err(ForwardError::Status { status: 409 }) => {
                debug!("Subscription {name} already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn pull(&self, subscription: &str, max: usize) -> ForwardResult<Vec<ReceivedMessage>> {
        let request = PullRequest {
            max_messages: max,
            return_immediately: true,
        };
        let response = self
            .post_json(&format!("subscriptions/{subscription}:pull"), &request)
            .await?;
        let pulled: PullResponse = response
            .json()
            .await
            .map_err(|e| ForwardError::Broker(format!("invalid pull response: {e}")))?;
        pulled
            .received_messages
            .into_iter()
            .map(decode_message)
            .collect()
    }

    async fn ack(&self, subscription: &str, ack_id: &str) -> ForwardResult<()> {
        let request = AckRequest { ack_ids: [ack_id] };
        self.post_json(&format!("subscriptions/{subscription}:acknowledge"), &request)
            .await?;
        Ok(())
    }

    async fn nack(&self, subscription: &str, ack_id: &str) -> ForwardResult<()> {
        let request = ModifyAckDeadline {
            ack_ids: [ack_id],
            ack_deadline_seconds: 0,
        };
        self.post_json(
            &format!("subscriptions/{subscription}:modifyAckDeadline"),
            &request,
        )
        .await?;
        Ok(())
    }
}
