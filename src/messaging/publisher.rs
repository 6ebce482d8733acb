use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use rdkafka::admin::AdminClient;
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use tokio::sync::OnceCell;

use super::kafka::{base_client_config, ensure_topics};
use crate::config::{KafkaSettings, PublisherSettings};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

// ============================================================================
// Publisher - best-effort emission of derived events
// ============================================================================
//
// Messages carry a routing key; the exchange mappings translate routing keys
// into topics with AMQP topic patterns (`*` one word, `#` zero or more).
// Topics are declared once, on first publish.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub routing_key: String,
    /// Partition key
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("No exchange mapping for routing key {routing_key}")]
    Unroutable { routing_key: String },

    #[error("{failed} of {total} messages failed to publish: {reason}")]
    Send {
        failed: usize,
        total: usize,
        reason: String,
    },

    #[error("Failed to declare publisher topology: {0}")]
    Topology(String),

    #[error("Kafka client error: {0}")]
    Client(#[from] KafkaError),
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        matches!(self, PublishError::Send { .. } | PublishError::Topology(_))
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_batch(&self, messages: Vec<OutboundMessage>) -> Result<(), PublishError>;
}

/// AMQP topic-exchange match of `routing_key` against `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &words)
}

fn matches_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((first, rest)) if *first == "#" => {
            (0..=words.len()).any(|skip| matches_words(rest, &words[skip..]))
        }
        Some((first, rest)) => match words.split_first() {
            Some((word, remaining)) => {
                (*first == "*" || first == word) && matches_words(rest, remaining)
            }
            None => false,
        },
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct SendFailure(#[from] KafkaError);

impl IsTransient for SendFailure {
    fn is_transient(&self) -> bool {
        matches!(
            self.0.rdkafka_error_code(),
            Some(
                RDKafkaErrorCode::QueueFull
                    | RDKafkaErrorCode::MessageTimedOut
                    | RDKafkaErrorCode::RequestTimedOut
                    | RDKafkaErrorCode::NetworkException
                    | RDKafkaErrorCode::BrokerTransportFailure
                    | RDKafkaErrorCode::AllBrokersDown
                    | RDKafkaErrorCode::LeaderNotAvailable
                    | RDKafkaErrorCode::NotLeaderForPartition
            )
        )
    }
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    settings: PublisherSettings,
    topology: OnceCell<()>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl KafkaPublisher {
    pub fn new(
        kafka: &KafkaSettings,
        settings: PublisherSettings,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PublishError> {
        let producer: FutureProducer = base_client_config(kafka)
            .set(
                "message.timeout.ms",
                settings.message_timeout.as_millis().to_string(),
            )
            .set("linger.ms", "100")
            .create()?;
        let admin: AdminClient<DefaultClientContext> = base_client_config(kafka).create()?;

        Ok(Self {
            producer,
            admin,
            settings,
            topology: OnceCell::new(),
            retry: RetryConfig::default(),
            metrics,
        })
    }

    /// First mapping whose pattern matches wins.
    pub fn resolve_topic(&self, routing_key: &str) -> Result<&str, PublishError> {
        self.settings
            .mappings
            .iter()
            .find(|m| topic_matches(&m.routing_key_pattern, routing_key))
            .map(|m| m.topic.as_str())
            .ok_or_else(|| PublishError::Unroutable {
                routing_key: routing_key.to_string(),
            })
    }

    async fn ensure_topology(&self) -> Result<(), PublishError> {
        self.topology
            .get_or_try_init(|| async {
                let topics: BTreeSet<&str> = self
                    .settings
                    .mappings
                    .iter()
                    .map(|m| m.topic.as_str())
                    .collect();
                let topics: Vec<&str> = topics.into_iter().collect();

                ensure_topics(&self.admin, &topics)
                    .await
                    .map_err(|e| PublishError::Topology(e.to_string()))?;

                tracing::info!(
                    exchange = %self.settings.exchange,
                    topics = ?topics,
                    "✅ Publisher topology declared"
                );
                Ok::<(), PublishError>(())
            })
            .await?;
        Ok(())
    }

    async fn send_one(&self, topic: &str, message: &OutboundMessage) -> Result<(), SendFailure> {
        let headers = message
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            });

        let record = FutureRecord::to(topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        self.producer
            .send(record, Timeout::After(self.settings.message_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| SendFailure(e))
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish_batch(&self, messages: Vec<OutboundMessage>) -> Result<(), PublishError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.ensure_topology().await?;

        // Nothing is sent unless every message has a route.
        let routed = messages
            .iter()
            .map(|m| self.resolve_topic(&m.routing_key).map(|topic| (topic, m)))
            .collect::<Result<Vec<_>, _>>()?;
        let total = routed.len();

        let results = join_all(routed.iter().map(|&(topic, message)| async move {
            retry_on_transient(&self.retry, |_| self.send_one(topic, message))
                .await
                .into_result()
                .map_err(|e| (message.routing_key.as_str(), e))
        }))
        .await;

        let failures: Vec<_> = results.into_iter().filter_map(Result::err).collect();
        let Some((_, first)) = failures.first() else {
            tracing::debug!(count = total, "Published batch");
            return Ok(());
        };

        for (routing_key, error) in &failures {
            self.metrics.record_publish_failure(routing_key, 1);
            tracing::warn!(routing_key = %routing_key, error = %error, "Publish failed");
        }
        Err(PublishError::Send {
            failed: failures.len(),
            total,
            reason: first.to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ExchangeMapping;

    fn publisher() -> KafkaPublisher {
        let kafka = KafkaSettings {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "order-pipeline".to_string(),
            group_id: "order-pipeline".to_string(),
            username: None,
            password: None,
        };
        let mapping = |topic: &str, pattern: &str| ExchangeMapping {
            topic: topic.to_string(),
            routing_key_pattern: pattern.to_string(),
        };
        let settings = PublisherSettings {
            exchange: "oms".to_string(),
            mappings: vec![
                mapping("oms.order.created", "order.created"),
                mapping("oms.order.status-changed", "order.status_changed"),
                mapping("oms.dead-letter", "#.dead_letter"),
            ],
            message_timeout: Duration::from_secs(5),
        };
        KafkaPublisher::new(&kafka, settings, Arc::new(Metrics::new().unwrap())).unwrap()
    }

    #[test]
    fn test_exact_pattern_matches() {
        assert!(topic_matches("order.created", "order.created"));
        assert!(!topic_matches("order.created", "order.created.v2"));
        assert!(!topic_matches("order.created", "order"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(topic_matches("order.*", "order.created"));
        assert!(!topic_matches("order.*", "order"));
        assert!(!topic_matches("order.*", "order.created.dead_letter"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        assert!(topic_matches("#", "order.created"));
        assert!(topic_matches("order.#", "order"));
        assert!(topic_matches("#.dead_letter", "order.created.dead_letter"));
        assert!(topic_matches("#.dead_letter", "dead_letter"));
        assert!(!topic_matches("#.dead_letter", "order.created"));
    }

    #[test]
    fn test_resolve_topic_uses_mappings() {
        let publisher = publisher();

        assert_eq!(publisher.resolve_topic("order.created").unwrap(), "oms.order.created");
        assert_eq!(
            publisher.resolve_topic("order.status_changed.dead_letter").unwrap(),
            "oms.dead-letter"
        );
        assert!(matches!(
            publisher.resolve_topic("customer.created"),
            Err(PublishError::Unroutable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unroutable_batch_sends_nothing() {
        let publisher = publisher();
        // Topology already done so no broker round trip is needed.
        publisher.topology.set(()).unwrap();

        let message = OutboundMessage {
            routing_key: "customer.created".to_string(),
            key: "1".to_string(),
            payload: b"{}".to_vec(),
            headers: Vec::new(),
        };
        let result = publisher.publish_batch(vec![message]).await;

        assert!(matches!(result, Err(PublishError::Unroutable { .. })));
    }

    #[tokio::test]
    async fn test_recording_publisher() {
        let publisher = testing::RecordingPublisher::new();
        publisher
            .publish_batch(vec![OutboundMessage {
                routing_key: "order.created".to_string(),
                key: "7".to_string(),
                payload: b"{}".to_vec(),
                headers: Vec::new(),
            }])
            .await
            .unwrap();

        assert_eq!(publisher.published().len(), 1);
        assert!(testing::RecordingPublisher::failing()
            .publish_batch(Vec::new())
            .await
            .is_err());
    }

    #[test]
    fn test_publish_error_classification() {
        assert!(PublishError::Topology("down".into()).is_transient());
        assert!(!PublishError::Unroutable {
            routing_key: "x".into()
        }
        .is_transient());
    }
}
