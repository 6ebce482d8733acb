use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Settings - Environment-driven configuration
// ============================================================================
//
// Values are read from the process environment after loading an optional
// `.env` file. Every knob has a default except the database URL.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable '{0}'")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for '{var}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub kafka: KafkaSettings,
    pub order_created_consumer: ConsumerSettings,
    pub order_status_changed_consumer: ConsumerSettings,
    pub publisher: PublisherSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub group_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Batching and reconnect knobs for one consumer instance.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Queue (topic) the consumer reads from
    pub queue: String,
    pub consumer_tag: String,
    pub batch_size: usize,
    /// Upper bound on how long the first buffered message waits for a flush
    pub batch_timeout: Duration,
    /// Deadline for one processor call
    pub process_timeout: Duration,
    pub max_reconnect_attempts: u32,
    /// Elapsed-time window for one run of reconnect attempts
    pub reconnect_timeout: Duration,
    pub reconnect_backoff_step: Duration,
    /// How long shutdown waits for in-flight flushes
    pub drain_grace: Duration,
    pub dead_letter_routing_key: Option<String>,
}

impl ConsumerSettings {
    pub fn new(queue: impl Into<String>, consumer_tag: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            consumer_tag: consumer_tag.into(),
            batch_size: 100,
            batch_timeout: Duration::from_secs(1),
            process_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 3,
            reconnect_timeout: Duration::from_secs(5),
            reconnect_backoff_step: Duration::from_secs(1),
            drain_grace: Duration::from_millis(500),
            dead_letter_routing_key: None,
        }
    }

    /// Broker-side limit on unacknowledged deliveries.
    pub fn prefetch(&self) -> usize {
        self.batch_size.saturating_mul(2).max(1)
    }
}

/// Binds routing keys matching `routing_key_pattern` to a Kafka topic.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExchangeMapping {
    pub topic: String,
    pub routing_key_pattern: String,
}

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub exchange: String,
    pub mappings: Vec<ExchangeMapping>,
    pub message_timeout: Duration,
}

impl Settings {
    /// Load settings from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let settings = Self::from_lookup(|key| std::env::var(key).ok())?;
        tracing::info!(
            bootstrap_servers = %settings.kafka.bootstrap_servers,
            group_id = %settings.kafka.group_id,
            "Configuration loaded"
        );
        Ok(settings)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database = DatabaseSettings {
            url: env.required("DATABASE_URL")?,
            max_connections: env.parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
        };

        let kafka = KafkaSettings {
            bootstrap_servers: env.string_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            client_id: env.string_or("KAFKA_CLIENT_ID", "order-pipeline"),
            group_id: env.string_or("KAFKA_GROUP_ID", "order-pipeline"),
            username: env.optional("KAFKA_USERNAME"),
            password: env.optional("KAFKA_PASSWORD"),
        };

        let order_created_topic = env.string_or("ORDER_CREATED_TOPIC", "oms.order.created");
        let status_changed_topic =
            env.string_or("ORDER_STATUS_CHANGED_TOPIC", "oms.order.status-changed");
        let dead_letter_topic = env.string_or("DEAD_LETTER_TOPIC", "oms.dead-letter");
        let dead_letter_enabled: bool = env.parse_or("CONSUMER_DEAD_LETTER_ENABLED", true)?;

        let base = {
            let mut base = ConsumerSettings::new(String::new(), String::new());
            base.batch_size = env.parse_or("CONSUMER_BATCH_SIZE", base.batch_size)?;
            base.batch_timeout = env.seconds_or("CONSUMER_BATCH_TIMEOUT_SECONDS", base.batch_timeout)?;
            base.process_timeout =
                env.seconds_or("CONSUMER_PROCESS_TIMEOUT_SECONDS", base.process_timeout)?;
            base.max_reconnect_attempts =
                env.parse_or("CONSUMER_MAX_RECONNECT_ATTEMPTS", base.max_reconnect_attempts)?;
            base.reconnect_timeout =
                env.seconds_or("CONSUMER_RECONNECT_TIMEOUT_SECONDS", base.reconnect_timeout)?;
            base.drain_grace = env.millis_or("CONSUMER_DRAIN_GRACE_MS", base.drain_grace)?;
            base
        };
        if base.batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "CONSUMER_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let order_created_consumer = ConsumerSettings {
            queue: order_created_topic.clone(),
            consumer_tag: env.string_or("ORDER_CREATED_CONSUMER_TAG", "order-created-consumer"),
            dead_letter_routing_key: dead_letter_enabled
                .then(|| "order.created.dead_letter".to_string()),
            ..base.clone()
        };
        let order_status_changed_consumer = ConsumerSettings {
            queue: status_changed_topic.clone(),
            consumer_tag: env.string_or(
                "ORDER_STATUS_CHANGED_CONSUMER_TAG",
                "order-status-changed-consumer",
            ),
            dead_letter_routing_key: dead_letter_enabled
                .then(|| "order.status_changed.dead_letter".to_string()),
            ..base
        };

        let default_mappings = vec![
            ExchangeMapping {
                topic: order_created_topic,
                routing_key_pattern: "order.created".to_string(),
            },
            ExchangeMapping {
                topic: status_changed_topic,
                routing_key_pattern: "order.status_changed".to_string(),
            },
            ExchangeMapping {
                topic: dead_letter_topic,
                routing_key_pattern: "#.dead_letter".to_string(),
            },
        ];
        let publisher = PublisherSettings {
            exchange: env.string_or("PUBLISHER_EXCHANGE", "oms"),
            mappings: env.json_or("PUBLISHER_MAPPINGS", default_mappings)?,
            message_timeout: env.millis_or("PUBLISHER_MESSAGE_TIMEOUT_MS", Duration::from_secs(5))?,
        };

        Ok(Self {
            database,
            kafka,
            order_created_consumer,
            order_status_changed_consumer,
            publisher,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn string_or(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn json_or<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn seconds_or(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_or(var, default.as_secs()).map(Duration::from_secs)
    }

    fn millis_or(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_or(var, default.as_millis() as u64)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/oms")])).unwrap();

        let consumer = &settings.order_created_consumer;
        assert_eq!(consumer.batch_size, 100);
        assert_eq!(consumer.batch_timeout, Duration::from_secs(1));
        assert_eq!(consumer.max_reconnect_attempts, 3);
        assert_eq!(consumer.reconnect_timeout, Duration::from_secs(5));
        assert_eq!(consumer.process_timeout, Duration::from_secs(10));
        assert_eq!(consumer.prefetch(), 200);
        assert_eq!(settings.database.max_connections, 10);
        assert_eq!(settings.publisher.mappings.len(), 3);
        assert_eq!(
            consumer.dead_letter_routing_key.as_deref(),
            Some("order.created.dead_letter")
        );
    }

    #[test]
    fn test_missing_database_url() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/oms"),
            ("CONSUMER_BATCH_SIZE", "lots"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("CONSUMER_BATCH_SIZE"));
    }

    #[test]
    fn test_overrides_and_dead_letter_disabled() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/oms"),
            ("CONSUMER_BATCH_SIZE", "5"),
            ("CONSUMER_BATCH_TIMEOUT_SECONDS", "3"),
            ("CONSUMER_DEAD_LETTER_ENABLED", "false"),
            ("ORDER_CREATED_TOPIC", "orders"),
        ]))
        .unwrap();

        let consumer = &settings.order_created_consumer;
        assert_eq!(consumer.queue, "orders");
        assert_eq!(consumer.batch_size, 5);
        assert_eq!(consumer.batch_timeout, Duration::from_secs(3));
        assert!(consumer.dead_letter_routing_key.is_none());
        assert_eq!(settings.order_status_changed_consumer.batch_size, 5);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/oms"),
            ("CONSUMER_BATCH_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CONSUMER_BATCH_SIZE", .. }));
    }

    #[test]
    fn test_publisher_mappings_from_json() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/oms"),
            (
                "PUBLISHER_MAPPINGS",
                r#"[{"topic": "all-orders", "routing_key_pattern": "order.#"}]"#,
            ),
        ]))
        .unwrap();

        assert_eq!(
            settings.publisher.mappings,
            vec![ExchangeMapping {
                topic: "all-orders".to_string(),
                routing_key_pattern: "order.#".to_string(),
            }]
        );
    }

    #[test]
    fn test_malformed_publisher_mappings_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/oms"),
            ("PUBLISHER_MAPPINGS", "order.# -> all-orders"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PUBLISHER_MAPPINGS", .. }));
    }
}
