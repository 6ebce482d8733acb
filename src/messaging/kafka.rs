use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio::sync::Notify;

use super::transport::{Channel, ChannelEvent, Delivery, DeliveryTag, TransportError};
use crate::config::KafkaSettings;

// ============================================================================
// Kafka Channel - queue semantics on top of a consumer group
// ============================================================================
//
// Every received record gets a synthetic delivery tag mapped to its
// (topic, partition, offset). Acks commit offsets; a requeueing nack seeks
// the partition back so the records are fetched again. Prefetch is emulated
// by holding back `recv` while too many deliveries are unsettled.
//
// ============================================================================

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const TOPIC_PARTITIONS: i32 = 3;
const TOPIC_REPLICATION: i32 = 1;

/// Shared client settings for consumers, producers and admin clients.
pub fn base_client_config(kafka: &KafkaSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &kafka.bootstrap_servers)
        .set("client.id", &kafka.client_id);

    if let (Some(username), Some(password)) = (&kafka.username, &kafka.password) {
        config
            .set("security.protocol", "SASL_PLAINTEXT")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }
    config
}

/// Create each topic unless it already exists.
pub async fn ensure_topics(
    admin: &AdminClient<DefaultClientContext>,
    topics: &[&str],
) -> Result<(), KafkaError> {
    let new_topics: Vec<NewTopic> = topics
        .iter()
        .map(|topic| NewTopic::new(topic, TOPIC_PARTITIONS, TopicReplication::Fixed(TOPIC_REPLICATION)))
        .collect();

    for result in admin.create_topics(&new_topics, &AdminOptions::new()).await? {
        match result {
            Ok(topic) => tracing::info!(topic = %topic, "Topic created"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(topic = %topic, "Topic already exists")
            }
            Err((_, code)) => return Err(KafkaError::AdminOp(code)),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InflightOffset {
    topic: String,
    partition: i32,
    offset: i64,
}

type PartitionKey = (String, i32);

/// Offsets to commit once `settled` are done: one past the highest settled
/// offset, held back to the lowest offset still unsettled in that partition.
fn commit_positions(
    settled: &[InflightOffset],
    remaining: &BTreeMap<u64, InflightOffset>,
) -> BTreeMap<PartitionKey, i64> {
    let mut positions: BTreeMap<PartitionKey, i64> = BTreeMap::new();
    for s in settled {
        positions
            .entry((s.topic.clone(), s.partition))
            .and_modify(|p| *p = (*p).max(s.offset + 1))
            .or_insert(s.offset + 1);
    }
    for r in remaining.values() {
        if let Some(p) = positions.get_mut(&(r.topic.clone(), r.partition)) {
            *p = (*p).min(r.offset);
        }
    }
    positions
}

/// Lowest settled offset per partition; where a requeue rewinds to.
fn rewind_positions(settled: &[InflightOffset]) -> BTreeMap<PartitionKey, i64> {
    let mut positions: BTreeMap<PartitionKey, i64> = BTreeMap::new();
    for s in settled {
        positions
            .entry((s.topic.clone(), s.partition))
            .and_modify(|p| *p = (*p).min(s.offset))
            .or_insert(s.offset);
    }
    positions
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct KafkaChannel {
    consumer_config: ClientConfig,
    admin_config: ClientConfig,
    consumer: RwLock<Option<Arc<StreamConsumer>>>,
    admin: RwLock<Option<Arc<AdminClient<DefaultClientContext>>>>,
    inflight: Mutex<BTreeMap<u64, InflightOffset>>,
    capacity: Notify,
    prefetch: AtomicUsize,
    next_tag: AtomicU64,
}

impl KafkaChannel {
    pub fn new(kafka: &KafkaSettings, consumer_tag: &str) -> Self {
        let admin_config = base_client_config(kafka);
        let mut consumer_config = base_client_config(kafka);
        consumer_config
            .set("client.id", consumer_tag)
            .set("group.id", &kafka.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false");

        Self {
            consumer_config,
            admin_config,
            consumer: RwLock::new(None),
            admin: RwLock::new(None),
            inflight: Mutex::new(BTreeMap::new()),
            capacity: Notify::new(),
            prefetch: AtomicUsize::new(usize::MAX),
            next_tag: AtomicU64::new(0),
        }
    }

    fn consumer(&self) -> Result<Arc<StreamConsumer>, TransportError> {
        self.consumer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(TransportError::NotOpen)
    }

    fn admin(&self) -> Result<Arc<AdminClient<DefaultClientContext>>, TransportError> {
        self.admin
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(TransportError::NotOpen)
    }

    fn take_settled(&self, tag: DeliveryTag, multiple: bool) -> Vec<InflightOffset> {
        let mut inflight = lock(&self.inflight);
        let settled = if multiple {
            let rest = inflight.split_off(&(tag.0 + 1));
            std::mem::replace(&mut *inflight, rest).into_values().collect()
        } else {
            inflight.remove(&tag.0).into_iter().collect()
        };
        drop(inflight);
        self.capacity.notify_one();
        settled
    }

    fn commit(
        &self,
        consumer: &StreamConsumer,
        tag: DeliveryTag,
        settled: &[InflightOffset],
    ) -> Result<(), TransportError> {
        let positions = commit_positions(settled, &lock(&self.inflight));
        let settle_error = |e: KafkaError| TransportError::Settle {
            tag,
            reason: e.to_string(),
        };

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in positions {
            tpl.add_partition_offset(&topic, partition, Offset::Offset(offset))
                .map_err(settle_error)?;
        }
        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(settle_error)
    }
}

#[async_trait]
impl Channel for KafkaChannel {
    async fn open(&self) -> Result<(), TransportError> {
        let consumer: StreamConsumer = self
            .consumer_config
            .create()
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let consumer = Arc::new(consumer);

        // Client creation never touches the network; probe the cluster here.
        let probe = consumer.clone();
        tokio::task::spawn_blocking(move || probe.fetch_metadata(None, METADATA_TIMEOUT).map(|_| ()))
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let admin: AdminClient<DefaultClientContext> = self
            .admin_config
            .create()
            .map_err(|e| TransportError::Open(e.to_string()))?;

        *self.consumer.write().unwrap_or_else(|p| p.into_inner()) = Some(consumer);
        *self.admin.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(admin));
        tracing::info!("📡 Kafka channel opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.consumer
            .read()
            .map(|c| c.is_some())
            .unwrap_or(false)
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        let admin = self.admin()?;
        ensure_topics(&admin, &[queue])
            .await
            .map_err(|e| TransportError::Declare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set_prefetch(&self, count: usize) -> Result<(), TransportError> {
        self.prefetch.store(count.max(1), Ordering::SeqCst);
        self.capacity.notify_one();
        Ok(())
    }

    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<(), TransportError> {
        let consumer = self.consumer()?;
        consumer
            .subscribe(&[queue])
            .map_err(|e| TransportError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(queue = %queue, consumer_tag = %consumer_tag, "Subscribed");
        Ok(())
    }

    async fn recv(&self) -> ChannelEvent {
        loop {
            while lock(&self.inflight).len() >= self.prefetch.load(Ordering::SeqCst) {
                self.capacity.notified().await;
            }

            let consumer = match self.consumer() {
                Ok(consumer) => consumer,
                Err(e) => return ChannelEvent::Closed(e.to_string()),
            };

            match consumer.recv().await {
                Ok(message) => {
                    let tag = DeliveryTag(self.next_tag.fetch_add(1, Ordering::SeqCst) + 1);
                    lock(&self.inflight).insert(
                        tag.0,
                        InflightOffset {
                            topic: message.topic().to_string(),
                            partition: message.partition(),
                            offset: message.offset(),
                        },
                    );
                    return ChannelEvent::Delivery(Delivery {
                        tag,
                        body: message.payload().unwrap_or_default().to_vec(),
                    });
                }
                Err(KafkaError::PartitionEOF(_)) => continue,
                Err(e) => return ChannelEvent::Closed(e.to_string()),
            }
        }
    }

    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), TransportError> {
        let consumer = self.consumer()?;
        let settled = self.take_settled(tag, multiple);
        if settled.is_empty() {
            // Already rewound by an earlier requeue; the records come again.
            return Ok(());
        }
        self.commit(&consumer, tag, &settled)
    }

    async fn nack(&self, tag: DeliveryTag, multiple: bool, requeue: bool) -> Result<(), TransportError> {
        let consumer = self.consumer()?;
        let settled = self.take_settled(tag, multiple);
        if settled.is_empty() {
            return Ok(());
        }
        if !requeue {
            return self.commit(&consumer, tag, &settled);
        }

        let rewinds = rewind_positions(&settled);
        // Everything at or past the rewind point is fetched again.
        lock(&self.inflight).retain(|_, o| {
            rewinds
                .get(&(o.topic.clone(), o.partition))
                .map_or(true, |min| o.offset < *min)
        });
        for ((topic, partition), offset) in rewinds {
            consumer
                .seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
                .map_err(|e| TransportError::Settle {
                    tag,
                    reason: e.to_string(),
                })?;
        }
        self.capacity.notify_one();
        Ok(())
    }

    async fn close(&self) {
        let consumer = self
            .consumer
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(consumer) = consumer {
            consumer.unsubscribe();
        }
        self.admin.write().unwrap_or_else(|p| p.into_inner()).take();
        lock(&self.inflight).clear();
        self.capacity.notify_one();
        tracing::info!("Kafka channel closed");
    }
}
