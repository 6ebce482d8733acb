use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::message::MessageInfo;
use super::processor::{MessageProcessor, ProcessError};
use crate::config::ConsumerSettings;
use crate::messaging::{
    Channel, ChannelEvent, DeliveryTag, OutboundMessage, Publisher, TransportError,
};
use crate::metrics::Metrics;
use crate::utils::Backoff;

// ============================================================================
// Batch Consumer - buffered, at-least-once delivery to a processor
// ============================================================================
//
// Session lifecycle:
//
//   Idle -> Connecting -> Consuming -> Draining  -> Closed   (shutdown)
//                  ^          |
//                  |          v
//                  +---- Reconnecting                        (channel lost)
//
// Deliveries are appended to a locked buffer. A flush is spawned when the
// buffer reaches `batch_size` or when `batch_timeout` has passed since the
// first message of the current batch was buffered. Flushes run one at a time
// behind the flush gate and snapshot the buffer when they start, so the
// cumulative ack / nack on the last tag always covers exactly the batch.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Consuming,
    Reconnecting,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    SizeLimit,
    Timeout,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::SizeLimit => "size_limit",
            FlushTrigger::Timeout => "timeout",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal session errors; the consumer has given up on the broker.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Consumer {queue}: reconnect window exceeded after {attempts} attempts ({elapsed:?})")]
    ReconnectWindowExceeded {
        queue: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Consumer {queue}: giving up after {attempts} failed connection attempts")]
    ReconnectAttemptsExhausted { queue: String, attempts: u32 },
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

struct Shared {
    settings: ConsumerSettings,
    channel: Arc<dyn Channel>,
    processor: Arc<dyn MessageProcessor>,
    dead_letters: Option<Arc<dyn Publisher>>,
    metrics: Arc<Metrics>,
    buffer: Mutex<Vec<MessageInfo>>,
    flush_gate: Mutex<()>,
    size_flush_pending: AtomicBool,
    tracker: TaskTracker,
    state: watch::Sender<ConsumerState>,
}

pub struct BatchConsumer {
    shared: Arc<Shared>,
}

impl BatchConsumer {
    pub fn new(
        settings: ConsumerSettings,
        channel: Arc<dyn Channel>,
        processor: Arc<dyn MessageProcessor>,
        dead_letters: Option<Arc<dyn Publisher>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            shared: Arc::new(Shared {
                settings,
                channel,
                processor,
                dead_letters,
                metrics,
                buffer: Mutex::new(Vec::new()),
                flush_gate: Mutex::new(()),
                size_flush_pending: AtomicBool::new(false),
                tracker: TaskTracker::new(),
                state,
            }),
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.shared.state.borrow()
    }

    /// Consume until `shutdown` is cancelled or reconnecting is no longer
    /// allowed. Returns `Ok` only after a clean drain.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        let settings = &self.shared.settings;
        let queue = settings.queue.as_str();
        let backoff = Backoff::linear(settings.reconnect_backoff_step);
        let mut attempts: u32 = 0;
        let mut window_start: Option<Instant> = None;

        loop {
            self.set_state(ConsumerState::Connecting);
            let end = match self.connect().await {
                Ok(()) => {
                    // A healthy session earns a fresh reconnect budget.
                    attempts = 0;
                    window_start = None;
                    self.set_state(ConsumerState::Consuming);
                    tracing::info!(
                        queue = %queue,
                        consumer_tag = %settings.consumer_tag,
                        batch_size = settings.batch_size,
                        "✅ Consumer started"
                    );
                    self.consume(&shutdown).await
                }
                Err(e) => SessionEnd::Lost(e.to_string()),
            };

            let reason = match end {
                SessionEnd::Shutdown => {
                    self.drain().await;
                    return Ok(());
                }
                SessionEnd::Lost(reason) => reason,
            };

            self.set_state(ConsumerState::Reconnecting);
            tracing::warn!(queue = %queue, reason = %reason, "Broker channel lost");
            self.abandon_session().await;

            let started = *window_start.get_or_insert_with(Instant::now);
            attempts += 1;
            self.shared.metrics.record_reconnect_attempt(queue);

            let elapsed = started.elapsed();
            if elapsed > settings.reconnect_timeout {
                self.set_state(ConsumerState::Closed);
                tracing::error!(queue = %queue, attempts, elapsed_ms = elapsed.as_millis(), "💀 Reconnect window exceeded");
                return Err(ConsumerError::ReconnectWindowExceeded {
                    queue: queue.to_string(),
                    attempts,
                    elapsed,
                });
            }
            if attempts > settings.max_reconnect_attempts {
                self.set_state(ConsumerState::Closed);
                tracing::error!(queue = %queue, attempts, "💀 Reconnect attempts exhausted");
                return Err(ConsumerError::ReconnectAttemptsExhausted {
                    queue: queue.to_string(),
                    attempts,
                });
            }

            let delay = backoff.delay_for(attempts);
            tracing::warn!(
                queue = %queue,
                attempt = attempts,
                delay_ms = delay.as_millis(),
                "Reconnecting"
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.set_state(ConsumerState::Closed);
                    return Ok(());
                }
                _ = sleep(delay) => {}
            }
        }
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let channel = &self.shared.channel;
        let settings = &self.shared.settings;

        if !channel.is_open() {
            channel.open().await?;
        }
        channel.declare_queue(&settings.queue).await?;
        channel.set_prefetch(settings.prefetch()).await?;
        channel.subscribe(&settings.queue, &settings.consumer_tag).await?;
        Ok(())
    }

    async fn consume(&self, shutdown: &CancellationToken) -> SessionEnd {
        let settings = &self.shared.settings;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return SessionEnd::Shutdown,

                _ = sleep_until_deadline(deadline) => {
                    deadline = None;
                    self.spawn_flush(FlushTrigger::Timeout);
                }

                event = self.shared.channel.recv() => match event {
                    ChannelEvent::Delivery(delivery) => {
                        let buffered = {
                            let mut buffer = self.shared.buffer.lock().await;
                            buffer.push(MessageInfo::from(delivery));
                            buffer.len()
                        };

                        if buffered >= settings.batch_size {
                            deadline = None;
                            if !self.shared.size_flush_pending.swap(true, Ordering::SeqCst) {
                                self.spawn_flush(FlushTrigger::SizeLimit);
                            }
                        } else if deadline.is_none() {
                            deadline = Some(Instant::now() + settings.batch_timeout);
                        }
                    }
                    ChannelEvent::Closed(reason) => return SessionEnd::Lost(reason),
                    ChannelEvent::Cancelled(reason) => {
                        return SessionEnd::Lost(format!("subscription cancelled: {reason}"))
                    }
                },
            }
        }
    }

    fn spawn_flush(&self, trigger: FlushTrigger) {
        let shared = self.shared.clone();
        self.shared.tracker.spawn(async move { shared.flush(trigger).await });
    }

    async fn drain(&self) {
        self.set_state(ConsumerState::Draining);
        tracing::info!(queue = %self.shared.settings.queue, "Draining consumer");

        self.spawn_flush(FlushTrigger::Shutdown);
        self.wait_for_flushes().await;
        self.shared.channel.close().await;

        self.set_state(ConsumerState::Closed);
        tracing::info!(queue = %self.shared.settings.queue, "Consumer stopped");
    }

    /// Unsettled deliveries of a lost session come back from the broker, so
    /// whatever is still buffered is dropped.
    async fn abandon_session(&self) {
        self.wait_for_flushes().await;

        let dropped = {
            let mut buffer = self.shared.buffer.lock().await;
            self.shared.size_flush_pending.store(false, Ordering::SeqCst);
            std::mem::take(&mut *buffer).len()
        };
        if dropped > 0 {
            tracing::warn!(
                queue = %self.shared.settings.queue,
                count = dropped,
                "Discarding buffered messages of lost session"
            );
        }
        self.shared.channel.close().await;
    }

    async fn wait_for_flushes(&self) {
        let tracker = &self.shared.tracker;
        tracker.close();
        if timeout(self.shared.settings.drain_grace, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                queue = %self.shared.settings.queue,
                outstanding = tracker.len(),
                "Flushes still running after grace period"
            );
        }
        tracker.reopen();
    }

    fn set_state(&self, state: ConsumerState) {
        self.shared.state.send_replace(state);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Shared {
    async fn flush(&self, trigger: FlushTrigger) {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut buffer = self.buffer.lock().await;
            if trigger == FlushTrigger::SizeLimit {
                self.size_flush_pending.store(false, Ordering::SeqCst);
            }
            std::mem::take(&mut *buffer)
        };
        let Some(last) = batch.last().map(|m| m.tag) else {
            return;
        };

        let queue = self.settings.queue.as_str();
        let count = batch.len();
        tracing::debug!(queue = %queue, trigger = %trigger, count, "Flushing batch");

        let started = Instant::now();
        let outcome = match timeout(self.settings.process_timeout, self.processor.process(&batch)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProcessError::Transient(format!(
                "processing exceeded {:?}",
                self.settings.process_timeout
            ))),
        };
        self.metrics
            .record_flush(queue, trigger.as_str(), started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => match self.channel.ack(last, true).await {
                Ok(()) => {
                    self.metrics.record_ack(queue, count);
                    tracing::info!(queue = %queue, trigger = %trigger, count, last_tag = %last, "✅ Batch acked");
                }
                Err(e) => {
                    tracing::error!(queue = %queue, count, error = %e, "Failed to ack batch")
                }
            },
            Err(ProcessError::Transient(reason)) => {
                tracing::warn!(queue = %queue, count, reason = %reason, "Batch failed, requeueing");
                self.nack(last, count, true).await;
            }
            Err(ProcessError::Permanent(reason)) => {
                tracing::error!(queue = %queue, count, reason = %reason, "Batch failed permanently");
                self.dead_letter(&batch, &reason).await;
                self.nack(last, count, false).await;
            }
        }
    }

    async fn nack(&self, last: DeliveryTag, count: usize, requeue: bool) {
        let queue = self.settings.queue.as_str();
        match self.channel.nack(last, true, requeue).await {
            Ok(()) => self.metrics.record_nack(queue, count, requeue),
            Err(e) => tracing::error!(queue = %queue, count, requeue, error = %e, "Failed to nack batch"),
        }
    }

    async fn dead_letter(&self, batch: &[MessageInfo], reason: &str) {
        let queue = self.settings.queue.as_str();
        let (Some(publisher), Some(routing_key)) =
            (&self.dead_letters, &self.settings.dead_letter_routing_key)
        else {
            tracing::warn!(queue = %queue, count = batch.len(), "No dead-letter route, dropping batch");
            return;
        };

        let messages = batch
            .iter()
            .map(|m| OutboundMessage {
                routing_key: routing_key.clone(),
                key: m.tag.to_string(),
                payload: m.body.clone(),
                headers: vec![
                    ("x-error".to_string(), reason.to_string()),
                    ("x-source-queue".to_string(), queue.to_string()),
                ],
            })
            .collect();

        match publisher.publish_batch(messages).await {
            Ok(()) => {
                self.metrics.record_dead_letter(queue, batch.len());
                tracing::warn!(queue = %queue, routing_key = %routing_key, count = batch.len(), "📝 Batch dead-lettered");
            }
            Err(e) => {
                for message in batch {
                    tracing::error!(
                        queue = %queue,
                        tag = %message.tag,
                        payload = %String::from_utf8_lossy(&message.body),
                        error = %e,
                        "💀 Message lost: dead-letter publish failed"
                    );
                }
            }
        }
    }
}
