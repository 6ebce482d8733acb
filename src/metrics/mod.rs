use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for the consume/publish pipeline
// ============================================================================
//
// Provides metrics for:
// - Batch flushes by trigger (size_limit, timeout, shutdown)
// - Ack / nack / dead-letter outcomes per queue
// - Broker reconnect attempts
// - Publish failures per routing key
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Batch Metrics
    pub batches_flushed: IntCounterVec,
    pub batch_processing_duration: HistogramVec,

    // Delivery Outcome Metrics
    pub messages_acked: IntCounterVec,
    pub messages_nacked: IntCounterVec,
    pub messages_dead_lettered: IntCounterVec,

    // Transport Metrics
    pub reconnect_attempts: IntCounterVec,
    pub publish_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let batches_flushed = IntCounterVec::new(
            Opts::new("consumer_batches_flushed_total", "Total batches flushed"),
            &["queue", "trigger"],
        )?;
        registry.register(Box::new(batches_flushed.clone()))?;

        let batch_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "consumer_batch_processing_duration_seconds",
                "Processor duration per batch",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["queue"],
        )?;
        registry.register(Box::new(batch_processing_duration.clone()))?;

        let messages_acked = IntCounterVec::new(
            Opts::new("consumer_messages_acked_total", "Messages acknowledged"),
            &["queue"],
        )?;
        registry.register(Box::new(messages_acked.clone()))?;

        let messages_nacked = IntCounterVec::new(
            Opts::new("consumer_messages_nacked_total", "Messages negatively acknowledged"),
            &["queue", "requeue"],
        )?;
        registry.register(Box::new(messages_nacked.clone()))?;

        let messages_dead_lettered = IntCounterVec::new(
            Opts::new("consumer_messages_dead_lettered_total", "Messages routed to dead letter"),
            &["queue"],
        )?;
        registry.register(Box::new(messages_dead_lettered.clone()))?;

        let reconnect_attempts = IntCounterVec::new(
            Opts::new("consumer_reconnect_attempts_total", "Broker reconnect attempts"),
            &["queue"],
        )?;
        registry.register(Box::new(reconnect_attempts.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("publisher_failures_total", "Messages that could not be published"),
            &["routing_key"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        Ok(Self {
            registry,
            batches_flushed,
            batch_processing_duration,
            messages_acked,
            messages_nacked,
            messages_dead_lettered,
            reconnect_attempts,
            publish_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_flush(&self, queue: &str, trigger: &str, duration_secs: f64) {
        self.batches_flushed.with_label_values(&[queue, trigger]).inc();
        self.batch_processing_duration
            .with_label_values(&[queue])
            .observe(duration_secs);
    }

    pub fn record_ack(&self, queue: &str, count: usize) {
        self.messages_acked
            .with_label_values(&[queue])
            .inc_by(count as u64);
    }

    pub fn record_nack(&self, queue: &str, count: usize, requeue: bool) {
        let requeue = if requeue { "true" } else { "false" };
        self.messages_nacked
            .with_label_values(&[queue, requeue])
            .inc_by(count as u64);
    }

    pub fn record_dead_letter(&self, queue: &str, count: usize) {
        self.messages_dead_lettered
            .with_label_values(&[queue])
            .inc_by(count as u64);
    }

    pub fn record_reconnect_attempt(&self, queue: &str) {
        self.reconnect_attempts.with_label_values(&[queue]).inc();
    }

    pub fn record_publish_failure(&self, routing_key: &str, count: usize) {
        self.publish_failures
            .with_label_values(&[routing_key])
            .inc_by(count as u64);
    }
}
