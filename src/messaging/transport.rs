use async_trait::async_trait;

// ============================================================================
// Transport Channel - broker session seen by the batch consumer
// ============================================================================
//
// Delivery tags increase monotonically within a channel. Acking or nacking
// with `multiple = true` settles every unsettled delivery up to and
// including the given tag.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryTag(pub u64);

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum ChannelEvent {
    Delivery(Delivery),
    /// The broker connection or channel went away
    Closed(String),
    /// The broker cancelled our subscription
    Cancelled(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Channel is not open")]
    NotOpen,

    #[error("Failed to open channel: {0}")]
    Open(String),

    #[error("Failed to declare queue {queue}: {reason}")]
    Declare { queue: String, reason: String },

    #[error("Failed to subscribe to {queue}: {reason}")]
    Subscribe { queue: String, reason: String },

    #[error("Failed to settle delivery {tag}: {reason}")]
    Settle { tag: DeliveryTag, reason: String },
}

#[async_trait]
pub trait Channel: Send + Sync {
    /// Open (or reopen) the underlying session.
    async fn open(&self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Idempotent; declaring an existing queue succeeds.
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Cap unacknowledged deliveries at `count`.
    async fn set_prefetch(&self, count: usize) -> Result<(), TransportError>;

    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<(), TransportError>;

    /// Next event. Must be cancel safe.
    async fn recv(&self) -> ChannelEvent;

    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), TransportError>;

    async fn nack(&self, tag: DeliveryTag, multiple: bool, requeue: bool) -> Result<(), TransportError>;

    async fn close(&self);
}
