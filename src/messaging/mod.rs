// ============================================================================
// Messaging - broker transport and outbound publication
// ============================================================================

pub mod kafka;
pub mod publisher;
pub mod transport;

pub use kafka::KafkaChannel;
pub use publisher::{KafkaPublisher, OutboundMessage, PublishError, Publisher};
pub use transport::{Channel, ChannelEvent, Delivery, DeliveryTag, TransportError};

#[cfg(test)]
pub use publisher::testing;
