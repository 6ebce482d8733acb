// ============================================================================
// Consumer - batch consumption engine and its processors
// ============================================================================

pub mod batch_consumer;
pub mod message;
pub mod processor;
pub mod processors;

pub use batch_consumer::{BatchConsumer, ConsumerError, ConsumerState, FlushTrigger};
pub use message::MessageInfo;
pub use processor::{MessageProcessor, ProcessError};
pub use processors::{OrderCreatedProcessor, OrderStatusChangedProcessor};
