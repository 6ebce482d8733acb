//! Processor variants turning inbound order events into audit-log writes.

mod order_created;
mod order_status_changed;

pub use order_created::OrderCreatedProcessor;
pub use order_status_changed::OrderStatusChangedProcessor;

use serde::de::DeserializeOwned;

use super::message::MessageInfo;
use super::processor::ProcessError;

/// Malformed JSON fails the whole batch permanently.
fn decode_batch<T: DeserializeOwned>(batch: &[MessageInfo], processor: &str) -> Result<Vec<T>, ProcessError> {
    batch
        .iter()
        .map(|message| {
            serde_json::from_slice(&message.body).map_err(|e| {
                tracing::error!(
                    processor = processor,
                    tag = %message.tag,
                    error = %e,
                    body = %String::from_utf8_lossy(&message.body),
                    "Failed to decode message"
                );
                ProcessError::Permanent(format!("decode delivery {}: {e}", message.tag))
            })
        })
        .collect()
}
