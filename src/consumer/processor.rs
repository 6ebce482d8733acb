use async_trait::async_trait;

use super::message::MessageInfo;
use crate::domain::order::OrderError;
use crate::utils::IsTransient;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessError {
    /// Worth another try; the batch is requeued
    #[error("transient processing failure: {0}")]
    Transient(String),

    /// Retrying cannot help; the batch is dead-lettered and acked away
    #[error("permanent processing failure: {0}")]
    Permanent(String),
}

impl ProcessError {
    pub fn requeue(&self) -> bool {
        matches!(self, ProcessError::Transient(_))
    }
}

impl From<OrderError> for ProcessError {
    fn from(e: OrderError) -> Self {
        if e.is_transient() {
            ProcessError::Transient(e.to_string())
        } else {
            ProcessError::Permanent(e.to_string())
        }
    }
}

/// Handles one flushed batch. The whole batch succeeds or fails together.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, batch: &[MessageInfo]) -> Result<(), ProcessError>;
}
