use super::value_objects::OrderStatus;
use crate::persistence::PersistenceError;
use crate::utils::IsTransient;
use crate::validation::ValidationErrors;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order {order_id} cannot transition from {from} to {to}")]
    InvalidStatusTransition {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Orders not found: {0:?}")]
    OrdersNotFound(Vec<i64>),

    #[error("Unknown order status: {0:?}")]
    UnknownStatus(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Persistence(e) => e.is_transient(),
            _ => false,
        }
    }
}
