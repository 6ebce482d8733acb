use super::errors::OrderError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Status State Machine
// ============================================================================
//
//   created ──► processing ──► completed
//      │             │
//      └──► cancelled ◄┘
//
// Same-state transitions are always legal. Terminal states accept nothing
// else.
//
// ============================================================================

impl OrderStatus {
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Created => &[Created, Cancelled, Processing],
            Processing => &[Processing, Cancelled, Completed],
            Cancelled => &[Cancelled],
            Completed => &[Completed],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Completed)
    }
}

pub fn ensure_transition(order_id: i64, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrderError::InvalidStatusTransition { order_id, from, to })
    }
}
