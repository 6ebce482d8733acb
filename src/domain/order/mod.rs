// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Order, OrderItem, OrderStatus, QueryOrderItemsModel)
// - Status state machine
// - Integration messages (OrderCreated, OrderStatusChanged)
// - Errors (OrderError enum)
// - OrderService
//
// ============================================================================

pub mod errors;
pub mod events;
pub mod service;
pub mod status;
pub mod value_objects;

pub use errors::*;
pub use events::*;
pub use service::OrderService;
pub use status::ensure_transition;
pub use value_objects::*;
