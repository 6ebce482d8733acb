pub mod model;
pub mod service;

pub use model::{AuditLogOrder, NewAuditLogOrder};
pub use service::AuditLogOrderService;
