// ============================================================================
// Persistence Layer - Postgres unit of work and repositories
// ============================================================================

pub mod error;
pub mod repositories;
pub mod rows;
pub mod unit_of_work;

#[cfg(test)]
pub mod memory;

pub use error::PersistenceError;
pub use repositories::{AuditLogOrderRepository, OrderItemRepository, OrderRepository};
pub use rows::{AuditLogOrderRow, OrderItemRow, OrderRow, QueryOrderItemsFilter, QueryOrdersFilter};
pub use unit_of_work::{
    complete_unit_of_work, PgUnitOfWork, PgUnitOfWorkFactory, UnitOfWork, UnitOfWorkFactory,
};
