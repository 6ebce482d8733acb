// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Orders and their append-only audit log. Services own their units of work;
// mappers translate between DTOs, domain values, table rows and messages.
//
// ============================================================================

pub mod audit_log;
pub mod mappers;
pub mod order;
