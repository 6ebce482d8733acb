// ============================================================================
// API Layer - versioned request/response shapes and the typed entry points
// ============================================================================

pub mod dto;
pub mod handlers;

pub use handlers::OrderApi;
