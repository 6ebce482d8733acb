use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Request Validation
// ============================================================================
//
// Validators are pure functions returning a field-path -> message map.
// An empty map means the request is valid.
//
// ============================================================================

mod audit_log_order;
mod create_order;
mod query_orders;
mod update_orders_status;

pub use audit_log_order::validate_create_audit_log_order;
pub use create_order::validate_create_order;
pub use query_orders::{validate_query_orders, MAX_PAGE_SIZE};
pub use update_orders_status::validate_update_orders_status;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    /// Later entries win on duplicate field paths.
    pub fn merge(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error")?;
        for (i, (field, message)) in self.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{field} {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
