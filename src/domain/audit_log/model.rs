use chrono::{DateTime, Utc};

use crate::domain::order::OrderStatus;

/// Append-only snapshot of an order item's status at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogOrder {
    pub id: i64,
    pub order_id: i64,
    pub order_item_id: i64,
    pub customer_id: i64,
    pub order_status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLogOrder {
    pub order_id: i64,
    pub order_item_id: i64,
    pub customer_id: i64,
    pub order_status: OrderStatus,
}
