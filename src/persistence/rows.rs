use chrono::{DateTime, Utc};

// ============================================================================
// Table Rows & Query Filters
// ============================================================================

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub customer_id: i64,
    pub delivery_address: String,
    pub total_price_cents: i64,
    pub total_price_currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub product_title: String,
    pub product_url: String,
    pub price_cents: i64,
    pub price_currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AuditLogOrderRow {
    pub id: i64,
    pub order_id: i64,
    pub order_item_id: i64,
    pub customer_id: i64,
    pub order_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Empty id lists mean "no filter"; non-positive limit/offset are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOrdersFilter {
    pub ids: Vec<i64>,
    pub customer_ids: Vec<i64>,
    pub limit: i64,
    pub offset: i64,
    /// Take row locks until the surrounding transaction ends
    pub lock_for_update: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOrderItemsFilter {
    pub ids: Vec<i64>,
    pub order_ids: Vec<i64>,
    pub limit: i64,
    pub offset: i64,
}
