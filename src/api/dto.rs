use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// V1 Request / Response DTOs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V1Order {
    #[serde(default)]
    pub id: i64,
    pub customer_id: i64,
    pub delivery_address: String,
    pub total_price_cents: i64,
    pub total_price_currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub order_items: Vec<V1OrderItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V1OrderItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub product_title: String,
    #[serde(default)]
    pub product_url: String,
    pub price_cents: i64,
    pub price_currency: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V1CreateOrderRequest {
    pub orders: Vec<V1Order>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V1QueryOrdersRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub customer_ids: Vec<i64>,
    pub page: i64,
    pub page_size: i64,
    #[serde(default)]
    pub include_order_items: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V1UpdateOrdersStatusRequest {
    pub order_ids: Vec<i64>,
    pub new_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V1LogOrder {
    #[serde(default)]
    pub id: i64,
    pub order_id: i64,
    pub order_item_id: i64,
    pub customer_id: i64,
    pub order_status: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V1CreateAuditLogOrderRequest {
    pub orders: Vec<V1LogOrder>,
}
