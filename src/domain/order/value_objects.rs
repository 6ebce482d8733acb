use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub delivery_address: String,
    pub total_price_cents: i64,
    pub total_price_currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub order_items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
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

/// An order that has not been persisted yet. Ids and timestamps are
/// assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub customer_id: i64,
    pub delivery_address: String,
    pub total_price_cents: i64,
    pub total_price_currency: String,
    pub order_items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub product_title: String,
    pub product_url: String,
    pub price_cents: i64,
    pub price_currency: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOrderItemsModel {
    pub ids: Vec<i64>,
    pub customer_ids: Vec<i64>,
    pub page: i64,
    pub page_size: i64,
    pub include_order_items: bool,
}

impl QueryOrderItemsModel {
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// Saturates instead of wrapping for pages past the end of `i64`.
    pub fn offset(&self) -> i64 {
        self.page_size
            .max(0)
            .saturating_mul(self.page.saturating_sub(1).max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Processing,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Created,
        OrderStatus::Processing,
        OrderStatus::Cancelled,
        OrderStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Processing => "processing",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
