use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messaging::OutboundMessage;

// ============================================================================
// Order Messages - Integration events published after commit
// ============================================================================

pub const ORDER_CREATED_ROUTING_KEY: &str = "order.created";
pub const ORDER_STATUS_CHANGED_ROUTING_KEY: &str = "order.status_changed";

/// A message that knows where it is routed and how it is partitioned.
pub trait RoutedMessage: Serialize {
    fn routing_key(&self) -> &'static str;

    /// Messages with the same key keep their relative order downstream.
    fn partition_key(&self) -> String;

    fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        Ok(OutboundMessage {
            routing_key: self.routing_key().to_string(),
            key: self.partition_key(),
            payload: serde_json::to_vec(self)?,
            headers: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedMessage {
    pub id: i64,
    pub customer_id: i64,
    pub delivery_address: String,
    pub total_price_cents: i64,
    pub total_price_curr: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub order_items: Vec<OrderCreatedItemMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedItemMessage {
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

impl RoutedMessage for OrderCreatedMessage {
    fn routing_key(&self) -> &'static str {
        ORDER_CREATED_ROUTING_KEY
    }

    fn partition_key(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChangedMessage {
    pub order_id: i64,
    pub customer_id: i64,
    pub order_status: String,
}

impl RoutedMessage for OrderStatusChangedMessage {
    fn routing_key(&self) -> &'static str {
        ORDER_STATUS_CHANGED_ROUTING_KEY
    }

    fn partition_key(&self) -> String {
        self.order_id.to_string()
    }
}
