use std::sync::Arc;

use async_trait::async_trait;

use super::decode_batch;
use crate::api::dto::{V1CreateAuditLogOrderRequest, V1LogOrder};
use crate::api::OrderApi;
use crate::consumer::message::MessageInfo;
use crate::consumer::processor::{MessageProcessor, ProcessError};
use crate::domain::order::{OrderCreatedMessage, OrderStatus};

/// Writes one `created` audit entry per order item.
pub struct OrderCreatedProcessor {
    api: Arc<OrderApi>,
}

impl OrderCreatedProcessor {
    pub fn new(api: Arc<OrderApi>) -> Self {
        Self { api }
    }
}

fn log_entries(orders: &[OrderCreatedMessage]) -> Vec<V1LogOrder> {
    orders
        .iter()
        .flat_map(|order| {
            order.order_items.iter().map(move |item| V1LogOrder {
                order_id: order.id,
                order_item_id: item.id,
                customer_id: order.customer_id,
                order_status: OrderStatus::Created.to_string(),
                ..Default::default()
            })
        })
        .collect()
}

#[async_trait]
impl MessageProcessor for OrderCreatedProcessor {
    async fn process(&self, batch: &[MessageInfo]) -> Result<(), ProcessError> {
        let orders: Vec<OrderCreatedMessage> = decode_batch(batch, "order_created")?;

        let entries = log_entries(&orders);
        if entries.is_empty() {
            tracing::debug!(count = orders.len(), "No order items to log");
            return Ok(());
        }

        self.api
            .log_orders(&V1CreateAuditLogOrderRequest { orders: entries })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store audit log");
                ProcessError::from(e)
            })?;

        tracing::info!(count = orders.len(), "Order created batch processed");
        Ok(())
    }
}
