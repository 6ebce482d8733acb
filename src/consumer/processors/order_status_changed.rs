use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::decode_batch;
use crate::api::dto::{V1CreateAuditLogOrderRequest, V1LogOrder, V1Order, V1QueryOrdersRequest};
use crate::api::OrderApi;
use crate::consumer::message::MessageInfo;
use crate::consumer::processor::{MessageProcessor, ProcessError};
use crate::domain::order::OrderStatusChangedMessage;
use crate::validation::MAX_PAGE_SIZE;

/// Reloads the changed orders and logs every item with the current status.
pub struct OrderStatusChangedProcessor {
    api: Arc<OrderApi>,
}

impl OrderStatusChangedProcessor {
    pub fn new(api: Arc<OrderApi>) -> Self {
        Self { api }
    }

    async fn load_orders(&self, ids: &[i64]) -> Result<Vec<V1Order>, ProcessError> {
        let mut orders = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_PAGE_SIZE as usize) {
            let found = self
                .api
                .query_orders(&V1QueryOrdersRequest {
                    ids: chunk.to_vec(),
                    page: 1,
                    page_size: chunk.len() as i64,
                    include_order_items: true,
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to reload orders");
                    ProcessError::from(e)
                })?;
            orders.extend(found);
        }
        Ok(orders)
    }
}

#[async_trait]
impl MessageProcessor for OrderStatusChangedProcessor {
    async fn process(&self, batch: &[MessageInfo]) -> Result<(), ProcessError> {
        let changes: Vec<OrderStatusChangedMessage> = decode_batch(batch, "order_status_changed")?;

        let mut seen = HashSet::new();
        let ids: Vec<i64> = changes
            .iter()
            .map(|c| c.order_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let orders = self.load_orders(&ids).await?;
        if orders.len() < ids.len() {
            tracing::warn!(
                requested = ids.len(),
                found = orders.len(),
                "Some changed orders no longer exist"
            );
        }

        let entries: Vec<V1LogOrder> = orders
            .iter()
            .flat_map(|order| {
                order.order_items.iter().map(move |item| V1LogOrder {
                    order_id: order.id,
                    order_item_id: item.id,
                    customer_id: order.customer_id,
                    order_status: order.status.clone(),
                    ..Default::default()
                })
            })
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        self.api
            .log_orders(&V1CreateAuditLogOrderRequest { orders: entries })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store audit log");
                ProcessError::from(e)
            })?;

        tracing::info!(count = changes.len(), "Order status changed batch processed");
        Ok(())
    }
}
