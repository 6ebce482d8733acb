use std::sync::Arc;

use super::dto::{
    V1CreateAuditLogOrderRequest, V1CreateOrderRequest, V1LogOrder, V1Order,
    V1QueryOrdersRequest, V1UpdateOrdersStatusRequest,
};
use crate::domain::audit_log::AuditLogOrderService;
use crate::domain::mappers::{
    audit_log_to_dto, new_audit_log_from_dto, new_order_from_dto, order_to_dto, query_from_dto,
};
use crate::domain::order::{OrderError, OrderService, OrderStatus};
use crate::validation::{
    validate_create_audit_log_order, validate_create_order, validate_query_orders,
    validate_update_orders_status,
};

// ============================================================================
// OrderApi - validate, map, call the service, map back
// ============================================================================
//
// Transport-agnostic entry points. Consumers call these the same way an HTTP
// or gRPC front end would.
//
// ============================================================================

pub struct OrderApi {
    orders: Arc<OrderService>,
    audit_log: Arc<AuditLogOrderService>,
}

impl OrderApi {
    pub fn new(orders: Arc<OrderService>, audit_log: Arc<AuditLogOrderService>) -> Self {
        Self { orders, audit_log }
    }

    pub async fn create_orders(&self, req: &V1CreateOrderRequest) -> Result<Vec<V1Order>, OrderError> {
        validate_create_order(req).into_result()?;

        let orders = req.orders.iter().map(new_order_from_dto).collect();
        let created = self.orders.batch_insert(orders).await?;
        Ok(created.iter().map(order_to_dto).collect())
    }

    pub async fn query_orders(&self, req: &V1QueryOrdersRequest) -> Result<Vec<V1Order>, OrderError> {
        validate_query_orders(req).into_result()?;

        let orders = self.orders.get_orders(query_from_dto(req)).await?;
        Ok(orders.iter().map(order_to_dto).collect())
    }

    pub async fn update_orders_status(
        &self,
        req: &V1UpdateOrdersStatusRequest,
    ) -> Result<Vec<V1Order>, OrderError> {
        validate_update_orders_status(req).into_result()?;

        let status: OrderStatus = req.new_status.parse()?;
        let updated = self
            .orders
            .update_orders_status(req.order_ids.clone(), status)
            .await?;
        Ok(updated.iter().map(order_to_dto).collect())
    }

    pub async fn log_orders(
        &self,
        req: &V1CreateAuditLogOrderRequest,
    ) -> Result<Vec<V1LogOrder>, OrderError> {
        validate_create_audit_log_order(req).into_result()?;

        let logs = req
            .orders
            .iter()
            .map(new_audit_log_from_dto)
            .collect::<Result<Vec<_>, _>>()?;
        let inserted = self.audit_log.batch_insert(logs).await?;
        Ok(inserted.iter().map(audit_log_to_dto).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::V1OrderItem;
    use crate::messaging::testing::RecordingPublisher;
    use crate::persistence::memory::{MemoryStore, MemoryUnitOfWorkFactory};

    fn api(store: &Arc<MemoryStore>) -> OrderApi {
        let factory = Arc::new(MemoryUnitOfWorkFactory {
            store: store.clone(),
        });
        OrderApi::new(
            Arc::new(OrderService::new(factory.clone(), RecordingPublisher::new())),
            Arc::new(AuditLogOrderService::new(factory)),
        )
    }

    fn order(total_price_cents: i64) -> V1Order {
        V1Order {
            customer_id: 5,
            delivery_address: "Main st 1".to_string(),
            total_price_cents,
            total_price_currency: "RUB".to_string(),
            order_items: vec![V1OrderItem {
                product_id: 11,
                quantity: 2,
                product_title: "Kettle".to_string(),
                price_cents: 250,
                price_currency: "RUB".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_query() {
        let store = MemoryStore::new();
        let api = api(&store);

        let created = api
            .create_orders(&V1CreateOrderRequest {
                orders: vec![order(500)],
            })
            .await
            .unwrap();
        assert_eq!(created[0].status, "created");

        let found = api
            .query_orders(&V1QueryOrdersRequest {
                ids: vec![created[0].id],
                page: 1,
                page_size: 10,
                include_order_items: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_items.len(), 1);
        assert_eq!(found[0].order_items[0].order_id, created[0].id);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_storage() {
        let store = MemoryStore::new();
        let api = api(&store);

        let err = api
            .create_orders(&V1CreateOrderRequest {
                orders: vec![order(499)],
            })
            .await
            .unwrap_err();

        match err {
            OrderError::Validation(errors) => {
                assert!(errors.contains("orders[0].totalPriceCents"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.snapshot().orders.is_empty());
        assert_eq!(store.begins.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_status_rejects_unknown_status() {
        let store = MemoryStore::new();
        let api = api(&store);

        let err = api
            .update_orders_status(&V1UpdateOrdersStatusRequest {
                order_ids: vec![1],
                new_status: "shipped".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_) | OrderError::UnknownStatus(_)));
    }

    #[tokio::test]
    async fn test_log_orders_stores_entries() {
        let store = MemoryStore::new();
        let api = api(&store);

        let logged = api
            .log_orders(&V1CreateAuditLogOrderRequest {
                orders: vec![V1LogOrder {
                    order_id: 1,
                    order_item_id: 2,
                    customer_id: 3,
                    order_status: "processing".to_string(),
                    ..Default::default()
                }],
            })
            .await
            .unwrap();

        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].order_status, "processing");
        assert_eq!(store.snapshot().audit_logs.len(), 1);
    }
}
