use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::errors::OrderError;
use super::events::RoutedMessage;
use super::status::ensure_transition;
use super::value_objects::{NewOrder, Order, OrderStatus, QueryOrderItemsModel};
use crate::domain::mappers::{
    new_order_item_to_row, new_order_to_row, order_to_created_message,
    order_to_status_changed_message, orders_from_rows,
};
use crate::messaging::Publisher;
use crate::persistence::{
    complete_unit_of_work, QueryOrderItemsFilter, QueryOrdersFilter, UnitOfWork, UnitOfWorkFactory,
};

// ============================================================================
// Order Service
// ============================================================================
//
// Every call runs in its own unit of work. Writes are all-or-nothing; the
// resulting integration events are published after commit and a publish
// failure never undoes the write.
//
// ============================================================================

pub struct OrderService {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    publisher: Arc<dyn Publisher>,
}

impl OrderService {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            uow_factory,
            publisher,
        }
    }

    pub async fn batch_insert(&self, orders: Vec<NewOrder>) -> Result<Vec<Order>, OrderError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let uow = self.uow_factory.create();
        let outcome = insert_orders(uow.as_ref(), &orders, now).await;
        let inserted = complete_unit_of_work(uow.as_ref(), outcome).await?;

        tracing::info!(count = inserted.len(), "✅ Orders inserted");

        let messages: Vec<_> = inserted.iter().map(order_to_created_message).collect();
        self.publish_best_effort(&messages).await;

        Ok(inserted)
    }

    pub async fn get_orders(&self, query: QueryOrderItemsModel) -> Result<Vec<Order>, OrderError> {
        let uow = self.uow_factory.create();
        let outcome = query_orders(uow.as_ref(), &query).await;
        complete_unit_of_work(uow.as_ref(), outcome).await
    }

    /// Move every order in `ids` to `new_status`, or none of them.
    pub async fn update_orders_status(
        &self,
        ids: Vec<i64>,
        new_status: OrderStatus,
    ) -> Result<Vec<Order>, OrderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let uow = self.uow_factory.create();
        let outcome = transition_orders(uow.as_ref(), ids, new_status, now).await;
        let updated = complete_unit_of_work(uow.as_ref(), outcome).await?;

        tracing::info!(
            count = updated.len(),
            status = %new_status,
            "✅ Order statuses updated"
        );

        let messages: Vec<_> = updated.iter().map(order_to_status_changed_message).collect();
        self.publish_best_effort(&messages).await;

        Ok(updated)
    }

    async fn publish_best_effort<M: RoutedMessage>(&self, messages: &[M]) {
        let mut outbound = Vec::with_capacity(messages.len());
        for message in messages {
            match message.to_outbound() {
                Ok(m) => outbound.push(m),
                Err(e) => tracing::error!(
                    routing_key = message.routing_key(),
                    key = %message.partition_key(),
                    error = %e,
                    "💀 Event lost: serialization failed"
                ),
            }
        }
        if outbound.is_empty() {
            return;
        }

        if let Err(e) = self.publisher.publish_batch(outbound.clone()).await {
            for message in &outbound {
                tracing::error!(
                    routing_key = %message.routing_key,
                    key = %message.key,
                    payload = %String::from_utf8_lossy(&message.payload),
                    error = %e,
                    "💀 Event lost after commit"
                );
            }
        }
    }
}

async fn insert_orders(
    uow: &dyn UnitOfWork,
    orders: &[NewOrder],
    now: DateTime<Utc>,
) -> Result<Vec<Order>, OrderError> {
    uow.begin_transaction().await?;

    let order_rows = orders.iter().map(|o| new_order_to_row(o, now)).collect();
    let inserted = uow.orders().bulk_insert(order_rows).await?;

    // Inserted rows come back in input order, so index i owns orders[i]'s items.
    let item_rows = inserted
        .iter()
        .zip(orders)
        .flat_map(|(row, order)| {
            order
                .order_items
                .iter()
                .map(move |item| new_order_item_to_row(item, row.id, now))
        })
        .collect();
    let items = uow.order_items().bulk_insert(item_rows).await?;

    uow.commit().await?;
    orders_from_rows(inserted, items)
}

async fn query_orders(
    uow: &dyn UnitOfWork,
    query: &QueryOrderItemsModel,
) -> Result<Vec<Order>, OrderError> {
    let rows = uow
        .orders()
        .query(QueryOrdersFilter {
            ids: query.ids.clone(),
            customer_ids: query.customer_ids.clone(),
            limit: query.limit(),
            offset: query.offset(),
            lock_for_update: false,
        })
        .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let items = if query.include_order_items {
        uow.order_items()
            .query(QueryOrderItemsFilter {
                order_ids: rows.iter().map(|r| r.id).collect(),
                ..Default::default()
            })
            .await?
    } else {
        Vec::new()
    };

    orders_from_rows(rows, items)
}

async fn transition_orders(
    uow: &dyn UnitOfWork,
    mut ids: Vec<i64>,
    new_status: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Vec<Order>, OrderError> {
    ids.sort_unstable();
    ids.dedup();

    uow.begin_transaction().await?;

    let current = uow
        .orders()
        .query(QueryOrdersFilter {
            ids: ids.clone(),
            lock_for_update: true,
            ..Default::default()
        })
        .await?;

    let found: HashSet<i64> = current.iter().map(|r| r.id).collect();
    let missing: Vec<i64> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
    if !missing.is_empty() {
        return Err(OrderError::OrdersNotFound(missing));
    }

    for row in &current {
        let from: OrderStatus = row.status.parse()?;
        ensure_transition(row.id, from, new_status)?;
    }

    let updated = uow
        .orders()
        .update_status(&ids, new_status.as_str(), now)
        .await?;

    uow.commit().await?;
    orders_from_rows(updated, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::NewOrderItem;
    use crate::messaging::testing::RecordingPublisher;
    use crate::persistence::memory::{FailPoint, MemoryStore, MemoryUnitOfWorkFactory};
    use std::sync::atomic::Ordering;

    fn new_order(customer_id: i64, items: usize) -> NewOrder {
        NewOrder {
            customer_id,
            delivery_address: "Main st 1".to_string(),
            total_price_cents: 100 * items as i64,
            total_price_currency: "RUB".to_string(),
            order_items: (0..items)
                .map(|i| NewOrderItem {
                    product_id: 100 + i as i64,
                    quantity: 1,
                    product_title: format!("Product {i}"),
                    product_url: String::new(),
                    price_cents: 100,
                    price_currency: "RUB".to_string(),
                })
                .collect(),
        }
    }

    fn service(store: &Arc<MemoryStore>, publisher: &Arc<RecordingPublisher>) -> OrderService {
        OrderService::new(
            Arc::new(MemoryUnitOfWorkFactory {
                store: store.clone(),
            }),
            publisher.clone(),
        )
    }

    #[tokio::test]
    async fn test_batch_insert_links_items_and_publishes() {
        let store = MemoryStore::new();
        let publisher = RecordingPublisher::new();
        let service = service(&store, &publisher);

        let orders = service
            .batch_insert(vec![new_order(1, 2), new_order(2, 1)])
            .await
            .unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].customer_id, 1);
        assert_eq!(orders[0].order_items.len(), 2);
        assert!(orders[0].order_items.iter().all(|i| i.order_id == orders[0].id));
        assert_eq!(orders[1].order_items[0].order_id, orders[1].id);
        assert_eq!(orders[0].status, OrderStatus::Created);

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].routing_key, "order.created");
        assert_eq!(published[0].key, orders[0].id.to_string());

        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let store = MemoryStore::new();
        let publisher = RecordingPublisher::new();
        let service = service(&store, &publisher);
        store.fail_once(FailPoint::OrderItemInsert, false);

        let result = service.batch_insert(vec![new_order(1, 2)]).await;

        assert!(matches!(result, Err(OrderError::Persistence(_))));
        let tables = store.snapshot();
        assert!(tables.orders.is_empty());
        assert!(tables.order_items.is_empty());
        assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_committed_orders() {
        let store = MemoryStore::new();
        let publisher = RecordingPublisher::failing();
        let service = service(&store, &publisher);

        let orders = service.batch_insert(vec![new_order(1, 1)]).await.unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(store.snapshot().orders.len(), 1);
    }

    #[tokio::test]
    async fn test_get_orders_pages_and_joins_items() {
        let store = MemoryStore::new();
        let publisher = RecordingPublisher::new();
        let service = service(&store, &publisher);
        service
            .batch_insert(vec![new_order(1, 1), new_order(1, 2), new_order(2, 1)])
            .await
            .unwrap();

        let page = service
            .get_orders(QueryOrderItemsModel {
                customer_ids: vec![1],
                page: 2,
                page_size: 1,
                include_order_items: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.len(), 1);
        assert_eq!(page[0].order_items.len(), 2);

        let without_items = service
            .get_orders(QueryOrderItemsModel {
                page: 1,
                page_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(without_items.len(), 3);
        assert!(without_items.iter().all(|o| o.order_items.is_empty()));
    }

    #[tokio::test]
    async fn test_get_orders_without_matches_is_empty() {
        let store = MemoryStore::new();
        let service = service(&store, &RecordingPublisher::new());

        let orders = service
            .get_orders(QueryOrderItemsModel {
                ids: vec![404],
                page: 1,
                page_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_publishes_changes() {
        let store = MemoryStore::new();
        let publisher = RecordingPublisher::new();
        let service = service(&store, &publisher);
        let created = service
            .batch_insert(vec![new_order(1, 1), new_order(2, 1)])
            .await
            .unwrap();
        let ids: Vec<i64> = created.iter().map(|o| o.id).collect();

        let updated = service
            .update_orders_status(ids.clone(), OrderStatus::Processing)
            .await
            .unwrap();

        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|o| o.status == OrderStatus::Processing));

        let published = publisher.published();
        let status_events: Vec<_> = published
            .iter()
            .filter(|m| m.routing_key == "order.status_changed")
            .collect();
        assert_eq!(status_events.len(), 2);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejects_whole_batch() {
        let store = MemoryStore::new();
        let service = service(&store, &RecordingPublisher::new());
        let created = service
            .batch_insert(vec![new_order(1, 1), new_order(2, 1)])
            .await
            .unwrap();
        service
            .update_orders_status(vec![created[1].id], OrderStatus::Cancelled)
            .await
            .unwrap();

        let err = service
            .update_orders_status(
                vec![created[0].id, created[1].id],
                OrderStatus::Processing,
            )
            .await
            .unwrap_err();

        match err {
            OrderError::InvalidStatusTransition { order_id, from, to } => {
                assert_eq!(order_id, created[1].id);
                assert_eq!(from, OrderStatus::Cancelled);
                assert_eq!(to, OrderStatus::Processing);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let tables = store.snapshot();
        let first = tables.orders.iter().find(|o| o.id == created[0].id).unwrap();
        assert_eq!(first.status, "created");
    }

    #[tokio::test]
    async fn test_update_unknown_order_fails() {
        let store = MemoryStore::new();
        let service = service(&store, &RecordingPublisher::new());

        let err = service
            .update_orders_status(vec![77], OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrdersNotFound(ids) if ids == vec![77]));
    }
}
