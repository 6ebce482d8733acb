use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::error::PersistenceError;
use super::rows::{
    AuditLogOrderRow, OrderItemRow, OrderRow, QueryOrderItemsFilter, QueryOrdersFilter,
};
use super::unit_of_work::PgUnitOfWork;

// ============================================================================
// Repository Contracts
// ============================================================================
//
// Repositories borrow their unit of work and never outlive it. Bulk inserts
// return the stored rows in input order with ids and timestamps filled in.
//
// ============================================================================

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn bulk_insert(&self, orders: Vec<OrderRow>) -> Result<Vec<OrderRow>, PersistenceError>;
    async fn query(&self, filter: QueryOrdersFilter) -> Result<Vec<OrderRow>, PersistenceError>;
    async fn update_status(
        &self,
        ids: &[i64],
        status: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<OrderRow>, PersistenceError>;
}

#[async_trait]
pub trait OrderItemRepository: Send + Sync {
    async fn bulk_insert(
        &self,
        items: Vec<OrderItemRow>,
    ) -> Result<Vec<OrderItemRow>, PersistenceError>;
    async fn query(
        &self,
        filter: QueryOrderItemsFilter,
    ) -> Result<Vec<OrderItemRow>, PersistenceError>;
}

#[async_trait]
pub trait AuditLogOrderRepository: Send + Sync {
    async fn bulk_insert(
        &self,
        logs: Vec<AuditLogOrderRow>,
    ) -> Result<Vec<AuditLogOrderRow>, PersistenceError>;
}

// ============================================================================
// Postgres Repositories
// ============================================================================

const ORDER_COLUMNS: &str = "id, customer_id, delivery_address, total_price_cents, \
     total_price_currency, status, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, product_title, \
     product_url, price_cents, price_currency, created_at, updated_at";

const AUDIT_LOG_COLUMNS: &str =
    "id, order_id, order_item_id, customer_id, order_status, created_at, updated_at";

pub struct PgOrderRepository<'a> {
    uow: &'a PgUnitOfWork,
}

impl<'a> PgOrderRepository<'a> {
    pub fn new(uow: &'a PgUnitOfWork) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository<'_> {
    async fn bulk_insert(&self, orders: Vec<OrderRow>) -> Result<Vec<OrderRow>, PersistenceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "insert into orders (customer_id, delivery_address, total_price_cents, \
                 total_price_currency, status, created_at, updated_at) \
             select customer_id, delivery_address, total_price_cents, \
                 total_price_currency, status, created_at, updated_at \
             from unnest($1::bigint[], $2::text[], $3::bigint[], $4::text[], $5::text[], \
                 $6::timestamptz[], $7::timestamptz[]) with ordinality \
                 as t(customer_id, delivery_address, total_price_cents, total_price_currency, \
                      status, created_at, updated_at, ord) \
             order by ord \
             returning {ORDER_COLUMNS}"
        );

        let mut conn = self.uow.connection().await?;
        let mut rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(orders.iter().map(|o| o.customer_id).collect::<Vec<_>>())
            .bind(orders.iter().map(|o| o.delivery_address.clone()).collect::<Vec<_>>())
            .bind(orders.iter().map(|o| o.total_price_cents).collect::<Vec<_>>())
            .bind(orders.iter().map(|o| o.total_price_currency.clone()).collect::<Vec<_>>())
            .bind(orders.iter().map(|o| o.status.clone()).collect::<Vec<_>>())
            .bind(orders.iter().map(|o| o.created_at).collect::<Vec<_>>())
            .bind(orders.iter().map(|o| o.updated_at).collect::<Vec<_>>())
            .fetch_all(&mut *conn)
            .await?;

        // Ids come from a sequence consumed in `ord` order.
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn query(&self, filter: QueryOrdersFilter) -> Result<Vec<OrderRow>, PersistenceError> {
        let mut qb = build_orders_query(filter);
        let mut conn = self.uow.connection().await?;
        let rows = qb.build_query_as::<OrderRow>().fetch_all(&mut *conn).await?;
        Ok(rows)
    }

    async fn update_status(
        &self,
        ids: &[i64],
        status: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<OrderRow>, PersistenceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "update orders set status = $1, updated_at = $2 \
             where id = any($3) \
             returning {ORDER_COLUMNS}"
        );

        let mut conn = self.uow.connection().await?;
        let mut rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(status)
            .bind(updated_at)
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }
}

pub struct PgOrderItemRepository<'a> {
    uow: &'a PgUnitOfWork,
}

impl<'a> PgOrderItemRepository<'a> {
    pub fn new(uow: &'a PgUnitOfWork) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl OrderItemRepository for PgOrderItemRepository<'_> {
    async fn bulk_insert(
        &self,
        items: Vec<OrderItemRow>,
    ) -> Result<Vec<OrderItemRow>, PersistenceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "insert into order_items (order_id, product_id, quantity, product_title, \
                 product_url, price_cents, price_currency, created_at, updated_at) \
             select order_id, product_id, quantity, product_title, \
                 product_url, price_cents, price_currency, created_at, updated_at \
             from unnest($1::bigint[], $2::bigint[], $3::int[], $4::text[], $5::text[], \
                 $6::bigint[], $7::text[], $8::timestamptz[], $9::timestamptz[]) with ordinality \
                 as t(order_id, product_id, quantity, product_title, product_url, \
                      price_cents, price_currency, created_at, updated_at, ord) \
             order by ord \
             returning {ORDER_ITEM_COLUMNS}"
        );

        let mut conn = self.uow.connection().await?;
        let mut rows: Vec<OrderItemRow> = sqlx::query_as(&sql)
            .bind(items.iter().map(|i| i.order_id).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.product_id).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.quantity).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.product_title.clone()).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.product_url.clone()).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.price_cents).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.price_currency.clone()).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.created_at).collect::<Vec<_>>())
            .bind(items.iter().map(|i| i.updated_at).collect::<Vec<_>>())
            .fetch_all(&mut *conn)
            .await?;
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn query(
        &self,
        filter: QueryOrderItemsFilter,
    ) -> Result<Vec<OrderItemRow>, PersistenceError> {
        let mut qb = build_order_items_query(filter);
        let mut conn = self.uow.connection().await?;
        let rows = qb
            .build_query_as::<OrderItemRow>()
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }
}

pub struct PgAuditLogOrderRepository<'a> {
    uow: &'a PgUnitOfWork,
}

impl<'a> PgAuditLogOrderRepository<'a> {
    pub fn new(uow: &'a PgUnitOfWork) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl AuditLogOrderRepository for PgAuditLogOrderRepository<'_> {
    async fn bulk_insert(
        &self,
        logs: Vec<AuditLogOrderRow>,
    ) -> Result<Vec<AuditLogOrderRow>, PersistenceError> {
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "insert into audit_log_order (order_id, order_item_id, customer_id, order_status, \
                 created_at, updated_at) \
             select order_id, order_item_id, customer_id, order_status, created_at, updated_at \
             from unnest($1::bigint[], $2::bigint[], $3::bigint[], $4::text[], \
                 $5::timestamptz[], $6::timestamptz[]) with ordinality \
                 as t(order_id, order_item_id, customer_id, order_status, \
                      created_at, updated_at, ord) \
             order by ord \
             returning {AUDIT_LOG_COLUMNS}"
        );

        let mut conn = self.uow.connection().await?;
        let mut rows: Vec<AuditLogOrderRow> = sqlx::query_as(&sql)
            .bind(logs.iter().map(|l| l.order_id).collect::<Vec<_>>())
            .bind(logs.iter().map(|l| l.order_item_id).collect::<Vec<_>>())
            .bind(logs.iter().map(|l| l.customer_id).collect::<Vec<_>>())
            .bind(logs.iter().map(|l| l.order_status.clone()).collect::<Vec<_>>())
            .bind(logs.iter().map(|l| l.created_at).collect::<Vec<_>>())
            .bind(logs.iter().map(|l| l.updated_at).collect::<Vec<_>>())
            .fetch_all(&mut *conn)
            .await?;
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }
}

// ============================================================================
// Dynamic Query Builders
// ============================================================================

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, has_where: &mut bool) {
    qb.push(if *has_where { " and " } else { " where " });
    *has_where = true;
}

fn push_paging(qb: &mut QueryBuilder<'static, Postgres>, limit: i64, offset: i64) {
    if limit > 0 {
        qb.push(" limit ").push_bind(limit);
    }
    if offset > 0 {
        qb.push(" offset ").push_bind(offset);
    }
}

fn build_orders_query(filter: QueryOrdersFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("select {ORDER_COLUMNS} from orders"));
    let mut has_where = false;

    if !filter.ids.is_empty() {
        push_condition(&mut qb, &mut has_where);
        qb.push("id = any(").push_bind(filter.ids).push(")");
    }
    if !filter.customer_ids.is_empty() {
        push_condition(&mut qb, &mut has_where);
        qb.push("customer_id = any(").push_bind(filter.customer_ids).push(")");
    }

    qb.push(" order by id");
    push_paging(&mut qb, filter.limit, filter.offset);
    if filter.lock_for_update {
        qb.push(" for update");
    }
    qb
}

fn build_order_items_query(filter: QueryOrderItemsFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("select {ORDER_ITEM_COLUMNS} from order_items"));
    let mut has_where = false;

    if !filter.ids.is_empty() {
        push_condition(&mut qb, &mut has_where);
        qb.push("id = any(").push_bind(filter.ids).push(")");
    }
    if !filter.order_ids.is_empty() {
        push_condition(&mut qb, &mut has_where);
        qb.push("order_id = any(").push_bind(filter.order_ids).push(")");
    }

    qb.push(" order by id");
    push_paging(&mut qb, filter.limit, filter.offset);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_query_without_filters() {
        let qb = build_orders_query(QueryOrdersFilter::default());
        assert_eq!(
            qb.sql(),
            format!("select {ORDER_COLUMNS} from orders order by id")
        );
    }

    #[test]
    fn test_orders_query_with_filters_and_lock() {
        let qb = build_orders_query(QueryOrdersFilter {
            ids: vec![1, 2],
            customer_ids: vec![9],
            limit: 10,
            offset: 20,
            lock_for_update: true,
        });
        let sql = qb.sql();

        assert!(sql.contains(" where id = any($1) and customer_id = any($2)"));
        assert!(sql.ends_with(" order by id limit $3 offset $4 for update"));
    }

    #[test]
    fn test_order_items_query_by_order_ids() {
        let qb = build_order_items_query(QueryOrderItemsFilter {
            order_ids: vec![4, 5],
            ..Default::default()
        });
        assert!(qb.sql().ends_with("from order_items where order_id = any($1) order by id"));
    }
}
