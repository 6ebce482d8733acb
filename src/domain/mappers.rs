use chrono::{DateTime, Utc};

use super::audit_log::{AuditLogOrder, NewAuditLogOrder};
use super::order::{
    NewOrder, NewOrderItem, Order, OrderCreatedItemMessage, OrderCreatedMessage, OrderError,
    OrderItem, OrderStatus, OrderStatusChangedMessage, QueryOrderItemsModel,
};
use crate::api::dto::{V1LogOrder, V1Order, V1OrderItem, V1QueryOrdersRequest};
use crate::persistence::{AuditLogOrderRow, OrderItemRow, OrderRow};

// ============================================================================
// Mappers - DTO <-> domain <-> row <-> message
// ============================================================================

// === DTO -> domain ===

pub fn new_order_from_dto(dto: &V1Order) -> NewOrder {
    NewOrder {
        customer_id: dto.customer_id,
        delivery_address: dto.delivery_address.clone(),
        total_price_cents: dto.total_price_cents,
        total_price_currency: dto.total_price_currency.clone(),
        order_items: dto.order_items.iter().map(new_order_item_from_dto).collect(),
    }
}

fn new_order_item_from_dto(dto: &V1OrderItem) -> NewOrderItem {
    NewOrderItem {
        product_id: dto.product_id,
        quantity: dto.quantity,
        product_title: dto.product_title.clone(),
        product_url: dto.product_url.clone(),
        price_cents: dto.price_cents,
        price_currency: dto.price_currency.clone(),
    }
}

pub fn order_from_dto(dto: &V1Order) -> Result<Order, OrderError> {
    Ok(Order {
        id: dto.id,
        customer_id: dto.customer_id,
        delivery_address: dto.delivery_address.clone(),
        total_price_cents: dto.total_price_cents,
        total_price_currency: dto.total_price_currency.clone(),
        status: dto.status.parse()?,
        created_at: dto.created_at,
        updated_at: dto.updated_at,
        order_items: dto.order_items.iter().map(order_item_from_dto).collect(),
    })
}

fn order_item_from_dto(dto: &V1OrderItem) -> OrderItem {
    OrderItem {
        id: dto.id,
        order_id: dto.order_id,
        product_id: dto.product_id,
        quantity: dto.quantity,
        product_title: dto.product_title.clone(),
        product_url: dto.product_url.clone(),
        price_cents: dto.price_cents,
        price_currency: dto.price_currency.clone(),
        created_at: dto.created_at,
        updated_at: dto.updated_at,
    }
}

pub fn query_from_dto(dto: &V1QueryOrdersRequest) -> QueryOrderItemsModel {
    QueryOrderItemsModel {
        ids: dto.ids.clone(),
        customer_ids: dto.customer_ids.clone(),
        page: dto.page,
        page_size: dto.page_size,
        include_order_items: dto.include_order_items,
    }
}

pub fn new_audit_log_from_dto(dto: &V1LogOrder) -> Result<NewAuditLogOrder, OrderError> {
    Ok(NewAuditLogOrder {
        order_id: dto.order_id,
        order_item_id: dto.order_item_id,
        customer_id: dto.customer_id,
        order_status: dto.order_status.parse()?,
    })
}

// === domain -> DTO ===

pub fn order_to_dto(order: &Order) -> V1Order {
    V1Order {
        id: order.id,
        customer_id: order.customer_id,
        delivery_address: order.delivery_address.clone(),
        total_price_cents: order.total_price_cents,
        total_price_currency: order.total_price_currency.clone(),
        status: order.status.to_string(),
        created_at: order.created_at,
        updated_at: order.updated_at,
        order_items: order.order_items.iter().map(order_item_to_dto).collect(),
    }
}

fn order_item_to_dto(item: &OrderItem) -> V1OrderItem {
    V1OrderItem {
        id: item.id,
        order_id: item.order_id,
        product_id: item.product_id,
        quantity: item.quantity,
        product_title: item.product_title.clone(),
        product_url: item.product_url.clone(),
        price_cents: item.price_cents,
        price_currency: item.price_currency.clone(),
        created_at: item.created_at,
        updated_at: item.updated_at,
    }
}

pub fn audit_log_to_dto(log: &AuditLogOrder) -> V1LogOrder {
    V1LogOrder {
        id: log.id,
        order_id: log.order_id,
        order_item_id: log.order_item_id,
        customer_id: log.customer_id,
        order_status: log.order_status.to_string(),
        created_at: log.created_at,
        updated_at: log.updated_at,
    }
}

// === domain <-> row ===

pub fn new_order_to_row(order: &NewOrder, now: DateTime<Utc>) -> OrderRow {
    OrderRow {
        id: 0,
        customer_id: order.customer_id,
        delivery_address: order.delivery_address.clone(),
        total_price_cents: order.total_price_cents,
        total_price_currency: order.total_price_currency.clone(),
        status: OrderStatus::Created.to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn new_order_item_to_row(item: &NewOrderItem, order_id: i64, now: DateTime<Utc>) -> OrderItemRow {
    OrderItemRow {
        id: 0,
        order_id,
        product_id: item.product_id,
        quantity: item.quantity,
        product_title: item.product_title.clone(),
        product_url: item.product_url.clone(),
        price_cents: item.price_cents,
        price_currency: item.price_currency.clone(),
        created_at: now,
        updated_at: now,
    }
}

pub fn order_to_row(order: &Order) -> OrderRow {
    OrderRow {
        id: order.id,
        customer_id: order.customer_id,
        delivery_address: order.delivery_address.clone(),
        total_price_cents: order.total_price_cents,
        total_price_currency: order.total_price_currency.clone(),
        status: order.status.to_string(),
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

pub fn order_item_to_row(item: &OrderItem) -> OrderItemRow {
    OrderItemRow {
        id: item.id,
        order_id: item.order_id,
        product_id: item.product_id,
        quantity: item.quantity,
        product_title: item.product_title.clone(),
        product_url: item.product_url.clone(),
        price_cents: item.price_cents,
        price_currency: item.price_currency.clone(),
        created_at: item.created_at,
        updated_at: item.updated_at,
    }
}

pub fn order_from_row(row: OrderRow, order_items: Vec<OrderItem>) -> Result<Order, OrderError> {
    Ok(Order {
        id: row.id,
        customer_id: row.customer_id,
        delivery_address: row.delivery_address,
        total_price_cents: row.total_price_cents,
        total_price_currency: row.total_price_currency,
        status: row.status.parse()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
        order_items,
    })
}

pub fn order_item_from_row(row: OrderItemRow) -> OrderItem {
    OrderItem {
        id: row.id,
        order_id: row.order_id,
        product_id: row.product_id,
        quantity: row.quantity,
        product_title: row.product_title,
        product_url: row.product_url,
        price_cents: row.price_cents,
        price_currency: row.price_currency,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Join order rows with their item rows, keeping the order-row order.
pub fn orders_from_rows(
    orders: Vec<OrderRow>,
    items: Vec<OrderItemRow>,
) -> Result<Vec<Order>, OrderError> {
    let mut by_order: std::collections::HashMap<i64, Vec<OrderItem>> =
        std::collections::HashMap::new();
    for item in items {
        by_order
            .entry(item.order_id)
            .or_default()
            .push(order_item_from_row(item));
    }

    orders
        .into_iter()
        .map(|row| {
            let items = by_order.remove(&row.id).unwrap_or_default();
            order_from_row(row, items)
        })
        .collect()
}

pub fn new_audit_log_to_row(log: &NewAuditLogOrder, now: DateTime<Utc>) -> AuditLogOrderRow {
    AuditLogOrderRow {
        id: 0,
        order_id: log.order_id,
        order_item_id: log.order_item_id,
        customer_id: log.customer_id,
        order_status: log.order_status.to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn audit_log_from_row(row: AuditLogOrderRow) -> Result<AuditLogOrder, OrderError> {
    Ok(AuditLogOrder {
        id: row.id,
        order_id: row.order_id,
        order_item_id: row.order_item_id,
        customer_id: row.customer_id,
        order_status: row.order_status.parse()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// === domain -> message ===

pub fn order_to_created_message(order: &Order) -> OrderCreatedMessage {
    OrderCreatedMessage {
        id: order.id,
        customer_id: order.customer_id,
        delivery_address: order.delivery_address.clone(),
        total_price_cents: order.total_price_cents,
        total_price_curr: order.total_price_currency.clone(),
        created_at: order.created_at,
        updated_at: order.updated_at,
        order_items: order
            .order_items
            .iter()
            .map(|item| OrderCreatedItemMessage {
                id: item.id,
                order_id: item.order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                product_title: item.product_title.clone(),
                product_url: item.product_url.clone(),
                price_cents: item.price_cents,
                price_currency: item.price_currency.clone(),
                created_at: item.created_at,
                updated_at: item.updated_at,
            })
            .collect(),
    }
}

pub fn order_to_status_changed_message(order: &Order) -> OrderStatusChangedMessage {
    OrderStatusChangedMessage {
        order_id: order.id,
        customer_id: order.customer_id,
        order_status: order.status.to_string(),
    }
}
