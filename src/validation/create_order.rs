use std::collections::BTreeSet;

use super::ValidationErrors;
use crate::api::dto::{V1CreateOrderRequest, V1Order, V1OrderItem};

pub fn validate_create_order(req: &V1CreateOrderRequest) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if req.orders.is_empty() {
        errs.insert("orders", "at least one order is required");
        return errs;
    }

    for (i, order) in req.orders.iter().enumerate() {
        errs.merge(validate_order(order, &format!("orders[{i}]")));
    }

    errs
}

fn validate_order(order: &V1Order, prefix: &str) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if order.customer_id <= 0 {
        errs.insert(format!("{prefix}.customerId"), "must be greater than 0");
    }
    if order.delivery_address.is_empty() {
        errs.insert(format!("{prefix}.deliveryAddress"), "required");
    }
    if order.total_price_cents <= 0 {
        errs.insert(format!("{prefix}.totalPriceCents"), "must be greater than 0");
    }
    if order.total_price_currency.is_empty() {
        errs.insert(format!("{prefix}.totalPriceCurrency"), "required");
    }

    // Item and sum rules only apply once there is something to sum.
    let Some(first) = order.order_items.first() else {
        errs.insert(format!("{prefix}.orderItems"), "at least one item is required");
        return errs;
    };

    let mut sum: i64 = 0;
    let mut currencies = BTreeSet::new();
    for (j, item) in order.order_items.iter().enumerate() {
        errs.merge(validate_order_item(item, &format!("{prefix}.orderItems[{j}]")));
        sum = sum.saturating_add(item.price_cents.saturating_mul(i64::from(item.quantity)));
        currencies.insert(item.price_currency.as_str());
    }

    // A non-positive total already carries its own message.
    if order.total_price_cents > 0 && sum != order.total_price_cents {
        errs.insert(
            format!("{prefix}.totalPriceCents"),
            "must equal sum of items (priceCents * quantity)",
        );
    }
    if currencies.len() > 1 {
        errs.insert(
            format!("{prefix}.orderItems.priceCurrency"),
            "all items must have the same currency",
        );
    }
    if first.price_currency != order.total_price_currency {
        errs.insert(
            format!("{prefix}.totalPriceCurrency"),
            "must equal items currency",
        );
    }

    errs
}

fn validate_order_item(item: &V1OrderItem, prefix: &str) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if item.product_id <= 0 {
        errs.insert(format!("{prefix}.productId"), "must be greater than 0");
    }
    if item.quantity <= 0 {
        errs.insert(format!("{prefix}.quantity"), "must be greater than 0");
    }
    if item.price_cents <= 0 {
        errs.insert(format!("{prefix}.priceCents"), "must be greater than 0");
    }
    if item.product_title.is_empty() {
        errs.insert(format!("{prefix}.productTitle"), "required");
    }
    if item.price_currency.is_empty() {
        errs.insert(format!("{prefix}.priceCurrency"), "required");
    }

    errs
}
