use super::ValidationErrors;
use crate::api::dto::{V1CreateAuditLogOrderRequest, V1LogOrder};

pub fn validate_create_audit_log_order(req: &V1CreateAuditLogOrderRequest) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if req.orders.is_empty() {
        errs.insert("orders", "at least one is required");
        return errs;
    }

    for (i, log) in req.orders.iter().enumerate() {
        errs.merge(validate_log_order(log, &format!("orders[{i}]")));
    }

    errs
}

fn validate_log_order(log: &V1LogOrder, prefix: &str) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if log.order_id <= 0 {
        errs.insert(format!("{prefix}.orderId"), "must be greater than 0");
    }
    if log.order_item_id <= 0 {
        errs.insert(format!("{prefix}.orderItemId"), "must be greater than 0");
    }
    if log.customer_id <= 0 {
        errs.insert(format!("{prefix}.customerId"), "must be greater than 0");
    }
    if log.order_status.is_empty() {
        errs.insert(format!("{prefix}.orderStatus"), "required");
    }

    errs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_rejected() {
        let errs = validate_create_audit_log_order(&V1CreateAuditLogOrderRequest::default());
        assert_eq!(errs.get("orders"), Some("at least one is required"));
    }

    #[test]
    fn test_each_entry_checked() {
        let req = V1CreateAuditLogOrderRequest {
            orders: vec![
                V1LogOrder {
                    order_id: 1,
                    order_item_id: 2,
                    customer_id: 3,
                    order_status: "created".to_string(),
                    ..Default::default()
                },
                V1LogOrder {
                    order_id: 1,
                    order_item_id: 0,
                    customer_id: 3,
                    order_status: String::new(),
                    ..Default::default()
                },
            ],
        };
        let errs = validate_create_audit_log_order(&req);

        assert_eq!(errs.len(), 2);
        assert!(errs.contains("orders[1].orderItemId"));
        assert!(errs.contains("orders[1].orderStatus"));
    }
}
