use super::ValidationErrors;
use crate::api::dto::V1UpdateOrdersStatusRequest;
use crate::domain::order::OrderStatus;

pub fn validate_update_orders_status(req: &V1UpdateOrdersStatusRequest) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if req.order_ids.is_empty() {
        errs.insert("order_ids", "at least one is required");
    }
    if req.new_status.parse::<OrderStatus>().is_err() {
        errs.insert("new_status", "unknown status");
    }
    for (i, id) in req.order_ids.iter().enumerate() {
        if *id <= 0 {
            errs.insert(format!("order_ids[{i}]"), "must be greater than 0");
        }
    }

    errs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let req = V1UpdateOrdersStatusRequest {
            order_ids: vec![1, 2],
            new_status: "processing".to_string(),
        };
        assert!(validate_update_orders_status(&req).is_empty());
    }

    #[test]
    fn test_unknown_status_and_bad_ids() {
        let req = V1UpdateOrdersStatusRequest {
            order_ids: vec![5, 0],
            new_status: "shipped".to_string(),
        };
        let errs = validate_update_orders_status(&req);

        assert_eq!(errs.get("new_status"), Some("unknown status"));
        assert!(errs.contains("order_ids[1]"));
    }

    #[test]
    fn test_empty_ids_rejected() {
        let req = V1UpdateOrdersStatusRequest {
            order_ids: vec![],
            new_status: "completed".to_string(),
        };
        assert!(validate_update_orders_status(&req).contains("order_ids"));
    }
}
