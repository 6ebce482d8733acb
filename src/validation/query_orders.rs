use super::ValidationErrors;
use crate::api::dto::V1QueryOrdersRequest;

pub const MAX_PAGE_SIZE: i64 = 100;

pub fn validate_query_orders(req: &V1QueryOrdersRequest) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if req.page < 1 {
        errs.insert("page", "must be greater than or equal to 1");
    }
    if req.page_size < 1 {
        errs.insert("pageSize", "must be greater than or equal to 1");
    } else if req.page_size > MAX_PAGE_SIZE {
        errs.insert("pageSize", "must be less than or equal to 100");
    } else if req.page >= 1 && (req.page - 1).checked_mul(req.page_size).is_none() {
        errs.insert("page", "is out of range");
    }

    for (i, id) in req.ids.iter().enumerate() {
        if *id <= 0 {
            errs.insert(format!("ids[{i}]"), "must be greater than 0");
        }
    }
    for (i, id) in req.customer_ids.iter().enumerate() {
        if *id <= 0 {
            errs.insert(format!("customerIds[{i}]"), "must be greater than 0");
        }
    }

    errs
}
