use chrono::{DateTime, Utc};

use crate::messaging::{Delivery, DeliveryTag};

/// One buffered delivery. Lives until its batch is settled.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInfo {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl From<Delivery> for MessageInfo {
    fn from(delivery: Delivery) -> Self {
        Self {
            tag: delivery.tag,
            body: delivery.body,
            received_at: Utc::now(),
        }
    }
}
