use serde::{Deserialize, Serialize};

use crate::db_types::{FulfillmentJob, LicenseKey, Order};

/// Emitted once per order, when the `delivered` transition commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeliveredEvent {
    pub order: Order,
    pub license_key: Option<LicenseKey>,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order, license_key: Option<LicenseKey>) -> Self {
        Self { order, license_key }
    }
}

/// Emitted every time an approved order cannot be fulfilled because its product's key pool is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysExhaustedEvent {
    pub order: Order,
    pub product_id: i64,
}

impl KeysExhaustedEvent {
    pub fn new(order: Order, product_id: i64) -> Self {
        Self { order, product_id }
    }
}

/// Emitted when a job is dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDeadEvent {
    pub job: FulfillmentJob,
    pub reason: String,
}

impl JobDeadEvent {
    pub fn new<S: Into<String>>(job: FulfillmentJob, reason: S) -> Self {
        Self { job, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderDelivered(OrderDeliveredEvent),
    KeysExhausted(KeysExhaustedEvent),
    JobDead(JobDeadEvent),
}
