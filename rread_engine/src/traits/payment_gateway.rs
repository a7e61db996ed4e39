use std::fmt::Display;

use chrono::{DateTime, Utc};
use rread_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::PaymentId;

/// The authoritative state of a payment, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayStatus {
    Approved,
    /// Any other status, verbatim (`pending`, `rejected`, `in_process`, ...)
    NotApproved(String),
}

impl GatewayStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, GatewayStatus::Approved)
    }
}

impl From<&str> for GatewayStatus {
    fn from(value: &str) -> Self {
        match value {
            "approved" => GatewayStatus::Approved,
            s => GatewayStatus::NotApproved(s.to_string()),
        }
    }
}

impl Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Approved => f.write_str("approved"),
            GatewayStatus::NotApproved(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub payment_id: PaymentId,
    pub status: GatewayStatus,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub amount: Option<Money>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl GatewayPayment {
    pub fn new(payment_id: PaymentId, status: GatewayStatus) -> Self {
        Self { payment_id, status, status_detail: None, external_reference: None, amount: None, approved_at: None }
    }
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<GatewayPayment, GatewayError>;
}

/// All gateway errors are transient from the pipeline's point of view: the job is retried later.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The payment gateway could not be reached: {0}")]
    Unreachable(String),
    #[error("The payment gateway returned status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("The payment gateway returned an invalid response: {0}")]
    InvalidResponse(String),
}
