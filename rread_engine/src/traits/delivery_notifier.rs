use rread_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the customer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryContent {
    Download { url: String },
    LicenseKey { serial: String, installer_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMessage {
    pub order_id: i64,
    pub recipient: String,
    pub customer_name: String,
    pub product_name: String,
    pub amount: Money,
    pub content: DeliveryContent,
}

#[allow(async_fn_in_trait)]
pub trait DeliveryNotifier {
    async fn deliver(&self, message: &DeliveryMessage) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("The mail relay is not configured: {0}")]
    NotConfigured(String),
    #[error("Invalid mail address: {0}")]
    InvalidAddress(String),
    #[error("Could not compose the message: {0}")]
    Compose(String),
    #[error("The message could not be sent: {0}")]
    Transport(String),
}
