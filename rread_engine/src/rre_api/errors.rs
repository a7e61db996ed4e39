use std::fmt::Display;

use thiserror::Error;

use crate::{
    db_types::PaymentId,
    traits::{DeliveryError, GatewayError, StoreError},
};

/// How the queue should treat a failed fulfilment attempt.
///
/// Authentication failures are handled at the ingress and never become jobs, so they have no kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry with back-off: the gateway was unreachable, the order isn't visible yet, the mail relay failed, etc.
    Transient,
    /// The product's key pool is empty. Retried (the pool may be restocked) but alerted on separately.
    ResourceExhausted,
    /// Retrying cannot help: no product, or a recipient address or message the mail library rejects. The job is
    /// dead-lettered immediately.
    Permanent,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::ResourceExhausted => write!(f, "resource-exhausted"),
            ErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("Could not fetch the payment from the gateway. {0}")]
    Gateway(#[from] GatewayError),
    #[error("No order for payment {payment_id} is visible yet (after {attempts} lookups)")]
    OrderNotVisible { payment_id: PaymentId, attempts: u32 },
    #[error("Order #{order_id} is approved but has no product linked to it")]
    NoProductLinked { order_id: i64 },
    #[error("Order #{order_id} refers to product {product_id}, which does not exist")]
    ProductNotFound { order_id: i64, product_id: i64 },
    #[error("No license keys left for product {product_id}; order #{order_id} cannot be fulfilled until restocked")]
    KeysExhausted { order_id: i64, product_id: i64 },
    #[error("Delivery for order #{order_id} failed. {source}")]
    Delivery {
        order_id: i64,
        #[source]
        source: DeliveryError,
    },
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::KeysExhausted { .. } | FulfillmentError::Store(StoreError::KeysExhausted(_)) => {
                ErrorKind::ResourceExhausted
            },
            FulfillmentError::NoProductLinked { .. }
            | FulfillmentError::ProductNotFound { .. }
            | FulfillmentError::Delivery {
                source: DeliveryError::InvalidAddress(_) | DeliveryError::Compose(_), ..
            } => ErrorKind::Permanent,
            FulfillmentError::Gateway(_)
            | FulfillmentError::OrderNotVisible { .. }
            | FulfillmentError::Delivery { .. }
            | FulfillmentError::Store(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Permanent
    }
}
