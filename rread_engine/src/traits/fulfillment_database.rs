use thiserror::Error;

use crate::db_types::{LicenseKey, Order, OrderStatus, PaymentId, Product};

/// The storage operations the fulfilment pipeline depends on.
///
/// Every method runs in its own connection or transaction, and commits or rolls back before returning.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Checks that the database is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Fetches the order whose `external_reference` is the payment id, or a composite `<subject>:<payment id>`
    /// reference. An exact match wins over a composite one.
    async fn fetch_order_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Order>, StoreError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StoreError>;

    /// Reserves a license key of `product_id` for the order, in a single write transaction.
    ///
    /// The lowest-id unsold key is marked as sold and linked to the order. If the order already holds a key (a
    /// duplicate job, or an earlier attempt whose release failed) that key is returned and nothing new is consumed.
    /// Either way the caller becomes one of the key's holders and must either commit the delivery or release the key.
    /// If the pool is empty, [`StoreError::KeysExhausted`] is returned and nothing changes.
    async fn reserve_license_key(&self, order: &Order, product_id: i64) -> Result<LicenseKey, StoreError>;

    /// Gives up the caller's hold on the key. The key returns to the pool once nobody holds it, unless the order has
    /// already been delivered. Returns true if the key went back to the pool.
    async fn release_license_key(&self, order_id: i64, key_id: i64) -> Result<bool, StoreError>;

    /// Records a status the gateway reported for the order's payment, verbatim. Delivered orders are never touched.
    ///
    /// Returns the updated order, or `None` if the order was already delivered.
    async fn update_order_status(&self, order_id: i64, status: &OrderStatus) -> Result<Option<Order>, StoreError>;

    /// Sets the order status to `delivered` if it isn't already.
    ///
    /// When `key_id` is given, the same transaction checks that the key is still sold to this order; if it isn't, the
    /// transaction is rolled back with [`StoreError::KeyNoLongerLinked`].
    ///
    /// Returns `None` if the order was already delivered (a concurrent duplicate got there first).
    async fn mark_order_delivered(&self, order_id: i64, key_id: Option<i64>) -> Result<Option<Order>, StoreError>;

    async fn fetch_license_key_for_order(&self, order_id: i64) -> Result<Option<LicenseKey>, StoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("An order with external reference {0} already exists")]
    OrderAlreadyExists(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderNotFound(i64),
    #[error("The requested product (id {0}) does not exist")]
    ProductNotFound(i64),
    #[error("There are no unsold license keys left for product {0}")]
    KeysExhausted(i64),
    #[error("License key {key_id} is no longer linked to order {order_id}")]
    KeyNoLongerLinked { order_id: i64, key_id: i64 },
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}
