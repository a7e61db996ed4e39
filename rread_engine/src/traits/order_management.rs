use crate::{
    db_types::{LicenseKey, NewOrder, NewProduct, Order, Product},
    traits::StoreError,
};

/// Writes that belong to the order-creation and catalogue side of the shop. Fulfilment only ever reads these rows,
/// but the server provisioning tools and the tests need to create them.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Inserts a new order. Fails if the external reference is already taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product, StoreError>;

    /// Adds serials to a product's key pool. Serials that already exist are skipped. Returns the number added.
    async fn add_license_keys(&self, product_id: i64, serials: &[String]) -> Result<u64, StoreError>;

    async fn fetch_license_keys_for_product(&self, product_id: i64) -> Result<Vec<LicenseKey>, StoreError>;

    async fn count_available_keys(&self, product_id: i64) -> Result<i64, StoreError>;
}
