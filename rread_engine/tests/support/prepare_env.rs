use log::*;
use rread_engine::{
    db_types::{LicenseKey, Money, NewOrder, NewProduct, Order, Product, ProductKind},
    FulfillmentDatabase,
    OrderManagement,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub fn random_db_path() -> String {
    let path = std::env::temp_dir().join(format!("rread_test_store_{}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}

/// Creates a fresh database with the schema applied.
pub async fn prepare_test_env() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = random_db_path();
    create_database(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub async fn create_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("Error dropping database {url}: {e:?}");
        }
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Could not remove test database {url}: {e}");
    }
}

pub async fn new_download_product(db: &SqliteDatabase) -> Product {
    let product = NewProduct::new(
        "O Guia do Leitor",
        Money::from_cents(2990),
        "https://downloads.example.com/guia-do-leitor.pdf",
        ProductKind::DigitalDownload,
    );
    db.insert_product(product).await.expect("Error creating product")
}

pub async fn new_keyed_product(db: &SqliteDatabase, keys: usize) -> Product {
    let product = NewProduct::new(
        "Leitor Pro",
        Money::from_cents(4990),
        "https://downloads.example.com/leitor-pro-setup.exe",
        ProductKind::KeyedLicense,
    );
    let product = db.insert_product(product).await.expect("Error creating product");
    let serials = (1..=keys).map(|i| format!("LPRO-{:04}-{:04}", product.id, i)).collect::<Vec<_>>();
    let added = db.add_license_keys(product.id, &serials).await.expect("Error adding keys");
    assert_eq!(added, keys as u64);
    product
}

pub async fn new_order(db: &SqliteDatabase, reference: &str, product: &Product) -> Order {
    let order = NewOrder::new(reference, "Ana Souza", format!("ana+{reference}@example.com"), product.price)
        .with_product(product.id);
    db.insert_order(order).await.expect("Error inserting order")
}

pub async fn sold_keys(db: &SqliteDatabase, product_id: i64) -> Vec<LicenseKey> {
    db.fetch_license_keys_for_product(product_id)
        .await
        .expect("Error fetching keys")
        .into_iter()
        .filter(|k| k.sold)
        .collect()
}
