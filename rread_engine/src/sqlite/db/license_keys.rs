use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::LicenseKey;

/// Marks the lowest-id unsold key of the product as sold to the order, in one statement. The caller becomes the key's
/// only holder.
///
/// Nothing is reserved if the order already holds a key. Returns `None` if no key was reserved, either because the
/// pool is empty or because the order already has one.
pub async fn reserve_next_key(
    order_id: i64,
    buyer_email: &str,
    product_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<LicenseKey>, sqlx::Error> {
    let key = sqlx::query_as(
        r#"
            UPDATE license_keys SET sold = 1, sold_at = $1, order_id = $2, buyer_email = $3, holders = 1
            WHERE id = (
                SELECT id FROM license_keys WHERE product_id = $4 AND sold = 0 ORDER BY id LIMIT 1
            )
            AND NOT EXISTS (SELECT 1 FROM license_keys WHERE order_id = $2)
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(order_id)
    .bind(buyer_email)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(key)
}

/// Adds a holder to the key the order already owns, if any.
pub async fn hold_key_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<LicenseKey>, sqlx::Error> {
    let key = sqlx::query_as(
        "UPDATE license_keys SET holders = holders + 1 WHERE order_id = $1 AND sold = 1 RETURNING *",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(key)
}

pub async fn fetch_key_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<LicenseKey>, sqlx::Error> {
    let key =
        sqlx::query_as("SELECT * FROM license_keys WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(key)
}

/// Drops one holder from the order's key. Returns the number of holders left, or `None` if the order does not hold
/// the key.
pub async fn drop_holder(order_id: i64, key_id: i64, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let holders = sqlx::query_scalar(
        r#"
            UPDATE license_keys SET holders = max(holders - 1, 0)
            WHERE id = $2 AND order_id = $1 AND sold = 1
            RETURNING holders;
        "#,
    )
    .bind(order_id)
    .bind(key_id)
    .fetch_optional(conn)
    .await?;
    Ok(holders)
}

/// Returns the key to the pool, unless someone still holds it or the order it is linked to has been delivered.
pub async fn release_key(order_id: i64, key_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE license_keys SET sold = 0, sold_at = NULL, order_id = NULL, buyer_email = NULL, holders = 0
            WHERE id = $2 AND order_id = $1 AND holders = 0
            AND NOT EXISTS (SELECT 1 FROM orders WHERE id = $1 AND status = 'delivered');
        "#,
    )
    .bind(order_id)
    .bind(key_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn is_key_linked(key_id: i64, order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM license_keys WHERE id = $1 AND order_id = $2 AND sold = 1")
            .bind(key_id)
            .bind(order_id)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

/// Adds serials to the pool. Duplicates are ignored.
pub async fn insert_keys(product_id: i64, serials: &[String], conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let now = Utc::now();
    let mut added = 0;
    for serial in serials {
        let result =
            sqlx::query("INSERT OR IGNORE INTO license_keys (product_id, serial, created_at) VALUES ($1, $2, $3)")
                .bind(product_id)
                .bind(serial.trim())
                .bind(now)
                .execute(&mut *conn)
                .await?;
        added += result.rows_affected();
    }
    trace!("🔑️ {added} of {} keys added to product {product_id}", serials.len());
    Ok(added)
}

pub async fn fetch_keys_for_product(
    product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LicenseKey>, sqlx::Error> {
    let keys = sqlx::query_as("SELECT * FROM license_keys WHERE product_id = $1 ORDER BY id")
        .bind(product_id)
        .fetch_all(conn)
        .await?;
    Ok(keys)
}

pub async fn count_available(product_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM license_keys WHERE product_id = $1 AND sold = 0")
        .bind(product_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
