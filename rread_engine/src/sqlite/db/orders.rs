use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderStatus, PaymentId},
    traits::StoreError,
};

/// Inserts a new order. The external reference is unique, so a second insert for the same payment fails with
/// [`StoreError::OrderAlreadyExists`].
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let reference = order.external_reference.clone();
    let result = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (
                external_reference,
                customer_name,
                customer_email,
                customer_phone,
                amount,
                original_amount,
                status,
                product_id,
                vendor_id,
                coupon_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *;
        "#,
    )
    .bind(order.external_reference)
    .bind(order.customer_name)
    .bind(order.customer_email)
    .bind(order.customer_phone)
    .bind(order.amount)
    .bind(order.original_amount)
    .bind(order.status.to_string())
    .bind(order.product_id)
    .bind(order.vendor_id)
    .bind(order.coupon_id)
    .bind(order.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => {
            debug!("🗃️ Order [{}] inserted with id {}", order.external_reference, order.id);
            Ok(order)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::OrderAlreadyExists(reference)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the order for the payment. Matches `external_reference = payment_id` first, then a composite reference
/// ending in `:<payment_id>`.
pub async fn fetch_order_by_payment_id(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let suffix = format!(":{payment_id}");
    let order = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE external_reference = $1
               OR (length(external_reference) > length($2) AND substr(external_reference, -length($2)) = $2)
            ORDER BY external_reference = $1 DESC, id
            LIMIT 1
        "#,
    )
    .bind(payment_id.as_str())
    .bind(suffix)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Stores an interim status. Delivered orders keep their status.
pub async fn update_status(
    order_id: i64,
    status: &OrderStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = $2, updated_at = $3
            WHERE id = $1 AND status <> 'delivered'
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(status.as_str())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Moves the order to `delivered`. Returns `None` if it was already delivered, so that only one caller ever wins the
/// transition.
pub async fn mark_delivered(
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'delivered', updated_at = $2
            WHERE id = $1 AND status <> 'delivered'
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn order_exists(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE id = $1").bind(order_id).fetch_one(conn).await?;
    Ok(count > 0)
}
