//! `SqliteDatabase` is a concrete implementation of a fulfilment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module, including the job queue.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{db_url, jobs, license_keys, new_pool, orders, products};
use crate::{
    db_types::{FulfillmentJob, LicenseKey, NewOrder, NewProduct, Order, OrderStatus, PaymentId, Product, QueueStats},
    traits::{FulfillmentDatabase, JobQueue, JobQueueError, OrderManagement, StoreError},
};

pub const DEFAULT_JOB_MAX_ATTEMPTS: i64 = 8;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    job_max_attempts: i64,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    async fn fetch_order_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_payment_id(payment_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    /// The reservation is the first statement of the transaction, so it takes the write lock before reading anything.
    async fn reserve_license_key(&self, order: &Order, product_id: i64) -> Result<LicenseKey, StoreError> {
        let mut tx = self.pool.begin().await?;
        let reserved =
            license_keys::reserve_next_key(order.id, &order.customer_email, product_id, Utc::now(), &mut tx).await?;
        let key = match reserved {
            Some(key) => {
                debug!("🔑️ Key #{} of product {product_id} reserved for order #{}", key.id, order.id);
                key
            },
            None => match license_keys::hold_key_for_order(order.id, &mut tx).await? {
                Some(key) => {
                    info!("🔑️ Order #{} already holds key #{}. Sharing it with this attempt.", order.id, key.id);
                    key
                },
                None => return Err(StoreError::KeysExhausted(product_id)),
            },
        };
        tx.commit().await?;
        Ok(key)
    }

    async fn release_license_key(&self, order_id: i64, key_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let released = match license_keys::drop_holder(order_id, key_id, &mut tx).await? {
            Some(0) => license_keys::release_key(order_id, key_id, &mut tx).await?,
            Some(left) => {
                debug!("🔑️ Key #{key_id} of order #{order_id} is still held by {left} other attempt(s)");
                false
            },
            None => false,
        };
        tx.commit().await?;
        if released {
            debug!("🔑️ Key #{key_id} released from order #{order_id}");
        }
        Ok(released)
    }

    async fn update_order_status(&self, order_id: i64, status: &OrderStatus) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        match orders::update_status(order_id, status, Utc::now(), &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order #{order_id} is now {status}");
                Ok(Some(order))
            },
            None if orders::order_exists(order_id, &mut conn).await? => Ok(None),
            None => Err(StoreError::OrderNotFound(order_id)),
        }
    }

    async fn mark_order_delivered(&self, order_id: i64, key_id: Option<i64>) -> Result<Option<Order>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::mark_delivered(order_id, Utc::now(), &mut tx).await? {
            Some(order) => order,
            None => {
                if !orders::order_exists(order_id, &mut tx).await? {
                    return Err(StoreError::OrderNotFound(order_id));
                }
                return Ok(None);
            },
        };
        if let Some(key_id) = key_id {
            if !license_keys::is_key_linked(key_id, order_id, &mut tx).await? {
                // dropping the transaction rolls back the status change
                return Err(StoreError::KeyNoLongerLinked { order_id, key_id });
            }
        }
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} marked as delivered");
        Ok(Some(order))
    }

    async fn fetch_license_key_for_order(&self, order_id: i64) -> Result<Option<LicenseKey>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let key = license_keys::fetch_key_for_order(order_id, &mut conn).await?;
        Ok(key)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(id, &mut conn).await?;
        Ok(order)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::insert_product(product, &mut conn).await?;
        debug!("🗃️ Product #{} ({}) created", product.id, product.kind);
        Ok(product)
    }

    async fn add_license_keys(&self, product_id: i64, serials: &[String]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let added = license_keys::insert_keys(product_id, serials, &mut tx).await?;
        if products::fetch_product(product_id, &mut tx).await?.is_none() {
            return Err(StoreError::ProductNotFound(product_id));
        }
        tx.commit().await?;
        info!("🔑️ {added} license keys added to product {product_id}");
        Ok(added)
    }

    async fn fetch_license_keys_for_product(&self, product_id: i64) -> Result<Vec<LicenseKey>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let keys = license_keys::fetch_keys_for_product(product_id, &mut conn).await?;
        Ok(keys)
    }

    async fn count_available_keys(&self, product_id: i64) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let count = license_keys::count_available(product_id, &mut conn).await?;
        Ok(count)
    }
}

impl JobQueue for SqliteDatabase {
    async fn enqueue(&self, payment_id: &PaymentId) -> Result<FulfillmentJob, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::insert_job(payment_id, self.job_max_attempts, Utc::now(), &mut conn).await?;
        trace!("📋️ Job #{} queued for payment {payment_id}", job.id);
        Ok(job)
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<FulfillmentJob>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::claim_next(now, &mut conn).await?;
        Ok(job)
    }

    async fn complete_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::complete(job_id, Utc::now(), &mut conn).await
    }

    async fn reschedule_job(
        &self,
        job_id: i64,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<FulfillmentJob, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::reschedule(job_id, error, run_at, Utc::now(), &mut conn).await
    }

    async fn bury_job(&self, job_id: i64, error: &str) -> Result<FulfillmentJob, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::bury(job_id, error, Utc::now(), &mut conn).await
    }

    async fn requeue_stale_jobs(&self, locked_before: DateTime<Utc>) -> Result<u64, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let count = jobs::requeue_stale(locked_before, Utc::now(), &mut conn).await?;
        Ok(count)
    }

    async fn dead_jobs(&self) -> Result<Vec<FulfillmentJob>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let jobs = jobs::dead_jobs(&mut conn).await?;
        Ok(jobs)
    }

    async fn revive_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::revive(job_id, Utc::now(), &mut conn).await
    }

    async fn fetch_job(&self, job_id: i64) -> Result<Option<FulfillmentJob>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::fetch_job(job_id, &mut conn).await?;
        Ok(job)
    }

    async fn queue_stats(&self) -> Result<QueueStats, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let stats = jobs::stats(&mut conn).await?;
        Ok(stats)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, job_max_attempts: DEFAULT_JOB_MAX_ATTEMPTS })
    }

    /// Sets the attempt budget given to newly enqueued jobs.
    pub fn with_job_max_attempts(mut self, max_attempts: i64) -> Self {
        self.job_max_attempts = max_attempts.max(1);
        self
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
