use chrono::{DateTime, Utc};
use mockall::mock;
use rread_engine::{
    db_types::{FulfillmentJob, JobStatus, LicenseKey, Order, OrderStatus, PaymentId, Product, QueueStats},
    FulfillmentDatabase,
    JobQueue,
    JobQueueError,
    StoreError,
};

mock! {
    pub Store {}
    impl Clone for Store {
        fn clone(&self) -> Self;
    }
    impl FulfillmentDatabase for Store {
        fn url(&self) -> &str;
        async fn ping(&self) -> Result<(), StoreError>;
        async fn fetch_order_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Order>, StoreError>;
        async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StoreError>;
        async fn reserve_license_key(&self, order: &Order, product_id: i64) -> Result<LicenseKey, StoreError>;
        async fn release_license_key(&self, order_id: i64, key_id: i64) -> Result<bool, StoreError>;
        async fn update_order_status(&self, order_id: i64, status: &OrderStatus) -> Result<Option<Order>, StoreError>;
        async fn mark_order_delivered(&self, order_id: i64, key_id: Option<i64>) -> Result<Option<Order>, StoreError>;
        async fn fetch_license_key_for_order(&self, order_id: i64) -> Result<Option<LicenseKey>, StoreError>;
    }
}

mock! {
    pub Queue {}
    impl JobQueue for Queue {
        async fn enqueue(&self, payment_id: &PaymentId) -> Result<FulfillmentJob, JobQueueError>;
        async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<FulfillmentJob>, JobQueueError>;
        async fn complete_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError>;
        async fn reschedule_job(&self, job_id: i64, error: &str, run_at: DateTime<Utc>) -> Result<FulfillmentJob, JobQueueError>;
        async fn bury_job(&self, job_id: i64, error: &str) -> Result<FulfillmentJob, JobQueueError>;
        async fn requeue_stale_jobs(&self, locked_before: DateTime<Utc>) -> Result<u64, JobQueueError>;
        async fn dead_jobs(&self) -> Result<Vec<FulfillmentJob>, JobQueueError>;
        async fn revive_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError>;
        async fn fetch_job(&self, job_id: i64) -> Result<Option<FulfillmentJob>, JobQueueError>;
        async fn queue_stats(&self) -> Result<QueueStats, JobQueueError>;
    }
}

/// A freshly queued job, as `enqueue` would return it
pub fn queued_job(id: i64, payment_id: &PaymentId) -> FulfillmentJob {
    let now = Utc::now();
    FulfillmentJob {
        id,
        payment_id: payment_id.clone(),
        status: JobStatus::Queued,
        attempts: 0,
        max_attempts: 8,
        run_at: now,
        locked_at: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}
