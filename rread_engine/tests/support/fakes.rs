use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use rread_engine::{
    db_types::{FulfillmentJob, LicenseKey, Order, OrderStatus, PaymentId, Product, QueueStats},
    DeliveryError,
    DeliveryMessage,
    DeliveryNotifier,
    FulfillmentDatabase,
    GatewayError,
    GatewayPayment,
    GatewayStatus,
    JobQueue,
    JobQueueError,
    PaymentGateway,
    SqliteDatabase,
    StoreError,
};

//--------------------------------------       FakeGateway       -------------------------------------------------------
/// A payment gateway that knows the payments it has been told about. Unknown payments get a 404.
#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    payments: Arc<Mutex<HashMap<String, GatewayStatus>>>,
    outages: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl FakeGateway {
    pub fn with_payment(self, payment_id: &str, status: &str) -> Self {
        self.set_status(payment_id, status);
        self
    }

    pub fn set_status(&self, payment_id: &str, status: &str) {
        let mut payments = self.payments.lock().unwrap();
        payments.insert(payment_id.to_string(), GatewayStatus::from(status));
    }

    /// The next `n` calls fail as if the gateway were unreachable.
    pub fn fail_next(&self, n: usize) {
        self.outages.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for FakeGateway {
    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<GatewayPayment, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outage = self.outages.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if outage {
            return Err(GatewayError::Unreachable("connection refused".into()));
        }
        let payments = self.payments.lock().unwrap();
        match payments.get(payment_id.as_str()) {
            Some(status) => {
                let mut payment = GatewayPayment::new(payment_id.clone(), status.clone());
                payment.external_reference = Some(payment_id.to_string());
                Ok(payment)
            },
            None => Err(GatewayError::Rejected { status: 404, message: "Payment not found".into() }),
        }
    }
}

//--------------------------------------    RecordingNotifier    -------------------------------------------------------
/// Records every message it "sends". Can be told to fail a number of times first. Recipients without an `@` are
/// refused the way the mail library refuses them.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<DeliveryMessage>>>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<DeliveryMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl DeliveryNotifier for RecordingNotifier {
    async fn deliver(&self, message: &DeliveryMessage) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !message.recipient.contains('@') {
            return Err(DeliveryError::InvalidAddress(message.recipient.clone()));
        }
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(DeliveryError::Transport("421 service not available".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

//--------------------------------------    StallingNotifier     -------------------------------------------------------
/// The first delivery waits until another delivery has gone out, and then fails. Every later delivery succeeds. This
/// is the interleaving of two duplicate jobs where the slower one hits a mail relay error.
#[derive(Debug, Clone, Default)]
pub struct StallingNotifier {
    sent: Arc<Mutex<Vec<DeliveryMessage>>>,
    calls: Arc<AtomicUsize>,
    other_sent: Arc<Notify>,
}

impl StallingNotifier {
    pub fn sent(&self) -> Vec<DeliveryMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl DeliveryNotifier for StallingNotifier {
    async fn deliver(&self, message: &DeliveryMessage) -> Result<(), DeliveryError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.other_sent.notified().await;
            return Err(DeliveryError::Transport("421 service not available".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        self.other_sent.notify_one();
        Ok(())
    }
}

//--------------------------------------      LaggyDatabase      -------------------------------------------------------
/// Wraps the real database, but pretends the order doesn't exist for the first `hidden` lookups, the way a lagging
/// read replica would.
#[derive(Debug, Clone)]
pub struct LaggyDatabase {
    inner: SqliteDatabase,
    hidden: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
}

impl LaggyDatabase {
    pub fn new(inner: SqliteDatabase, hidden: usize) -> Self {
        Self { inner, hidden: Arc::new(AtomicUsize::new(hidden)), lookups: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &SqliteDatabase {
        &self.inner
    }
}

impl FulfillmentDatabase for LaggyDatabase {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn fetch_order_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Order>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.hidden.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Ok(None);
        }
        self.inner.fetch_order_by_payment_id(payment_id).await
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        self.inner.fetch_product(product_id).await
    }

    async fn reserve_license_key(&self, order: &Order, product_id: i64) -> Result<LicenseKey, StoreError> {
        self.inner.reserve_license_key(order, product_id).await
    }

    async fn release_license_key(&self, order_id: i64, key_id: i64) -> Result<bool, StoreError> {
        self.inner.release_license_key(order_id, key_id).await
    }

    async fn update_order_status(&self, order_id: i64, status: &OrderStatus) -> Result<Option<Order>, StoreError> {
        self.inner.update_order_status(order_id, status).await
    }

    async fn mark_order_delivered(&self, order_id: i64, key_id: Option<i64>) -> Result<Option<Order>, StoreError> {
        self.inner.mark_order_delivered(order_id, key_id).await
    }

    async fn fetch_license_key_for_order(&self, order_id: i64) -> Result<Option<LicenseKey>, StoreError> {
        self.inner.fetch_license_key_for_order(order_id).await
    }
}

impl JobQueue for LaggyDatabase {
    async fn enqueue(&self, payment_id: &PaymentId) -> Result<FulfillmentJob, JobQueueError> {
        self.inner.enqueue(payment_id).await
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<FulfillmentJob>, JobQueueError> {
        self.inner.claim_next_job(now).await
    }

    async fn complete_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError> {
        self.inner.complete_job(job_id).await
    }

    async fn reschedule_job(
        &self,
        job_id: i64,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<FulfillmentJob, JobQueueError> {
        self.inner.reschedule_job(job_id, error, run_at).await
    }

    async fn bury_job(&self, job_id: i64, error: &str) -> Result<FulfillmentJob, JobQueueError> {
        self.inner.bury_job(job_id, error).await
    }

    async fn requeue_stale_jobs(&self, locked_before: DateTime<Utc>) -> Result<u64, JobQueueError> {
        self.inner.requeue_stale_jobs(locked_before).await
    }

    async fn dead_jobs(&self) -> Result<Vec<FulfillmentJob>, JobQueueError> {
        self.inner.dead_jobs().await
    }

    async fn revive_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError> {
        self.inner.revive_job(job_id).await
    }

    async fn fetch_job(&self, job_id: i64) -> Result<Option<FulfillmentJob>, JobQueueError> {
        self.inner.fetch_job(job_id).await
    }

    async fn queue_stats(&self) -> Result<QueueStats, JobQueueError> {
        self.inner.queue_stats().await
    }
}
