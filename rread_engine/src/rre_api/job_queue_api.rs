use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{FulfillmentJob, PaymentId, QueueStats},
    traits::{JobQueue, JobQueueError},
};

/// The producer side of the fulfilment queue, plus the dead-letter tools operators need.
pub struct JobQueueApi<B> {
    db: B,
}

impl<B> Debug for JobQueueApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobQueueApi")
    }
}

impl<B> JobQueueApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> JobQueueApi<B>
where B: JobQueue
{
    /// Queues a fulfilment job for the payment. Duplicate notifications produce duplicate jobs; the pipeline is
    /// idempotent per order, so that is harmless.
    pub async fn submit_payment(&self, payment_id: &PaymentId) -> Result<FulfillmentJob, JobQueueError> {
        let job = self.db.enqueue(payment_id).await?;
        info!("📋️ Payment {payment_id} queued for fulfilment as job #{}", job.id);
        Ok(job)
    }

    pub async fn stats(&self) -> Result<QueueStats, JobQueueError> {
        self.db.queue_stats().await
    }

    pub async fn dead_letters(&self) -> Result<Vec<FulfillmentJob>, JobQueueError> {
        self.db.dead_jobs().await
    }

    /// Puts a dead-lettered job back on the queue, typically after restocking a key pool.
    pub async fn revive(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError> {
        let job = self.db.revive_job(job_id).await?;
        info!("📋️ Job #{job_id} (payment {}) revived", job.payment_id);
        Ok(job)
    }
}
