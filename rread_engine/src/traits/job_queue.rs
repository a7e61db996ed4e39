use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{FulfillmentJob, PaymentId, QueueStats};

/// A durable queue of fulfilment jobs with at-least-once semantics.
///
/// A job is `queued` until a worker claims it (`running`). The worker then completes, reschedules or buries it. A
/// `running` job whose worker died is handed back to the queue by [`JobQueue::requeue_stale_jobs`].
#[allow(async_fn_in_trait)]
pub trait JobQueue {
    /// Adds a job for the payment, ready to run immediately.
    async fn enqueue(&self, payment_id: &PaymentId) -> Result<FulfillmentJob, JobQueueError>;

    /// Atomically claims the oldest job that is ready to run at `now`, bumping its attempt counter. No two callers
    /// can claim the same job.
    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<FulfillmentJob>, JobQueueError>;

    async fn complete_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError>;

    /// Puts a running job back on the queue, to be retried at `run_at`.
    async fn reschedule_job(
        &self,
        job_id: i64,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<FulfillmentJob, JobQueueError>;

    /// Moves a job to the dead-letter set.
    async fn bury_job(&self, job_id: i64, error: &str) -> Result<FulfillmentJob, JobQueueError>;

    /// Returns `running` jobs that were claimed before `locked_before` to the queue. Returns the number requeued.
    async fn requeue_stale_jobs(&self, locked_before: DateTime<Utc>) -> Result<u64, JobQueueError>;

    async fn dead_jobs(&self) -> Result<Vec<FulfillmentJob>, JobQueueError>;

    /// Gives a dead job a fresh attempt budget and puts it back on the queue.
    async fn revive_job(&self, job_id: i64) -> Result<FulfillmentJob, JobQueueError>;

    async fn fetch_job(&self, job_id: i64) -> Result<Option<FulfillmentJob>, JobQueueError>;

    async fn queue_stats(&self) -> Result<QueueStats, JobQueueError>;
}

#[derive(Debug, Clone, Error)]
pub enum JobQueueError {
    #[error("Job queue database error: {0}")]
    DatabaseError(String),
    #[error("Job {0} does not exist")]
    JobNotFound(i64),
    #[error("Job {id} cannot move from {from} to {to}")]
    IllegalTransition { id: i64, from: String, to: String },
}

impl From<sqlx::Error> for JobQueueError {
    fn from(e: sqlx::Error) -> Self {
        JobQueueError::DatabaseError(e.to_string())
    }
}
