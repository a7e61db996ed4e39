//! The queue consumer.
//!
//! Each worker loops: hand back jobs whose lease has expired, claim the next ready job, run the fulfilment pipeline,
//! then complete, reschedule (with exponential back-off) or bury the job. Any number of workers, in any number of
//! processes, can share one queue.
use std::time::Duration;

use chrono::Utc;
use log::*;
use tokio::sync::watch;

use crate::{
    db_types::FulfillmentJob,
    events::{EventProducers, JobDeadEvent},
    rre_api::{
        errors::{ErrorKind, FulfillmentError},
        fulfillment_api::{FulfillmentApi, FulfillmentOutcome, LookupPolicy},
    },
    traits::{DeliveryNotifier, FulfillmentDatabase, JobQueue, JobQueueError, PaymentGateway},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(5), max_delay: Duration::from_secs(600) }
    }
}

impl BackoffPolicy {
    /// `base_delay * 2^(attempts - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempts: i64) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 31) as u32;
        self.base_delay.saturating_mul(2u32.saturating_pow(exponent)).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// How long to sleep when the queue is empty
    pub poll_interval: Duration,
    /// How long a claimed job may run before another worker may take it over
    pub lease: Duration,
    pub backoff: BackoffPolicy,
    pub lookup: LookupPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
            lookup: LookupPolicy::default(),
        }
    }
}

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResolution {
    Completed(FulfillmentOutcome),
    Rescheduled { kind: ErrorKind, error: String, retry_in: Duration },
    Buried { kind: ErrorKind, error: String },
}

pub struct FulfillmentWorker<B, G, N> {
    name: String,
    queue: B,
    api: FulfillmentApi<B, G, N>,
    producers: EventProducers,
    config: WorkerConfig,
}

impl<B, G, N> FulfillmentWorker<B, G, N>
where
    B: FulfillmentDatabase + JobQueue,
    G: PaymentGateway,
    N: DeliveryNotifier,
{
    pub fn new<S: Into<String>>(
        name: S,
        db: B,
        gateway: G,
        notifier: N,
        producers: EventProducers,
        config: WorkerConfig,
    ) -> Self {
        let api =
            FulfillmentApi::new(db.clone(), gateway, notifier, producers.clone()).with_lookup_policy(config.lookup);
        Self { name: name.into(), queue: db, api, producers, config }
    }

    pub fn api(&self) -> &FulfillmentApi<B, G, N> {
        &self.api
    }

    /// Processes jobs until `shutdown` becomes `true` (or its sender is dropped). A job that is in progress when the
    /// signal arrives is finished first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("🕰️ Fulfilment worker {} started", self.name);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!("🕰️ [{}] Job queue error: {e}", self.name);
                    true
                },
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {},
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    },
                }
            }
        }
        info!("🕰️ Fulfilment worker {} stopped", self.name);
    }

    /// Claims and processes at most one job. Returns `None` if no job was ready.
    pub async fn run_once(&self) -> Result<Option<(FulfillmentJob, JobResolution)>, JobQueueError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.config.lease).unwrap_or_else(|_| chrono::Duration::hours(1));
        let requeued = self.queue.requeue_stale_jobs(now - lease).await?;
        if requeued > 0 {
            warn!("🕰️ [{}] {requeued} jobs outlived their lease and were put back on the queue", self.name);
        }
        let job = match self.queue.claim_next_job(now).await? {
            Some(job) => job,
            None => return Ok(None),
        };
        debug!(
            "🕰️ [{}] Claimed job #{} for payment {} (attempt {}/{})",
            self.name, job.id, job.payment_id, job.attempts, job.max_attempts
        );
        let resolution = self.resolve(&job, self.api.process_payment(&job.payment_id).await);
        let job = self.apply(job, &resolution).await?;
        Ok(Some((job, resolution)))
    }

    fn resolve(&self, job: &FulfillmentJob, result: Result<FulfillmentOutcome, FulfillmentError>) -> JobResolution {
        let err = match result {
            Ok(outcome) => return JobResolution::Completed(outcome),
            Err(e) => e,
        };
        let kind = err.kind();
        let error = err.to_string();
        if kind == ErrorKind::Permanent || job.attempts_exhausted() {
            return JobResolution::Buried { kind, error };
        }
        let retry_in = self.config.backoff.delay_for(job.attempts);
        match kind {
            ErrorKind::ResourceExhausted => error!(
                "🕰️ [{}] Job #{} blocked on an empty key pool. Retrying in {}s. {error}",
                self.name,
                job.id,
                retry_in.as_secs()
            ),
            _ => warn!("🕰️ [{}] Job #{} failed. Retrying in {}s. {error}", self.name, job.id, retry_in.as_secs()),
        }
        JobResolution::Rescheduled { kind, error, retry_in }
    }

    async fn apply(&self, job: FulfillmentJob, resolution: &JobResolution) -> Result<FulfillmentJob, JobQueueError> {
        match resolution {
            JobResolution::Completed(_) => {
                let job = self.queue.complete_job(job.id).await?;
                debug!("🕰️ [{}] Job #{} done", self.name, job.id);
                Ok(job)
            },
            JobResolution::Rescheduled { error, retry_in, .. } => {
                let delay = chrono::Duration::from_std(*retry_in).unwrap_or_else(|_| chrono::Duration::hours(1));
                self.queue.reschedule_job(job.id, error, Utc::now() + delay).await
            },
            JobResolution::Buried { kind, error } => {
                let job = self.queue.bury_job(job.id, error).await?;
                error!(
                    "🕰️ [{}] Job #{} for payment {} is dead after {} attempts ({kind} error). Manual action is needed. \
                     {error}",
                    self.name, job.id, job.payment_id, job.attempts
                );
                self.producers.job_dead(JobDeadEvent::new(job.clone(), error.clone())).await;
                Ok(job)
            },
        }
    }
}
