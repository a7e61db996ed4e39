//! Operator tools for the dead-letter queue, run from `rread_worker --dead` and `rread_worker --revive <id>`.
use log::*;
use rread_engine::{db_types::FulfillmentJob, JobQueue, JobQueueApi};

use crate::errors::ServerError;

/// One line per dead-lettered job, oldest first, or a note that there are none.
pub async fn dead_letter_report<Q: JobQueue>(queue: &JobQueueApi<Q>) -> Result<String, ServerError> {
    let jobs = queue.dead_letters().await?;
    if jobs.is_empty() {
        return Ok("No dead-lettered jobs.".to_string());
    }
    let mut report = format!("{} dead-lettered job(s):\n", jobs.len());
    for job in &jobs {
        report.push_str(&describe_job(job));
        report.push('\n');
    }
    report.push_str("Revive a job with `rread_worker --revive <id>` once the cause has been fixed.");
    Ok(report)
}

pub fn describe_job(job: &FulfillmentJob) -> String {
    format!(
        "  #{:<6} payment {:<14} {}/{} attempts  {}  {}",
        job.id,
        job.payment_id.as_str(),
        job.attempts,
        job.max_attempts,
        job.updated_at.format("%Y-%m-%d %H:%M:%S"),
        job.last_error.as_deref().unwrap_or("(no error recorded)")
    )
}

/// Puts the job back on the queue with a fresh set of attempts.
pub async fn revive_dead_job<Q: JobQueue>(queue: &JobQueueApi<Q>, job_id: i64) -> Result<FulfillmentJob, ServerError> {
    let job = queue.revive(job_id).await.map_err(|e| {
        warn!("📋️ Job #{job_id} could not be revived. {e}");
        ServerError::from(e)
    })?;
    Ok(job)
}
