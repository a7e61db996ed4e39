//! The durable fulfilment queue.
//!
//! Every state change is a single conditional `UPDATE ... RETURNING`, so a job can only be claimed once, and a worker
//! can only complete or reschedule a job that is still `running`.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{FulfillmentJob, JobStatus, PaymentId, QueueStats},
    traits::JobQueueError,
};

pub async fn insert_job(
    payment_id: &PaymentId,
    max_attempts: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentJob, sqlx::Error> {
    let job = sqlx::query_as(
        r#"
            INSERT INTO fulfillment_jobs (payment_id, status, attempts, max_attempts, run_at, created_at, updated_at)
            VALUES ($1, 'queued', 0, $2, $3, $3, $3)
            RETURNING *;
        "#,
    )
    .bind(payment_id.as_str())
    .bind(max_attempts)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(job)
}

pub async fn fetch_job(id: i64, conn: &mut SqliteConnection) -> Result<Option<FulfillmentJob>, sqlx::Error> {
    let job = sqlx::query_as("SELECT * FROM fulfillment_jobs WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(job)
}

/// Claims the oldest job that is due at `now`.
pub async fn claim_next(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Option<FulfillmentJob>, sqlx::Error> {
    let job = sqlx::query_as(
        r#"
            UPDATE fulfillment_jobs SET status = 'running', attempts = attempts + 1, locked_at = $1, updated_at = $1
            WHERE id = (
                SELECT id FROM fulfillment_jobs WHERE status = 'queued' AND run_at <= $1 ORDER BY run_at, id LIMIT 1
            )
            AND status = 'queued'
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(job)
}

pub async fn complete(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<FulfillmentJob, JobQueueError> {
    let job: Option<FulfillmentJob> = sqlx::query_as(
        r#"
            UPDATE fulfillment_jobs SET status = 'done', locked_at = NULL, updated_at = $2
            WHERE id = $1 AND status = 'running'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    match job {
        Some(job) => Ok(job),
        None => Err(transition_error(id, JobStatus::Done, conn).await),
    }
}

pub async fn reschedule(
    id: i64,
    error: &str,
    run_at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentJob, JobQueueError> {
    let job: Option<FulfillmentJob> = sqlx::query_as(
        r#"
            UPDATE fulfillment_jobs SET status = 'queued', locked_at = NULL, run_at = $2, last_error = $3, updated_at = $4
            WHERE id = $1 AND status = 'running'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(run_at)
    .bind(error)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    match job {
        Some(job) => Ok(job),
        None => Err(transition_error(id, JobStatus::Queued, conn).await),
    }
}

pub async fn bury(
    id: i64,
    error: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentJob, JobQueueError> {
    let job: Option<FulfillmentJob> = sqlx::query_as(
        r#"
            UPDATE fulfillment_jobs SET status = 'dead', locked_at = NULL, last_error = $2, updated_at = $3
            WHERE id = $1 AND status IN ('queued', 'running')
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(error)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    match job {
        Some(job) => Ok(job),
        None => Err(transition_error(id, JobStatus::Dead, conn).await),
    }
}

/// Hands jobs whose worker went away back to the queue. They keep their attempt count.
pub async fn requeue_stale(
    locked_before: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE fulfillment_jobs SET status = 'queued', locked_at = NULL, run_at = $2, updated_at = $2
            WHERE status = 'running' AND locked_at < $1;
        "#,
    )
    .bind(locked_before)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn dead_jobs(conn: &mut SqliteConnection) -> Result<Vec<FulfillmentJob>, sqlx::Error> {
    let jobs = sqlx::query_as("SELECT * FROM fulfillment_jobs WHERE status = 'dead' ORDER BY updated_at, id")
        .fetch_all(conn)
        .await?;
    Ok(jobs)
}

pub async fn revive(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<FulfillmentJob, JobQueueError> {
    let job: Option<FulfillmentJob> = sqlx::query_as(
        r#"
            UPDATE fulfillment_jobs SET status = 'queued', attempts = 0, run_at = $2, locked_at = NULL, updated_at = $2
            WHERE id = $1 AND status = 'dead'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    match job {
        Some(job) => Ok(job),
        None => Err(transition_error(id, JobStatus::Queued, conn).await),
    }
}

pub async fn stats(conn: &mut SqliteConnection) -> Result<QueueStats, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM fulfillment_jobs GROUP BY status").fetch_all(conn).await?;
    let mut stats = QueueStats::default();
    for (status, count) in rows {
        match status.as_str() {
            "queued" => stats.queued = count,
            "running" => stats.running = count,
            "done" => stats.done = count,
            "dead" => stats.dead = count,
            s => trace!("📋️ Ignoring unknown job status {s}"),
        }
    }
    Ok(stats)
}

async fn transition_error(id: i64, to: JobStatus, conn: &mut SqliteConnection) -> JobQueueError {
    match fetch_job(id, conn).await {
        Ok(Some(job)) => JobQueueError::IllegalTransition { id, from: job.status.to_string(), to: to.to_string() },
        Ok(None) => JobQueueError::JobNotFound(id),
        Err(e) => e.into(),
    }
}
