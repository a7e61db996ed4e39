use rread_engine::{
    db_types::{FulfillmentJob, JobStatus, PaymentId},
    JobQueueApi,
    JobQueueError,
};

use super::mocks::{queued_job, MockQueue};
use crate::{
    dead_letters::{dead_letter_report, revive_dead_job},
    errors::ServerError,
};

fn dead_job(id: i64, payment_id: i64, error: &str) -> FulfillmentJob {
    let mut job = queued_job(id, &PaymentId::from(payment_id));
    job.status = JobStatus::Dead;
    job.attempts = 8;
    job.last_error = Some(error.to_string());
    job
}

#[tokio::test]
async fn dead_jobs_are_listed_with_their_last_error() {
    let mut queue = MockQueue::new();
    queue.expect_dead_jobs().times(1).returning(|| {
        Ok(vec![
            dead_job(12, 900123, "No license keys left for product 2"),
            dead_job(15, 900555, "Invalid mail address: ana.example.com"),
        ])
    });
    let report = dead_letter_report(&JobQueueApi::new(queue)).await.expect("Report failed");
    let lines = report.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4, "{report}");
    assert_eq!(lines[0], "2 dead-lettered job(s):");
    assert!(lines[1].contains("#12") && lines[1].contains("900123") && lines[1].contains("8/8"), "{}", lines[1]);
    assert!(lines[1].ends_with("No license keys left for product 2"));
    assert!(lines[2].contains("#15") && lines[2].ends_with("Invalid mail address: ana.example.com"));
    assert!(lines[3].contains("--revive"));
}

#[tokio::test]
async fn empty_dead_letter_queue() {
    let mut queue = MockQueue::new();
    queue.expect_dead_jobs().times(1).returning(|| Ok(vec![]));
    let report = dead_letter_report(&JobQueueApi::new(queue)).await.expect("Report failed");
    assert_eq!(report, "No dead-lettered jobs.");
}

#[tokio::test]
async fn revive_puts_the_job_back_on_the_queue() {
    let mut queue = MockQueue::new();
    queue
        .expect_revive_job()
        .withf(|id| *id == 12)
        .times(1)
        .returning(|id| Ok(queued_job(id, &PaymentId::from(900123))));
    let job = revive_dead_job(&JobQueueApi::new(queue), 12).await.expect("Revive failed");
    assert_eq!(job.id, 12);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 0);
}

#[tokio::test]
async fn only_dead_jobs_can_be_revived() {
    let mut queue = MockQueue::new();
    queue.expect_revive_job().times(1).returning(|id| {
        Err(JobQueueError::IllegalTransition { id, from: "done".into(), to: "queued".into() })
    });
    let err = revive_dead_job(&JobQueueApi::new(queue), 3).await.expect_err("A finished job was revived");
    assert!(matches!(&err, ServerError::BackendError(msg) if msg.contains("cannot move from done")), "{err}");
}
