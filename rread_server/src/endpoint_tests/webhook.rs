use actix_web::http::StatusCode;
use rread_engine::JobQueueError;

use super::{
    helpers::{post_webhook, post_webhook_from, signed_headers, webhook_config, PEER, REQUEST_ID, TS},
    mocks::{queued_job, MockQueue},
};
use crate::config::ServerConfig;

const URI: &str = "/api/webhook?data.id=900123&type=payment";
const BODY: &str = r#"{"action":"payment.updated","type":"payment","data":{"id":"900123"}}"#;

fn expect_one_job(payment_id: &'static str) -> MockQueue {
    let mut queue = MockQueue::new();
    queue
        .expect_enqueue()
        .withf(move |id| id.as_str() == payment_id)
        .times(1)
        .returning(|id| Ok(queued_job(1, id)));
    queue
}

fn expect_no_jobs() -> MockQueue {
    let mut queue = MockQueue::new();
    queue.expect_enqueue().never();
    queue
}

#[actix_web::test]
async fn signed_payment_notification_is_queued() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_webhook(expect_one_job("900123"), true, URI, signed_headers("900123"), BODY).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Notification received."}"#);
}

#[actix_web::test]
async fn numeric_payment_ids_are_accepted() {
    let _ = env_logger::try_init().ok();
    let body = r#"{"type":"payment","data":{"id":900123}}"#;
    let (status, _) = post_webhook(expect_one_job("900123"), true, URI, signed_headers("900123"), body).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn bad_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    // Signed for a different payment
    let (status, body) = post_webhook(expect_no_jobs(), true, URI, signed_headers("900124"), BODY).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Invalid webhook signature"}"#);
}

#[actix_web::test]
async fn missing_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, _) = post_webhook(expect_no_jobs(), true, URI, vec![], BODY).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let headers = vec![("x-signature", format!("ts={TS},v1=00"))];
    let (status, _) = post_webhook(expect_no_jobs(), true, URI, headers, BODY).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let headers = vec![("x-request-id", REQUEST_ID.to_string())];
    let (status, _) = post_webhook(expect_no_jobs(), true, URI, headers, BODY).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn signature_checks_can_be_disabled() {
    let _ = env_logger::try_init().ok();
    let (status, _) = post_webhook(expect_one_job("900123"), false, URI, vec![], BODY).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn other_notifications_are_ignored() {
    let _ = env_logger::try_init().ok();
    let uri = "/api/webhook?data.id=777&type=merchant_order";
    let body = r#"{"type":"merchant_order","data":{"id":"777"}}"#;
    let (status, body) = post_webhook(expect_no_jobs(), true, uri, signed_headers("777"), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Notification ignored."}"#);
}

#[actix_web::test]
async fn unusable_bodies_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    for body in ["not json", r#"{"type":"payment"}"#, r#"{"type":"payment","data":{"id":""}}"#] {
        let (status, reply) = post_webhook(expect_no_jobs(), true, URI, signed_headers("900123"), body).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(reply.contains(r#""success":false"#), "{reply}");
    }
}

#[actix_web::test]
async fn queue_failure_is_a_server_error() {
    let _ = env_logger::try_init().ok();
    let mut queue = MockQueue::new();
    queue.expect_enqueue().times(1).returning(|_| Err(JobQueueError::DatabaseError("database is locked".into())));
    let (status, body) = post_webhook(queue, true, URI, signed_headers("900123"), BODY).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("database is locked"), "{body}");
}


#[actix_web::test]
async fn peers_off_the_whitelist_are_refused_before_the_signature_is_checked() {
    let _ = env_logger::try_init().ok();
    let gateway = PEER.parse::<std::net::SocketAddr>().unwrap().ip();
    let config = ServerConfig { whitelist: Some(vec![gateway]), ..webhook_config(true) };
    let stranger = "198.51.100.23:40000";

    let (status, body) =
        post_webhook_from(&config, stranger, expect_no_jobs(), URI, signed_headers("900124"), BODY).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    let (status, _) = post_webhook_from(&config, stranger, expect_no_jobs(), URI, vec![], BODY).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = post_webhook_from(&config, stranger, expect_no_jobs(), URI, signed_headers("900123"), BODY).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // whitelisted peers still need a good signature
    let (status, _) = post_webhook_from(&config, PEER, expect_no_jobs(), URI, signed_headers("900124"), BODY).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) =
        post_webhook_from(&config, PEER, expect_one_job("900123"), URI, signed_headers("900123"), BODY).await;
    assert_eq!(status, StatusCode::OK);
}
