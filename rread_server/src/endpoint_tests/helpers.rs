use std::net::SocketAddr;

use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use rread_common::Secret;
use rread_engine::JobQueueApi;

use super::mocks::MockQueue;
use crate::{
    config::ServerConfig,
    helpers::{calculate_signature, signature_manifest},
    server::configure_webhook,
};

pub const SECRET: &str = "6f1b3c2a9d8e7f60a5b4c3d2e1f00918";
pub const REQUEST_ID: &str = "bb56a2f1-6aae-46ac-982e-9dcd3581d08e";
pub const TS: &str = "1742505638683";
/// One of the gateway's notification addresses
pub const PEER: &str = "54.88.218.97:443";

/// Signature headers for a notification about `data_id`, signed with the test secret
pub fn signed_headers(data_id: &str) -> Vec<(&'static str, String)> {
    let v1 = calculate_signature(SECRET, &signature_manifest(data_id, REQUEST_ID, TS)).expect("Secret is not empty");
    vec![("x-signature", format!("ts={TS},v1={v1}")), ("x-request-id", REQUEST_ID.to_string())]
}

/// The webhook settings the tests run with: the test secret and no whitelist
pub fn webhook_config(signature_checks: bool) -> ServerConfig {
    ServerConfig { webhook_secret: Secret::new(SECRET.to_string()), signature_checks, ..Default::default() }
}

/// Posts to the webhook route, mounted the way the server mounts it, and returns the status and body.
pub async fn post_webhook(
    queue: MockQueue,
    signature_checks: bool,
    uri: &str,
    headers: Vec<(&str, String)>,
    body: &str,
) -> (StatusCode, String) {
    post_webhook_from(&webhook_config(signature_checks), PEER, queue, uri, headers, body).await
}

/// As [`post_webhook`], with the given server settings and connecting from `peer`
pub async fn post_webhook_from(
    config: &ServerConfig,
    peer: &str,
    queue: MockQueue,
    uri: &str,
    headers: Vec<(&str, String)>,
    body: &str,
) -> (StatusCode, String) {
    let app = App::new()
        .app_data(web::Data::new(JobQueueApi::new(queue)))
        .configure(|cfg| configure_webhook::<MockQueue>(cfg, config));
    let service = test::init_service(app).await;
    let peer = peer.parse::<SocketAddr>().expect("Invalid peer address");
    let mut req = TestRequest::post().uri(uri).peer_addr(peer).insert_header(("content-type", "application/json"));
    for header in headers {
        req = req.insert_header(header);
    }
    let res = test::call_service(&service, req.set_payload(body.to_string()).to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
