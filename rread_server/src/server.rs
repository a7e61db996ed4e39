use std::time::Duration;

use actix_web::{
    dev::{Server, Service, ServiceResponse},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use rread_engine::{JobQueue, JobQueueApi, SqliteDatabase};
use tokio::sync::watch;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    helpers::{get_remote_ip, peer_is_allowed},
    middleware::SignatureMiddlewareFactory,
    routes::{HealthRoute, PaymentWebhookRoute},
    workers::{create_alert_handlers, start_fulfillment_workers},
};

const MAX_DB_CONNECTIONS: u32 = 25;

/// Connects to the database and brings the schema up to date.
pub async fn open_database(config: &ServerConfig) -> Result<SqliteDatabase, ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?
        .with_job_max_attempts(config.workers.max_attempts);
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(format!("Migrations failed. {e}")))?;
    Ok(db)
}

/// Runs the ingress and the in-process workers until the HTTP server stops. The workers are then asked to finish what
/// they are doing.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = open_database(&config).await?;
    let handlers = create_alert_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let (shutdown, shutdown_signal) = watch::channel(false);
    let workers = start_fulfillment_workers(&config, db.clone(), producers, shutdown_signal)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the gateway client. {e}")))?;
    let srv = create_server_instance(config, db)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("🚀️ Server stopped. Waiting for {} workers to finish.", workers.len());
    let _ = shutdown.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("🚀️ A fulfilment worker did not shut down cleanly. {e}");
        }
    }
    result
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let bind_addr = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let queue_api = JobQueueApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("rread::access_log"))
            .app_data(web::Data::new(queue_api))
            .app_data(web::Data::new(db.clone()))
            .service(HealthRoute::<SqliteDatabase, SqliteDatabase>::new())
            .configure(|cfg| configure_webhook::<SqliteDatabase>(cfg, &config))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((bind_addr.0.as_str(), bind_addr.1))?
    .run();
    Ok(srv)
}

/// Mounts the webhook under `/api`. The peer whitelist is checked before the signature.
pub fn configure_webhook<Q: JobQueue + 'static>(cfg: &mut web::ServiceConfig, config: &ServerConfig) {
    let use_x_forwarded_for = config.use_x_forwarded_for;
    let use_forwarded = config.use_forwarded;
    let whitelist = config.whitelist.clone();
    let scope = web::scope("/api")
        .wrap(SignatureMiddlewareFactory::new(config.webhook_secret.clone(), config.signature_checks))
        .wrap_fn(move |req, srv| {
            let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
            if peer_is_allowed(peer_ip, whitelist.as_deref()) {
                srv.call(req).map(|res| res.map(ServiceResponse::map_into_boxed_body)).boxed_local()
            } else {
                ok(req.error_response(ServerError::ForbiddenPeer)).boxed_local()
            }
        })
        .service(PaymentWebhookRoute::<Q>::new());
    cfg.service(scope);
}
