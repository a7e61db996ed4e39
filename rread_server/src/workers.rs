//! Fulfilment worker wiring.
//!
//! Workers are plain tokio tasks sharing one [`SqliteDatabase`]. They are told to stop through a `watch` channel and
//! finish the job in hand before they exit.
use futures::future::BoxFuture;
use log::*;
use mercadopago_tools::MercadoPagoApiError;
use rread_engine::{
    events::{EventHandlers, EventHooks, EventProducers, JobDeadEvent, KeysExhaustedEvent, OrderDeliveredEvent},
    FulfillmentWorker,
    SqliteDatabase,
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    config::{ServerConfig, WorkerSettings},
    integrations::{email::SmtpNotifier, mercadopago::MercadoPagoGateway},
};

pub const ALERT_EVENT_BUFFER_SIZE: usize = 25;

/// Operator-facing alerts. Deliveries are logged at `info`; exhausted key pools and dead jobs at `error`, since both
/// need someone to act.
pub fn create_alert_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_delivered(|ev: OrderDeliveredEvent| {
        let OrderDeliveredEvent { order, license_key } = ev;
        match license_key {
            Some(key) => info!(
                "📣️ Order #{} ({}) delivered to {} with license key #{}",
                order.id, order.external_reference, order.customer_email, key.id
            ),
            None => info!("📣️ Order #{} ({}) delivered to {}", order.id, order.external_reference, order.customer_email),
        }
        no_op()
    });
    hooks.on_keys_exhausted(|ev: KeysExhaustedEvent| {
        error!(
            "📣️ Product {} has no license keys left. Order #{} ({}) for {} is waiting. Add keys to the pool to release \
             it.",
            ev.product_id, ev.order.id, ev.order.external_reference, ev.order.customer_email
        );
        no_op()
    });
    hooks.on_job_dead(|ev: JobDeadEvent| {
        error!(
            "📣️ Job #{} for payment {} was dead-lettered after {} attempts. Reason: {}",
            ev.job.id, ev.job.payment_id, ev.job.attempts, ev.reason
        );
        no_op()
    });
    EventHandlers::new(ALERT_EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}

/// Spawns `settings.count` workers. The gateway client and mail transport are built once and shared.
pub fn start_fulfillment_workers(
    config: &ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, MercadoPagoApiError> {
    let WorkerSettings { count, worker, .. } = config.workers;
    if count == 0 {
        info!("🕰️ No in-process fulfilment workers are configured. Jobs will wait for an external worker.");
        return Ok(Vec::new());
    }
    let gateway = MercadoPagoGateway::new(config.mercadopago.clone())?;
    let notifier = SmtpNotifier::new(&config.smtp);
    let handles = (1..=count)
        .map(|i| {
            let worker = FulfillmentWorker::new(
                format!("worker-{i}"),
                db.clone(),
                gateway.clone(),
                notifier.clone(),
                producers.clone(),
                worker,
            );
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect();
    info!("🕰️ {count} fulfilment workers started");
    Ok(handles)
}
