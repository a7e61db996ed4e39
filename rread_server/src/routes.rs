//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers never do fulfilment work themselves. The webhook only records a job; the slow part (gateway query, key
//! allocation, email) happens in the workers, so the gateway gets its acknowledgement quickly.
use actix_web::{web, HttpResponse};
use log::*;
use rread_engine::{FulfillmentDatabase, JobQueue, JobQueueApi};

use crate::{
    data_objects::{HealthDependencies, HealthReport, JsonResponse, WebhookNotification},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

//----------------------------------------------   Health  ----------------------------------------------------
route!(health => Get "/health" impl FulfillmentDatabase, JobQueue);
/// Reports whether the database (and hence the queue) is reachable. Load balancers should treat anything but `200` as
/// down.
pub async fn health<B, Q>(db: web::Data<B>, queue: web::Data<JobQueueApi<Q>>) -> HttpResponse
where
    B: FulfillmentDatabase,
    Q: JobQueue,
{
    let database = db.ping().await;
    let stats = queue.stats().await;
    match (database, stats) {
        (Ok(()), Ok(stats)) => HttpResponse::Ok().json(HealthReport {
            status: "healthy".into(),
            dependencies: HealthDependencies { database: "ok".into() },
            queue: Some(stats),
        }),
        (database, stats) => {
            if let Err(e) = &database {
                error!("💻️ Health check failed. The database is unreachable. {e}");
            }
            if let Err(e) = &stats {
                error!("💻️ Health check failed. Could not read the job queue. {e}");
            }
            HttpResponse::ServiceUnavailable().json(HealthReport {
                status: "unhealthy".into(),
                dependencies: HealthDependencies { database: "unreachable".into() },
                queue: None,
            })
        },
    }
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(payment_webhook => Post "/webhook" impl JobQueue);
/// Receives payment notifications from the gateway.
///
/// By the time a request gets here its signature has been checked. Payment notifications are queued for fulfilment
/// and acknowledged with `200`. Anything else (other notification types, a missing payment id, an unreadable body) is
/// acknowledged and dropped, since the gateway would only keep resending it. A queue failure is a `500`, so that the
/// gateway retries later.
pub async fn payment_webhook<Q: JobQueue>(
    body: web::Bytes,
    queue: web::Data<JobQueueApi<Q>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received webhook request: {}", String::from_utf8_lossy(&body));
    let notification = match serde_json::from_slice::<WebhookNotification>(&body) {
        Ok(n) => n,
        Err(e) => {
            warn!("💻️ Ignoring a webhook notification that could not be parsed. {e}");
            return Ok(HttpResponse::Ok().json(JsonResponse::failure("Notification ignored. Unreadable body.")));
        },
    };
    if !notification.is_payment() {
        info!("💻️ Ignoring a {} notification", notification.kind.as_deref().unwrap_or("untyped"));
        return Ok(HttpResponse::Ok().json(JsonResponse::success("Notification ignored.")));
    }
    let Some(payment_id) = notification.payment_id() else {
        warn!("💻️ Ignoring a payment notification without a payment id");
        return Ok(HttpResponse::Ok().json(JsonResponse::failure("Notification ignored. No payment id.")));
    };
    let job = queue.submit_payment(&payment_id).await.map_err(|e| {
        error!("💻️ Could not queue payment {payment_id} for fulfilment. {e}");
        ServerError::from(e)
    })?;
    debug!("💻️ Payment {payment_id} accepted as job #{}", job.id);
    Ok(HttpResponse::Ok().json(JsonResponse::success("Notification received.")))
}
