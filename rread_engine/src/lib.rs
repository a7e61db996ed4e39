//! RRead fulfilment engine
//!
//! The engine turns "a payment was confirmed" into "the customer received what they paid for", exactly once per order,
//! even though payment notifications arrive at least once and the order record may not be visible yet when the first
//! notification is processed.
//!
//! The library is divided into these sections:
//! 1. Data types ([`mod@db_types`]) shared by every backend.
//! 2. Backend traits ([`mod@traits`]). A storage backend implements [`FulfillmentDatabase`], [`OrderManagement`] and
//!    [`JobQueue`]. The payment gateway and the mail relay sit behind [`PaymentGateway`] and [`DeliveryNotifier`], so
//!    the engine never talks to the network directly.
//! 3. The SQLite backend ([`SqliteDatabase`]), including the durable job queue and the embedded migrations.
//! 4. The public API ([`FulfillmentApi`] and [`JobQueueApi`]) and the [`FulfillmentWorker`] loop that drives them.
//!
//! Outcomes that operators care about (deliveries, exhausted key pools and dead-lettered jobs) are published on the
//! [`mod@events`] hooks.
pub mod db_types;
pub mod events;
pub mod traits;

mod rre_api;
#[cfg(feature = "sqlite")]
mod sqlite;
mod workers;

pub use rre_api::{
    errors::{ErrorKind, FulfillmentError},
    fulfillment_api::{FulfillmentApi, FulfillmentOutcome, LookupPolicy},
    job_queue_api::JobQueueApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db, SqliteDatabase};
pub use traits::{
    DeliveryContent,
    DeliveryError,
    DeliveryMessage,
    DeliveryNotifier,
    FulfillmentDatabase,
    GatewayError,
    GatewayPayment,
    GatewayStatus,
    JobQueue,
    JobQueueError,
    OrderManagement,
    PaymentGateway,
    StoreError,
};
pub use workers::{BackoffPolicy, FulfillmentWorker, JobResolution, WorkerConfig};
