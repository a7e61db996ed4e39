//! # Backend contracts
//!
//! The engine is written against these traits so that the storage backend, the payment gateway and the mail relay can
//! be swapped out (and faked in tests).
//!
//! * [`FulfillmentDatabase`] is everything the fulfilment pipeline reads and writes: order lookup by payment id, key
//!   reservation and release, and the conditional `delivered` transition.
//! * [`OrderManagement`] is used by the order-creation side and for provisioning products and key pools.
//! * [`JobQueue`] is the durable, at-least-once work queue.
//! * [`PaymentGateway`] returns the authoritative status of a payment.
//! * [`DeliveryNotifier`] sends the customer their download link or license key.
mod delivery_notifier;
mod fulfillment_database;
mod job_queue;
mod order_management;
mod payment_gateway;

pub use delivery_notifier::{DeliveryContent, DeliveryError, DeliveryMessage, DeliveryNotifier};
pub use fulfillment_database::{FulfillmentDatabase, StoreError};
pub use job_queue::{JobQueue, JobQueueError};
pub use order_management::OrderManagement;
pub use payment_gateway::{GatewayError, GatewayPayment, GatewayStatus, PaymentGateway};
