//! The public face of the engine.
//!
//! [`FulfillmentApi`] runs the fulfilment pipeline for a single payment. [`JobQueueApi`] is what the ingress and the
//! operator tooling use to feed and inspect the queue.
pub mod errors;
pub mod fulfillment_api;
pub mod job_queue_api;
