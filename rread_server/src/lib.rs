//! # R·READ fulfilment server
//! This crate hosts the ingress and the fulfilment workers for the R·READ store. It is responsible for:
//! Listening for payment notifications from Mercado Pago and checking their signatures.
//! Queueing a fulfilment job for every payment notification.
//! Running the workers that confirm the payment with the gateway and email the customer their e-book link or license
//! key.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: Reports whether the database is reachable, along with the job queue counts.
//! * `/api/webhook`: The webhook route for payment notifications. Requests must carry a valid signature.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod dead_letters;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
