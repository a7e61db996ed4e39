mod api;
mod config;
mod error;

mod data_objects;

pub use api::MercadoPagoApi;
pub use config::MercadoPagoConfig;
pub use data_objects::{Payer, Payment, PaymentStatus};
pub use error::MercadoPagoApiError;
