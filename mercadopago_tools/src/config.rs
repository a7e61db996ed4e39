use std::time::Duration;

use log::*;
use rread_common::Secret;

pub const DEFAULT_MP_API_URL: &str = "https://api.mercadopago.com";
pub const DEFAULT_MP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub api_url: String,
    pub access_token: Secret<String>,
    pub timeout: Duration,
}

impl Default for MercadoPagoConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_MP_API_URL.to_string(),
            access_token: Secret::default(),
            timeout: Duration::from_secs(DEFAULT_MP_TIMEOUT_SECS),
        }
    }
}

impl MercadoPagoConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("RR_MP_API_URL").unwrap_or_else(|_| {
            info!("🪛️ RR_MP_API_URL not set, using {DEFAULT_MP_API_URL}");
            DEFAULT_MP_API_URL.to_string()
        });
        let access_token = Secret::new(std::env::var("RR_MP_ACCESS_TOKEN").unwrap_or_else(|_| {
            warn!("🪛️ RR_MP_ACCESS_TOKEN not set. Every payment lookup will be rejected by Mercado Pago.");
            String::default()
        }));
        let timeout = std::env::var("RR_MP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid value for RR_MP_TIMEOUT_SECS ({s}): {e}"))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_MP_TIMEOUT_SECS));
        Self { api_url: api_url.trim_end_matches('/').to_string(), access_token, timeout }
    }
}
