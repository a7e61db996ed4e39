use std::{env, fmt::Display, net::IpAddr, str::FromStr, time::Duration};

use log::*;
use mercadopago_tools::MercadoPagoConfig;
use rread_common::{helpers::parse_boolean_flag, Secret};
use rread_engine::{db::DEFAULT_DATABASE_URL, BackoffPolicy, LookupPolicy, WorkerConfig};

const DEFAULT_RR_HOST: &str = "127.0.0.1";
const DEFAULT_RR_PORT: u16 = 8360;
pub const DEFAULT_SMTP_SERVER: &str = "smtp.zoho.com";
pub const DEFAULT_SMTP_PORT: u16 = 465;
const DEFAULT_WORKER_COUNT: usize = 1;
const DEFAULT_JOB_MAX_ATTEMPTS: i64 = 8;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The shared secret the gateway signs webhook notifications with. If it is empty, every webhook is rejected.
    pub webhook_secret: Secret<String>,
    /// If false, webhook signatures are not checked at all. For local testing only.
    pub signature_checks: bool,
    /// If supplied, webhook requests will be checked against a whitelist of gateway IP addresses.
    pub whitelist: Option<Vec<IpAddr>>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub mercadopago: MercadoPagoConfig,
    pub smtp: SmtpConfig,
    pub workers: WorkerSettings,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub server: String,
    /// The relay is reached over implicit TLS
    pub port: u16,
    /// The SMTP login, which is also the sender address
    pub user: String,
    pub password: Secret<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SMTP_SERVER.to_string(),
            port: DEFAULT_SMTP_PORT,
            user: String::default(),
            password: Secret::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WorkerSettings {
    /// The number of fulfilment workers to run. Zero is valid for an ingress-only server.
    pub count: usize,
    /// Attempts a job gets before it is dead-lettered
    pub max_attempts: i64,
    pub worker: WorkerConfig,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { count: DEFAULT_WORKER_COUNT, max_attempts: DEFAULT_JOB_MAX_ATTEMPTS, worker: WorkerConfig::default() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RR_HOST.to_string(),
            port: DEFAULT_RR_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            webhook_secret: Secret::default(),
            signature_checks: true,
            whitelist: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            mercadopago: MercadoPagoConfig::default(),
            smtp: SmtpConfig::default(),
            workers: WorkerSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("RR_HOST").ok().unwrap_or_else(|| DEFAULT_RR_HOST.into());
        let port = env_or_default("RR_PORT", DEFAULT_RR_PORT);
        let database_url = env::var("RR_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ RR_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let webhook_secret = Secret::new(env::var("RR_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ RR_WEBHOOK_SECRET is not set. Every webhook notification will be rejected until it is set to the \
                 secret shown in the gateway's webhook settings."
            );
            String::default()
        }));
        let signature_checks = parse_boolean_flag(env::var("RR_SIGNATURE_CHECKS").ok(), true);
        if !signature_checks {
            warn!(
                "🚨️🚨️🚨️ Webhook signature checks are DISABLED. Anyone can trigger fulfilment. Never run production \
                 like this. 🚨️🚨️🚨️"
            );
        }
        let whitelist = env::var("RR_WEBHOOK_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The webhook IP whitelist was configured, but is empty. The server will run, but won't accept \
                     any webhook requests."
                );
            },
            None => info!("🪛️ No webhook IP whitelist is set. Only signature validation will be used."),
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Webhook IP whitelist: {addrs}");
            },
        }
        let use_x_forwarded_for = parse_boolean_flag(env::var("RR_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("RR_USE_FORWARDED").ok(), false);
        let mercadopago = MercadoPagoConfig::new_from_env_or_default();
        let smtp = SmtpConfig::from_env_or_default();
        let workers = WorkerSettings::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            webhook_secret,
            signature_checks,
            whitelist,
            use_x_forwarded_for,
            use_forwarded,
            mercadopago,
            smtp,
            workers,
        }
    }
}

impl SmtpConfig {
    pub fn from_env_or_default() -> Self {
        let server = env::var("RR_SMTP_SERVER").ok().unwrap_or_else(|| DEFAULT_SMTP_SERVER.into());
        let port = env_or_default("RR_SMTP_PORT", DEFAULT_SMTP_PORT);
        let user = env::var("RR_EMAIL_USER").ok().unwrap_or_default();
        let password = Secret::new(env::var("RR_EMAIL_PASSWORD").ok().unwrap_or_default());
        if user.is_empty() || password.is_blank() {
            error!("🪛️ RR_EMAIL_USER and RR_EMAIL_PASSWORD must both be set, or no order can be delivered.");
        }
        Self { server, port, user, password }
    }

    pub fn has_credentials(&self) -> bool {
        !self.user.trim().is_empty() && !self.password.is_blank()
    }
}

impl WorkerSettings {
    pub fn from_env_or_default() -> Self {
        let count = env_or_default("RR_WORKER_COUNT", DEFAULT_WORKER_COUNT);
        let max_attempts = env_or_default("RR_JOB_MAX_ATTEMPTS", DEFAULT_JOB_MAX_ATTEMPTS).max(1);
        let defaults = WorkerConfig::default();
        let backoff = BackoffPolicy {
            base_delay: env_secs("RR_JOB_BASE_DELAY_SECS", defaults.backoff.base_delay),
            max_delay: env_secs("RR_JOB_MAX_DELAY_SECS", defaults.backoff.max_delay),
        };
        let lookup = LookupPolicy {
            attempts: env_or_default("RR_ORDER_LOOKUP_ATTEMPTS", defaults.lookup.attempts).max(1),
            delay: env_millis("RR_ORDER_LOOKUP_DELAY_MS", defaults.lookup.delay),
        };
        let worker = WorkerConfig {
            poll_interval: env_millis("RR_JOB_POLL_INTERVAL_MS", defaults.poll_interval),
            lease: env_secs("RR_JOB_LEASE_SECS", defaults.lease),
            backoff,
            lookup,
        };
        Self { count, max_attempts, worker }
    }
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" explicitly disable the whitelist.
/// Invalid entries are logged and skipped.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0", ""].contains(&s.trim().to_lowercase().as_str()) {
        info!("🪛️ Webhook IP whitelist is disabled.");
        return None;
    }
    let ip_addrs = s
        .split(',')
        .filter_map(|s| {
            s.trim()
                .parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in RR_WEBHOOK_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => parse_or_default(name, &s, default),
        Err(_) => default,
    }
}

fn parse_or_default<T>(name: &str, value: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    value.trim().parse::<T>().unwrap_or_else(|e| {
        error!("🪛️ {value} is not a valid value for {name}. {e} Using the default, {default}, instead.");
        default
    })
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or_default(name, default.as_secs()))
}

fn env_millis(name: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or_default(name, default.as_millis() as u64))
}
