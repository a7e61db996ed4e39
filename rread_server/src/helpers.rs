use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace, warn};
use regex::Regex;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // Proxies append to the header, so the client is the first entry
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        if let Ok(re) = Regex::new(r#"for="?(?P<ip>[^;,"]+)"#) {
            result = req
                .headers()
                .get("Forwarded")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| re.captures(v))
                .and_then(|caps| caps.name("ip"))
                .map(|m| m.as_str())
                .and_then(|s| IpAddr::from_str(s).ok());
        }
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.peer_addr().map(|a| a.ip());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr
    })
}

/// Checks the peer against the webhook whitelist. Without a whitelist, every peer is allowed; with one, a request
/// whose address cannot be determined is refused.
pub fn peer_is_allowed(peer_ip: Option<IpAddr>, whitelist: Option<&[IpAddr]>) -> bool {
    match (peer_ip, whitelist) {
        (_, None) => true,
        (Some(ip), Some(whitelist)) => {
            let allowed = whitelist.contains(&ip);
            if !allowed {
                warn!("💻️ Webhook request from {ip}, which is not whitelisted. Denying access.");
            }
            allowed
        },
        (None, Some(_)) => {
            warn!("💻️ No IP address found for the webhook request. Denying access.");
            false
        },
    }
}

//-------------------------------------------  Webhook signatures  -----------------------------------------------------

/// The parts of the gateway's `x-signature` header that take part in verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub ts: String,
    pub v1: String,
}

/// Parses `ts=<unix>,v1=<hex>`. Segments are comma-separated `key=value` pairs; whitespace around keys and values is
/// ignored, as are unknown keys. Returns `None` if `ts` or `v1` is missing or empty.
pub fn parse_signature_header(value: &str) -> Option<SignatureHeader> {
    let mut ts = None;
    let mut v1 = None;
    for part in value.split(',') {
        let Some((key, val)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "ts" => ts = Some(val.trim().to_string()),
            "v1" => v1 = Some(val.trim().to_string()),
            _ => {},
        }
    }
    match (ts, v1) {
        (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => Some(SignatureHeader { ts, v1 }),
        _ => None,
    }
}

/// The string the gateway signs: `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`
pub fn signature_manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    format!("id:{data_id};request-id:{request_id};ts:{ts};")
}

/// Hex-encoded HMAC-SHA256 of `manifest`. Returns `None` for an empty secret.
pub fn calculate_signature(secret: &str, manifest: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(manifest.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks that a webhook notification was signed by the gateway.
///
/// `x_signature` and `x_request_id` are the raw header values and `data_id` is the `data.id` query parameter (an
/// absent parameter signs as the empty string). Any missing header, an empty secret, a header without `ts` or `v1`,
/// or a `v1` that is not valid hex all yield `false`. The digest comparison is constant-time.
pub fn verify_webhook_signature(
    secret: &str,
    x_signature: Option<&str>,
    x_request_id: Option<&str>,
    data_id: Option<&str>,
) -> bool {
    if secret.is_empty() {
        trace!("🔐️ No webhook secret is configured");
        return false;
    }
    let (Some(x_signature), Some(request_id)) = (x_signature, x_request_id) else {
        trace!("🔐️ Signature or request id header missing");
        return false;
    };
    if x_signature.is_empty() || request_id.is_empty() {
        return false;
    }
    let Some(header) = parse_signature_header(x_signature) else {
        trace!("🔐️ Malformed x-signature header: {x_signature}");
        return false;
    };
    let Ok(expected) = hex::decode(&header.v1) else {
        trace!("🔐️ The v1 signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    let manifest = signature_manifest(data_id.unwrap_or_default(), request_id, &header.ts);
    mac.update(manifest.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
