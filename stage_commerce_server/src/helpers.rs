use std::{net::IpAddr, str::FromStr, sync::LazyLock};

use actix_web::HttpRequest;
use log::trace;
use regex::Regex;
use stage_commerce_engine::{db_types::SessionFingerprint, helpers::classify_user_agent};

static FORWARDED_FOR: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"for=(?P<ip>[^;,\s]+)").ok());

/// The remote address of the request. Proxy headers are opt-in per deployment: `X-Forwarded-For` is consulted
/// first, then the `Forwarded` header, and the connection's peer address is the fallback either way.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
    let mut result = None;
    if use_x_forwarded_for {
        // Only the first hop of the chain identifies the client.
        result = header("X-Forwarded-For").and_then(|v| v.split(',').next()).and_then(parse_ip);
    }
    if result.is_none() && use_forwarded {
        result = header("Forwarded")
            .zip(FORWARDED_FOR.as_ref())
            .and_then(|(value, re)| re.captures(value))
            .and_then(|caps| caps.name("ip"))
            .and_then(|m| parse_ip(m.as_str()));
    }
    if let Some(ip) = result {
        trace!("💻️ Remote address taken from a proxy header: {ip}");
        return Some(ip);
    }
    req.peer_addr().map(|a| a.ip())
}

fn parse_ip(s: &str) -> Option<IpAddr> {
    IpAddr::from_str(s.trim().trim_matches('"')).ok()
}

/// Builds the coarse device fingerprint for the request from its user agent and remote address.
pub fn request_fingerprint(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> SessionFingerprint {
    let ip = get_remote_ip(req, use_x_forwarded_for, use_forwarded).map(|ip| ip.to_string());
    let user_agent = req.headers().get("User-Agent").and_then(|v| v.to_str().ok());
    classify_user_agent(ip.as_deref(), user_agent)
}
