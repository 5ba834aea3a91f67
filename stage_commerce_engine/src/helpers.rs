//! Small helpers shared by the engine and its front-ends: opaque token minting, public order numbers, and
//! user-agent classification for session fingerprints.

use std::sync::LazyLock;

use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;

use crate::db_types::SessionFingerprint;

/// Mints an opaque bearer token of `len` alphanumeric characters. Used for cart tokens, order tokens and session
/// tokens alike.
pub fn new_token(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

pub const CART_TOKEN_LEN: usize = 32;
pub const ORDER_TOKEN_LEN: usize = 40;
pub const SESSION_TOKEN_LEN: usize = 48;

/// The human-facing order number. Assigned at confirmation time from the row id, so it is dense and stable.
pub fn public_order_number(order_id: i64) -> String {
    format!("STG-{order_id:06}")
}

/// Classifies a raw user-agent string into the coarse (device, os) pair used for session fingerprints.
///
/// This is deliberately crude. The registry only needs enough resolution to recognise "the same browser on the
/// same machine", not full UA parsing.
pub fn classify_user_agent(ip: Option<&str>, user_agent: Option<&str>) -> SessionFingerprint {
    let (device, os) = match user_agent {
        Some(ua) => (Some(device_class(ua)), os_family(ua)),
        None => (None, None),
    };
    SessionFingerprint {
        ip: ip.map(String::from),
        city: None,
        country: None,
        device,
        os,
        user_agent: user_agent.map(String::from),
    }
}

static TABLET: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\b(iPad|Tablet)\b").ok());
static MOBILE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\b(Mobile|iPhone|Android)\b").ok());
// Order matters: "Mac OS X" appears inside iPhone user agents and Android ones contain "Linux".
static OS_FAMILIES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)Windows", "Windows"),
        (r"(?i)Android", "Android"),
        (r"(?i)(iPhone|iPad|iOS)", "iOS"),
        (r"(?i)Mac OS X", "macOS"),
        (r"(?i)CrOS", "ChromeOS"),
        (r"(?i)Linux", "Linux"),
    ]
    .into_iter()
    .filter_map(|(pattern, family)| Regex::new(pattern).ok().map(|re| (re, family)))
    .collect()
});

fn device_class(ua: &str) -> String {
    let hit = |re: &Option<Regex>| re.as_ref().map(|re| re.is_match(ua)).unwrap_or(false);
    // Tablets report "Mobile" too on some stacks, so they are checked first.
    if hit(&TABLET) {
        "Tablet".to_string()
    } else if hit(&MOBILE) {
        "Mobile".to_string()
    } else {
        "Desktop".to_string()
    }
}

fn os_family(ua: &str) -> Option<String> {
    OS_FAMILIES.iter().find(|(re, _)| re.is_match(ua)).map(|(_, family)| (*family).to_string())
}
