use std::env;

use chrono::Duration;
use log::*;
use stage_commerce_engine::SessionPolicy;
use stg_common::{helpers::parse_boolean_flag, Secret};

const DEFAULT_STG_HOST: &str = "127.0.0.1";
const DEFAULT_STG_PORT: u16 = 8380;
const DEFAULT_REVOKE_COOLDOWN_HOURS: i64 = 24;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// Emails that verify straight into the elevated role.
    pub elevated_emails: Vec<String>,
    /// How long a non-primary session must exist before it may revoke other devices.
    pub session_policy: SessionPolicy,
    /// Base URL of the IP geolocation service. Geo annotation is disabled when unset.
    pub geo_api_url: Option<String>,
    /// Webhook that receives order confirmations, delivery requests and verification codes. The URL usually
    /// embeds an access token, so it is kept out of logs. Notifications are disabled when unset.
    pub notify_webhook_url: Option<Secret<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STG_HOST.to_string(),
            port: DEFAULT_STG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            elevated_emails: Vec::new(),
            session_policy: SessionPolicy::default(),
            geo_api_url: None,
            notify_webhook_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("STG_HOST").ok().unwrap_or_else(|| DEFAULT_STG_HOST.into());
        let port = env::var("STG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for STG_PORT. {e} Using the default, {DEFAULT_STG_PORT}, instead."
                    );
                    DEFAULT_STG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_STG_PORT);
        let database_url = env::var("STG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ STG_DATABASE_URL is not set. Please set it to the URL for the storefront database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("STG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("STG_USE_FORWARDED").ok(), false);
        let elevated_emails = env::var("STG_ELEVATED_EMAILS")
            .map(|s| s.split(',').map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();
        if elevated_emails.is_empty() {
            info!("🪛️ STG_ELEVATED_EMAILS is not set. No account will verify into the elevated role.");
        }
        let session_policy = configure_session_policy();
        let geo_api_url = env::var("STG_GEO_API_URL").ok().filter(|s| !s.is_empty());
        if geo_api_url.is_none() {
            info!("🪛️ STG_GEO_API_URL is not set. Sessions will not be annotated with a location.");
        }
        let notify_webhook_url =
            env::var("STG_NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty()).map(Secret::new);
        if notify_webhook_url.is_none() {
            warn!(
                "🪛️ STG_NOTIFY_WEBHOOK_URL is not set. Order confirmations and verification codes will not be \
                 delivered anywhere."
            );
        }
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            elevated_emails,
            session_policy,
            geo_api_url,
            notify_webhook_url,
        }
    }
}

fn configure_session_policy() -> SessionPolicy {
    let hours = env::var("STG_REVOKE_COOLDOWN_HOURS")
        .map_err(|_| {
            info!(
                "🪛️ STG_REVOKE_COOLDOWN_HOURS is not set. Using the default value of \
                 {DEFAULT_REVOKE_COOLDOWN_HOURS} hrs."
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for STG_REVOKE_COOLDOWN_HOURS. {e}"))
        })
        .unwrap_or(DEFAULT_REVOKE_COOLDOWN_HOURS);
    SessionPolicy { revoke_cooldown: Duration::hours(hours) }
}
