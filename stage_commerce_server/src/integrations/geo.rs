//! Best-effort IP geolocation. A lookup that fails, times out or returns junk degrades to an unannotated
//! session, nothing more.

use std::time::Duration;

use log::*;
use serde::Deserialize;

const GEO_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Deserialize)]
pub struct GeoLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GeoLookup {
    client: reqwest::Client,
    api_url: String,
}

impl GeoLookup {
    pub fn new(api_url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(GEO_TIMEOUT).build()?;
        Ok(Self { client, api_url })
    }

    /// Resolves an IP to a coarse location, or `None` for any kind of failure.
    pub async fn locate(&self, ip: &str) -> Option<GeoLocation> {
        let url = format!("{}/{ip}", self.api_url.trim_end_matches('/'));
        let response = match self.client.get(&url).send().await {
            Ok(res) if res.status().is_success() => res,
            Ok(res) => {
                debug!("🌍️ Geo lookup for {ip} answered with status {}", res.status());
                return None;
            },
            Err(e) => {
                debug!("🌍️ Geo lookup for {ip} failed. {e}");
                return None;
            },
        };
        match response.json::<GeoLocation>().await {
            Ok(location) => Some(location),
            Err(e) => {
                debug!("🌍️ Geo lookup for {ip} returned an unreadable body. {e}");
                None
            },
        }
    }
}
