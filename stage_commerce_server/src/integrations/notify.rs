//! The outbound notification dispatcher. Every call here is best-effort: a failed or slow delivery is logged and
//! forgotten, it never feeds back into the flow that triggered it.

use std::time::Duration;

use log::*;
use serde_json::json;
use stage_commerce_engine::events::{DeliveryRequestedEvent, OrderConfirmedEvent};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self { client, webhook_url })
    }

    pub async fn order_confirmed(&self, event: &OrderConfirmedEvent) {
        let order = &event.order;
        let payload = json!({
            "kind": "order_confirmed",
            "order_id": order.id,
            "public_number": order.public_number,
            "email": order.email,
            "total": order.total,
            "canceled_siblings": event.canceled_siblings,
        });
        self.post("order confirmation", payload).await;
    }

    pub async fn delivery_requested(&self, event: &DeliveryRequestedEvent) {
        let payload = json!({
            "kind": "delivery_requested",
            "order_id": event.order.id,
            "public_number": event.order.public_number,
            "email": event.order.email,
            "slot": event.slot,
        });
        self.post("delivery request", payload).await;
    }

    /// The code itself never appears in the logs, only in the webhook payload.
    pub async fn verification_code(&self, email: &str, code: &str) {
        let payload = json!({
            "kind": "verification_code",
            "email": email,
            "code": code,
        });
        self.post("verification code", payload).await;
    }

    async fn post(&self, what: &str, payload: serde_json::Value) {
        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(res) if res.status().is_success() => trace!("📣️ Delivered {what} notification"),
            Ok(res) => warn!("📣️ The {what} notification was rejected with status {}", res.status()),
            Err(e) => warn!("📣️ Could not deliver the {what} notification. {e}"),
        }
    }
}
