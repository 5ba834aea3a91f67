//! Fire-and-forget collaborators, wired into the engine's event hooks.
//!
//! Only the following events leave the process:
//!
//! 1. OrderConfirmedEvent - the confirmation that won the Pending → Succeeded transition posts the notification
//!    webhook. Replayed confirmations never reach this module.
//! 2. DeliveryRequestedEvent - a delivery slot request posts the same webhook.
//! 3. SessionCreatedEvent - a genuinely new device session triggers an IP geolocation lookup, whose result is
//!    written back onto the session row.

use log::*;
use stage_commerce_engine::{
    events::{EventHandlers, EventHooks},
    SessionManagement,
    SqliteDatabase,
};

use crate::config::ServerConfig;

pub mod geo;
pub mod notify;

pub use geo::GeoLookup;
pub use notify::Notifier;

pub const EVENT_BUFFER_SIZE: usize = 25;

/// Builds the event handlers for the configured integrations. Handlers for unconfigured integrations are simply
/// absent, and the corresponding events go nowhere.
pub fn create_event_handlers(config: &ServerConfig, db: SqliteDatabase) -> EventHandlers {
    let mut hooks = EventHooks::default();
    if let Some(notifier) = build_notifier(config) {
        let on_confirmed = notifier.clone();
        hooks.on_order_confirmed(move |ev| {
            let notifier = on_confirmed.clone();
            Box::pin(async move {
                notifier.order_confirmed(&ev).await;
            })
        });
        hooks.on_delivery_requested(move |ev| {
            let notifier = notifier.clone();
            Box::pin(async move {
                notifier.delivery_requested(&ev).await;
            })
        });
    }
    if let Some(geo) = build_geo_lookup(config) {
        hooks.on_session_created(move |ev| {
            let geo = geo.clone();
            let db = db.clone();
            Box::pin(async move {
                let session = ev.session;
                let Some(ip) = session.ip else {
                    return;
                };
                let Some(location) = geo.locate(&ip).await else {
                    return;
                };
                debug!(
                    "🌍️ Session #{} resolved to {} / {}",
                    session.id,
                    location.city.as_deref().unwrap_or("?"),
                    location.country.as_deref().unwrap_or("?")
                );
                if let Err(e) =
                    db.annotate_session_geo(session.id, location.city.as_deref(), location.country.as_deref()).await
                {
                    warn!("🌍️ Could not annotate session #{}. {e}", session.id);
                }
            })
        });
    }
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}

/// The notifier is also used outside the hook path, to deliver verification codes at registration time.
pub fn build_notifier(config: &ServerConfig) -> Option<Notifier> {
    let url = config.notify_webhook_url.as_ref()?.reveal().clone();
    match Notifier::new(url) {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            error!("📣️ Could not build the notification client. Notifications are disabled. {e}");
            None
        },
    }
}

fn build_geo_lookup(config: &ServerConfig) -> Option<GeoLookup> {
    let url = config.geo_api_url.clone()?;
    match GeoLookup::new(url) {
        Ok(geo) => Some(geo),
        Err(e) => {
            error!("🌍️ Could not build the geolocation client. Sessions will not be annotated. {e}");
            None
        },
    }
}
