use serde::Serialize;

use crate::db_types::{CartLine, DeviceSession, Order};

/// Fired exactly once per order, by the confirmation call that actually performed the Pending → Succeeded
/// transition. Replays never fire it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderConfirmedEvent {
    pub order: Order,
    /// Sibling pending orders swept to Canceled by this confirmation.
    pub canceled_siblings: Vec<i64>,
}

impl OrderConfirmedEvent {
    pub fn new(order: Order, canceled_siblings: Vec<i64>) -> Self {
        Self { order, canceled_siblings }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineAddedEvent {
    pub cart_id: i64,
    pub line: CartLine,
    /// True when the add merged into an existing line instead of creating one.
    pub merged: bool,
}

/// Fired when a genuinely new device session is registered. Reusing an existing fingerprint row does not fire it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCreatedEvent {
    pub session: DeviceSession,
}

impl SessionCreatedEvent {
    pub fn new(session: DeviceSession) -> Self {
        Self { session }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequestedEvent {
    pub order: Order,
    pub slot: String,
}
