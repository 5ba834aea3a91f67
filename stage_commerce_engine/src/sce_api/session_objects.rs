use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db_types::DeviceSession;

/// A device session as presented to the account owner.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: i64,
    pub is_primary: bool,
    pub is_current: bool,
    pub device: Option<String>,
    pub os: Option<String>,
    pub ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SessionInfo {
    pub fn from_session(session: &DeviceSession, current_id: i64) -> Self {
        Self {
            id: session.id,
            is_primary: session.is_primary,
            is_current: session.id == current_id,
            device: session.device.clone(),
            os: session.os.clone(),
            ip: session.ip.clone(),
            city: session.city.clone(),
            country: session.country.clone(),
            created_at: session.created_at,
            last_seen: session.last_seen,
        }
    }
}

/// The account-security view of the registry: every live session with the caller's own session pinned first, plus
/// the caller's standing to revoke the others.
#[derive(Debug, Clone)]
pub struct SessionOverview {
    /// Live sessions, current first, then most recently seen first.
    pub sessions: Vec<SessionInfo>,
    /// The caller's own session. When the presented bearer resolved to nothing this is a freshly registered
    /// session and the caller must persist its token.
    pub current: DeviceSession,
    /// True when `current` was minted (or its token rotated) during this call.
    pub token_minted: bool,
    /// Whether the current session may revoke other devices right now.
    pub can_revoke_others: bool,
    /// Whole hours (rounded up) until the cooldown lapses. Zero when `can_revoke_others` is true.
    pub cooldown_hours_left: i64,
}
