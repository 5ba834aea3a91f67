use super::data_objects::SessionRegistration;
use crate::db_types::{DeviceSession, NewDeviceSession};

/// Behaviour for the device-session registry.
///
/// Sessions are never deleted; revocation sets `revoked_at` and the row stays for audit. The `is_primary` flag marks
/// the first session the account ever created and is set exactly once.
#[allow(async_fn_in_trait)]
pub trait SessionManagement: Clone {
    type Error: std::error::Error;

    /// In a single atomic transaction, registers a device session:
    /// * If the principal has a live session with the same fingerprint key, that session's token is replaced with
    ///   the new one, its last-seen timestamp refreshed, and it is returned as [`SessionRegistration::Reused`].
    /// * Otherwise a new row is inserted, with `is_primary` set only when the principal has never had a session
    ///   before (revoked rows count as having had one).
    async fn register_session(&self, session: NewDeviceSession) -> Result<SessionRegistration, Self::Error>;

    /// Fetches a session by its bearer token, live or revoked.
    async fn fetch_session_by_token(&self, token: &str) -> Result<Option<DeviceSession>, Self::Error>;

    /// The principal's live sessions, most recently seen first.
    async fn fetch_live_sessions(&self, user_id: i64) -> Result<Vec<DeviceSession>, Self::Error>;

    /// Refreshes the session's last-seen timestamp.
    async fn touch_session(&self, token: &str) -> Result<(), Self::Error>;

    /// Revokes a live session belonging to the principal. Returns false when no live session with that id belongs
    /// to the principal. Eligibility (cooldowns, primary protection) is the caller's concern.
    async fn revoke_session(&self, user_id: i64, session_id: i64) -> Result<bool, Self::Error>;

    /// Revokes the session holding the given token, regardless of owner. Used by logout.
    async fn revoke_session_by_token(&self, token: &str) -> Result<bool, Self::Error>;

    /// Writes a city/country annotation onto the session row. Fired from the geo-lookup hook, so a failure here
    /// must never affect the session itself.
    async fn annotate_session_geo(
        &self,
        session_id: i64,
        city: Option<&str>,
        country: Option<&str>,
    ) -> Result<(), Self::Error>;
}
