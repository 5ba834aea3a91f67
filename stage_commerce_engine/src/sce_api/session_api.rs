//! The device-session registry API: fingerprint dedup, the primary flag, and cooldown-gated revocation.

use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db::traits::{SessionManagement, SessionRegistration},
    db_types::{DeviceSession, NewDeviceSession, SessionFingerprint},
    events::{EventProducers, SessionCreatedEvent},
    helpers::{new_token, SESSION_TOKEN_LEN},
    sce_api::{
        errors::SessionApiError,
        session_objects::{SessionInfo, SessionOverview},
    },
};

/// Registry policy knobs. There is exactly one cooldown; everything that gates revocation reads it from here.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// How long a session must have existed before its owner may revoke it.
    pub revoke_cooldown: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self { revoke_cooldown: Duration::hours(24) }
    }
}

pub struct SessionApi<B> {
    db: B,
    policy: SessionPolicy,
    producers: EventProducers,
}

impl<B: Debug> Debug for SessionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionApi ({:?})", self.db)
    }
}

impl<B> SessionApi<B> {
    pub fn new(db: B, policy: SessionPolicy, producers: EventProducers) -> Self {
        Self { db, policy, producers }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }
}

impl<B> SessionApi<B>
where B: SessionManagement
{
    /// Opens a session for the principal on the fingerprinted device. A live session with the same fingerprint is
    /// reissued a token instead of duplicated; only a genuinely new registry row notifies the session-created hook.
    pub async fn start_session(
        &self,
        user_id: i64,
        fingerprint: SessionFingerprint,
    ) -> Result<DeviceSession, SessionApiError> {
        let token = new_token(SESSION_TOKEN_LEN);
        let session = NewDeviceSession::new(user_id, token, fingerprint);
        let registration = self
            .db
            .register_session(session)
            .await
            .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?;
        match &registration {
            SessionRegistration::New(s) => {
                debug!("🖥️ New session #{} for account #{user_id} (primary: {})", s.id, s.is_primary);
                self.call_session_created_hook(s).await;
            },
            SessionRegistration::Reused(s) => {
                trace!("🖥️ Account #{user_id} resumed session #{} from a known device", s.id);
            },
        }
        Ok(registration.into_session())
    }

    /// Resolves a bearer token to its live session, refreshing the last-seen timestamp. Revoked sessions fail with
    /// [`SessionApiError::SessionRevoked`].
    pub async fn authenticate(&self, token: &str) -> Result<DeviceSession, SessionApiError> {
        let session = self
            .db
            .fetch_session_by_token(token)
            .await
            .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?
            .ok_or(SessionApiError::SessionNotFound)?;
        if !session.is_live() {
            return Err(SessionApiError::SessionRevoked);
        }
        self.db.touch_session(token).await.map_err(|e| SessionApiError::DatabaseError(e.to_string()))?;
        Ok(session)
    }

    /// The account-security listing. The presented bearer is resolved to the caller's own session first; a bearer
    /// that resolves to nothing gets a session registered on the spot so the list always carries a "current" entry.
    /// Live sessions sharing a fingerprint are collapsed to the most recently seen row, the stale twins revoked
    /// (the current session always survives). The current session is pinned first regardless of recency.
    pub async fn list_sessions(
        &self,
        user_id: i64,
        current_token: Option<&str>,
        fingerprint: SessionFingerprint,
    ) -> Result<SessionOverview, SessionApiError> {
        let existing = match current_token {
            Some(token) => self
                .db
                .fetch_session_by_token(token)
                .await
                .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?
                .filter(|s| s.is_live() && s.user_id == user_id),
            None => None,
        };
        let (current, token_minted) = match existing {
            Some(s) => (s, false),
            None => {
                debug!("🖥️ No live session for the presented bearer; registering one for account #{user_id}");
                (self.start_session(user_id, fingerprint).await?, true)
            },
        };

        // fetch_live_sessions returns last-seen descending, so the first row per fingerprint is the keeper.
        let live = self
            .db
            .fetch_live_sessions(user_id)
            .await
            .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?;
        let mut kept: Vec<DeviceSession> = Vec::with_capacity(live.len());
        let mut seen_keys: Vec<String> = Vec::new();
        for session in live {
            let key = session.fingerprint_key();
            if !seen_keys.contains(&key) {
                seen_keys.push(key);
                kept.push(session);
            } else if session.id == current.id {
                // The current session is never revoked, even when a more recent twin exists.
                kept.push(session);
            } else {
                warn!("🖥️ Retiring stale duplicate session #{} for account #{user_id}", session.id);
                self.db
                    .revoke_session(user_id, session.id)
                    .await
                    .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?;
            }
        }
        if let Some(pos) = kept.iter().position(|s| s.id == current.id) {
            let cur = kept.remove(pos);
            kept.insert(0, cur);
        }

        let (can_revoke_others, cooldown_hours_left) = self.revocation_standing(&current);
        let sessions = kept.iter().map(|s| SessionInfo::from_session(s, current.id)).collect();
        Ok(SessionOverview { sessions, current, token_minted, can_revoke_others, cooldown_hours_left })
    }

    /// Revokes another of the principal's sessions. A session may not revoke itself through this path (logout is
    /// for that), and a freshly created session must wait out the cooldown before it can lock out other devices,
    /// unless it is the account's primary session.
    pub async fn revoke_other(
        &self,
        user_id: i64,
        current_token: &str,
        target_id: i64,
    ) -> Result<(), SessionApiError> {
        let current = self
            .db
            .fetch_session_by_token(current_token)
            .await
            .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?
            .filter(|s| s.is_live() && s.user_id == user_id)
            .ok_or(SessionApiError::SessionNotFound)?;
        if current.id == target_id {
            return Err(SessionApiError::SelfRevocation);
        }
        let (eligible, hours_left) = self.revocation_standing(&current);
        if !eligible {
            return Err(SessionApiError::CooldownActive(hours_left));
        }
        let revoked = self
            .db
            .revoke_session(user_id, target_id)
            .await
            .map_err(|e| SessionApiError::DatabaseError(e.to_string()))?;
        if !revoked {
            return Err(SessionApiError::SessionNotFound);
        }
        info!("🖥️ Account #{user_id} revoked session #{target_id} from session #{}", current.id);
        Ok(())
    }

    /// Whether the given session may revoke other devices, and if not, how many hours remain (rounded up).
    /// Primary sessions are exempt from the cooldown.
    fn revocation_standing(&self, current: &DeviceSession) -> (bool, i64) {
        if current.is_primary {
            return (true, 0);
        }
        let eligible_at = current.created_at + self.policy.revoke_cooldown;
        let now = Utc::now();
        if now >= eligible_at {
            (true, 0)
        } else {
            let hours = ((eligible_at - now).num_minutes() + 59) / 60;
            (false, hours.max(1))
        }
    }

    /// Ends the session holding the token. Logout has no cooldown.
    pub async fn logout(&self, token: &str) -> Result<bool, SessionApiError> {
        self.db.revoke_session_by_token(token).await.map_err(|e| SessionApiError::DatabaseError(e.to_string()))
    }

    /// Records a city/country annotation for the session. Called from the geo-lookup hook after the session already
    /// exists, so the lookup result is purely advisory.
    pub async fn annotate_geo(
        &self,
        session_id: i64,
        city: Option<&str>,
        country: Option<&str>,
    ) -> Result<(), SessionApiError> {
        self.db
            .annotate_session_geo(session_id, city, country)
            .await
            .map_err(|e| SessionApiError::DatabaseError(e.to_string()))
    }

    async fn call_session_created_hook(&self, session: &DeviceSession) {
        for emitter in &self.producers.session_created_producer {
            emitter.publish_event(SessionCreatedEvent::new(session.clone())).await;
        }
    }
}
