use crate::db_types::{CartLine, DeviceSession, Order};

/// Outcome of adding a line spec to a cart.
#[derive(Debug, Clone)]
pub enum UpsertLineResult {
    /// No line with the same identity key existed. A fresh line was inserted.
    Inserted(CartLine),
    /// A line with the same identity key existed. Its quantity was increased and the display snapshot refreshed.
    Merged(CartLine),
}

impl UpsertLineResult {
    pub fn line(&self) -> &CartLine {
        match self {
            UpsertLineResult::Inserted(line) | UpsertLineResult::Merged(line) => line,
        }
    }

    pub fn was_merged(&self) -> bool {
        matches!(self, UpsertLineResult::Merged(_))
    }
}

/// Outcome of a batch line removal.
#[derive(Debug, Clone)]
pub enum RemoveLinesOutcome {
    /// Every id either belonged to the cart and was deleted, or no longer existed and was skipped. Carries the
    /// number actually deleted.
    Removed(u64),
    /// This id lives in another cart. Nothing was deleted.
    ForeignLine(i64),
}

/// Outcome of registering a device session.
#[derive(Debug, Clone)]
pub enum SessionRegistration {
    /// No live session with the same fingerprint existed. A new registry row was created.
    New(DeviceSession),
    /// A live session with the same fingerprint already existed. It was refreshed instead of duplicated.
    Reused(DeviceSession),
}

impl SessionRegistration {
    pub fn session(&self) -> &DeviceSession {
        match self {
            SessionRegistration::New(s) | SessionRegistration::Reused(s) => s,
        }
    }

    pub fn into_session(self) -> DeviceSession {
        match self {
            SessionRegistration::New(s) | SessionRegistration::Reused(s) => s,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, SessionRegistration::New(_))
    }
}

/// Outcome of a payment confirmation attempt.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    /// The order as it stands after the attempt.
    pub order: Order,
    /// True only for the call that actually performed the Pending → Succeeded transition. Retries and replays see
    /// `false` and must not trigger side effects.
    pub newly_confirmed: bool,
    /// Ids of sibling pending orders that were swept to Canceled by this confirmation.
    pub canceled_siblings: Vec<i64>,
    /// True when the order's promo code was recorded as redeemed by this confirmation.
    pub promo_redeemed: bool,
}
