//! Unified API for principal accounts: registration, email verification, login and guest-order claiming.

use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use rand::Rng;
use regex::Regex;

use crate::{
    db::traits::{IdentityManagement, SessionManagement},
    db_types::{normalize_email, CartKey, DeviceSession, NewUserAccount, Role, UserAccount},
    helpers::{new_token, CART_TOKEN_LEN},
    sce_api::errors::IdentityApiError,
};

/// The acting principal and cart-ownership key derived from the bearers a request carried.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Option<i64>,
    pub session: Option<DeviceSession>,
    pub cart_key: CartKey,
    /// Set when no usable cart token accompanied the request. The caller must persist it client-side; it outlives
    /// the session bearer.
    pub minted_cart_token: Option<String>,
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Password hashing is pluggable so that the engine never commits to a particular KDF. The server supplies an
/// argon2-backed implementation; tests use a cheap one.
pub trait PasswordVerifier: Clone + Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, IdentityApiError>;
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, IdentityApiError>;
}

pub struct IdentityApi<B, V> {
    db: B,
    verifier: V,
    elevated_emails: Vec<String>,
}

impl<B: Debug, V> Debug for IdentityApi<B, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityApi ({:?})", self.db)
    }
}

impl<B, V> IdentityApi<B, V> {
    pub fn new(db: B, verifier: V) -> Self {
        Self { db, verifier, elevated_emails: Vec::new() }
    }

    /// Accounts whose email appears in this list are given the [`Role::Elevated`] role when they verify.
    pub fn with_elevated_emails<I: IntoIterator<Item = String>>(mut self, emails: I) -> Self {
        self.elevated_emails = emails.into_iter().map(|e| normalize_email(&e)).collect();
        self
    }
}

impl<B, V> IdentityApi<B, V>
where
    B: IdentityManagement,
    V: PasswordVerifier,
{
    /// Registers a new account and mints its verification code. The code is returned to the caller so that the
    /// notification layer can deliver it; it is never logged.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<(UserAccount, String), IdentityApiError> {
        let email = normalize_email(email);
        check_email(&email)?;
        if self.fetch_by_email(&email).await?.is_some() {
            return Err(IdentityApiError::EmailTaken(email));
        }
        let hash = self.verifier.hash_password(password)?;
        let mut account = NewUserAccount::new(email.as_str(), hash.as_str());
        if let Some(name) = full_name {
            account = account.with_full_name(name);
        }
        let account =
            self.db.create_account(account, Role::Standard).await.map_err(|e| db_err(e.to_string()))?;
        let code = self.issue_code(account.id).await?;
        info!("🧑️ Registered account #{} ({})", account.id, account.email);
        Ok((account, code))
    }

    /// Re-issues a verification code for an unverified account.
    pub async fn request_verification_code(&self, email: &str) -> Result<(UserAccount, String), IdentityApiError> {
        let email = normalize_email(email);
        let account = self.fetch_by_email(&email).await?.ok_or(IdentityApiError::AccountNotFound)?;
        if account.is_verified() {
            return Err(IdentityApiError::CodeMismatch);
        }
        let code = self.issue_code(account.id).await?;
        Ok((account, code))
    }

    /// Completes verification. The account's role is decided here: emails on the elevated list verify straight
    /// into [`Role::Elevated`].
    pub async fn verify(&self, email: &str, code: &str) -> Result<UserAccount, IdentityApiError> {
        let email = normalize_email(email);
        let account = self.fetch_by_email(&email).await?.ok_or(IdentityApiError::AccountNotFound)?;
        let stored = self
            .db
            .fetch_verification_code(account.id)
            .await
            .map_err(|e| db_err(e.to_string()))?
            .ok_or(IdentityApiError::CodeMismatch)?;
        if stored.code != code {
            return Err(IdentityApiError::CodeMismatch);
        }
        if Utc::now() - stored.created_at > code_ttl() {
            return Err(IdentityApiError::CodeExpired);
        }
        let role = if self.elevated_emails.contains(&email) { Role::Elevated } else { account.role };
        self.db.mark_verified(account.id, role).await.map_err(|e| db_err(e.to_string()))?;
        let account = self
            .db
            .fetch_account_by_id(account.id)
            .await
            .map_err(|e| db_err(e.to_string()))?
            .ok_or(IdentityApiError::AccountNotFound)?;
        Ok(account)
    }

    /// Checks credentials. Unverified and deactivated accounts cannot log in.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserAccount, IdentityApiError> {
        let email = normalize_email(email);
        let Some(account) = self.fetch_by_email(&email).await? else {
            // Burn a verification anyway so that a missing account is not distinguishable by timing.
            let _unused = self.verifier.verify_password(password, DUMMY_HASH);
            return Err(IdentityApiError::InvalidCredentials);
        };
        if !self.verifier.verify_password(password, &account.password_hash)? {
            return Err(IdentityApiError::InvalidCredentials);
        }
        if !account.is_verified() {
            return Err(IdentityApiError::NotVerified);
        }
        debug!("🧑️ Account #{} logged in", account.id);
        Ok(account)
    }

    pub async fn fetch_by_id(&self, user_id: i64) -> Result<Option<UserAccount>, IdentityApiError> {
        self.db.fetch_account_by_id(user_id).await.map_err(|e| db_err(e.to_string()))
    }

    /// Binds ownerless guest orders carrying the token to the account. Returns the number claimed.
    pub async fn claim_guest_orders(&self, user_id: i64, order_token: &str) -> Result<u64, IdentityApiError> {
        let claimed =
            self.db.claim_guest_orders(user_id, order_token).await.map_err(|e| db_err(e.to_string()))?;
        if claimed > 0 {
            info!("🧑️ Account #{user_id} claimed {claimed} guest order(s)");
        }
        Ok(claimed)
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityApiError> {
        let account =
            self.fetch_by_id(user_id).await?.ok_or(IdentityApiError::AccountNotFound)?;
        if !self.verifier.verify_password(old_password, &account.password_hash)? {
            return Err(IdentityApiError::InvalidCredentials);
        }
        let hash = self.verifier.hash_password(new_password)?;
        self.db.update_password_hash(user_id, &hash).await.map_err(|e| db_err(e.to_string()))
    }

    pub async fn deactivate(&self, user_id: i64) -> Result<(), IdentityApiError> {
        self.db.deactivate_account(user_id).await.map_err(|e| db_err(e.to_string()))
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<UserAccount>, IdentityApiError> {
        self.db.fetch_account_by_email(email).await.map_err(|e| db_err(e.to_string()))
    }

    async fn issue_code(&self, user_id: i64) -> Result<String, IdentityApiError> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.db.upsert_verification_code(user_id, &code).await.map_err(|e| db_err(e.to_string()))?;
        Ok(code)
    }
}

impl<B, V> IdentityApi<B, V>
where
    B: IdentityManagement + SessionManagement,
    V: PasswordVerifier,
{
    /// Derives the acting principal from the request bearers. A session bearer that resolves to nothing, to a
    /// revoked session, or to an account that has since been deactivated degrades to anonymous rather than
    /// erroring. A missing cart token is minted here; the caller persists it client-side.
    pub async fn resolve(
        &self,
        session_token: Option<&str>,
        cart_token: Option<&str>,
    ) -> Result<Identity, IdentityApiError> {
        let session = match session_token {
            Some(token) => self
                .db
                .fetch_session_by_token(token)
                .await
                .map_err(|e| db_err(e.to_string()))?
                .filter(|s| s.is_live()),
            None => None,
        };
        let user_id = match &session {
            Some(s) => self.fetch_by_id(s.user_id).await?.filter(|a| !a.is_deactivated()).map(|a| a.id),
            None => None,
        };
        let (token, minted_cart_token) = match cart_token {
            Some(t) if !t.is_empty() => (t.to_string(), None),
            _ => {
                let t = new_token(CART_TOKEN_LEN);
                trace!("🧑️ Minted a cart token for an inbound request");
                (t.clone(), Some(t))
            },
        };
        let cart_key = match user_id {
            Some(id) => CartKey::for_user(id, token),
            None => CartKey::anonymous(token),
        };
        Ok(Identity { user_id, session, cart_key, minted_cart_token })
    }
}

// An argon2 hash of nothing in particular. Verifying against it keeps the failure path the same shape as the
// success path.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$YWJjZGVmZ2hpamts$XtIMEPzcSYLU2UVBhOVzbvI7zW9sLbIQCTLKnDBBtPU";

/// A stale code is rejected; the account can always request a fresh one.
fn code_ttl() -> Duration {
    Duration::minutes(10)
}

fn db_err(msg: String) -> IdentityApiError {
    IdentityApiError::DatabaseError(msg)
}

fn check_email(email: &str) -> Result<(), IdentityApiError> {
    let usable = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(email))
        .unwrap_or(false);
    if usable {
        Ok(())
    } else {
        Err(IdentityApiError::BadEmail(email.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(check_email("shopper@example.com").is_ok());
        assert!(check_email("a@b.co").is_ok());
        assert!(check_email("not-an-email").is_err());
        assert!(check_email("two@at@signs.com").is_err());
        assert!(check_email("spaces in@mail.com").is_err());
    }
}
