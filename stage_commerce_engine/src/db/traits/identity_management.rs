use crate::db_types::{NewUserAccount, Role, UserAccount, VerificationCode};

/// Behaviour for managing principal accounts and the artefacts that hang off them: email verification codes and
/// guest orders waiting to be claimed.
#[allow(async_fn_in_trait)]
pub trait IdentityManagement: Clone {
    type Error: std::error::Error;

    /// The URL of the database.
    fn url(&self) -> &str;

    /// Creates a new account. The email must not already be registered; backends return an error when it is.
    async fn create_account(&self, account: NewUserAccount, role: Role) -> Result<UserAccount, Self::Error>;

    /// Fetches an account by its normalised email. `None` if no such account exists.
    async fn fetch_account_by_email(&self, email: &str) -> Result<Option<UserAccount>, Self::Error>;

    /// Fetches an account by id. `None` if no such account exists.
    async fn fetch_account_by_id(&self, user_id: i64) -> Result<Option<UserAccount>, Self::Error>;

    /// Stores (or replaces) the pending verification code for the account.
    async fn upsert_verification_code(&self, user_id: i64, code: &str) -> Result<(), Self::Error>;

    /// Fetches the pending verification code for the account, if any.
    async fn fetch_verification_code(&self, user_id: i64) -> Result<Option<VerificationCode>, Self::Error>;

    /// In a single atomic transaction, marks the account verified, sets its role, and deletes the pending
    /// verification code.
    async fn mark_verified(&self, user_id: i64, role: Role) -> Result<(), Self::Error>;

    /// Replaces the account's stored password hash.
    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), Self::Error>;

    /// Soft-deletes the account. Lookups by email treat a deactivated account as absent for login purposes, but the
    /// row and its history are kept.
    async fn deactivate_account(&self, user_id: i64) -> Result<(), Self::Error>;

    /// Binds every order carrying the given guest token and no owner to the account. Orders that already have an
    /// owner are never re-bound. Returns the number of orders claimed.
    async fn claim_guest_orders(&self, user_id: i64, order_token: &str) -> Result<u64, Self::Error>;
}
