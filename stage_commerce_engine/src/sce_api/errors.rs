use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum IdentityApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} is already registered")]
    EmailTaken(String),
    #[error("Not a usable email address: {0}")]
    BadEmail(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Verification code does not match")]
    CodeMismatch,
    #[error("The verification code has expired. Request a new one")]
    CodeExpired,
    #[error("The account has not been verified yet")]
    NotVerified,
    #[error("Password hashing error: {0}")]
    PasswordHashError(String),
}

#[derive(Debug, Clone, Error)]
pub enum CartApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Cart line not found: {0}")]
    LineNotFound(i64),
    #[error("The patch contains no changes")]
    EmptyPatch,
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order not found")]
    OrderNotFound,
    #[error("The cart has nothing to check out")]
    EmptyCart,
    #[error("No order could be resolved for this payment confirmation")]
    NoResolutionTarget,
    #[error("Promo code {0} has already been redeemed")]
    PromoAlreadyRedeemed(String),
    #[error("Delivery cannot be scheduled: {0}")]
    DeliveryNotAllowed(String),
}

#[derive(Debug, Clone, Error)]
pub enum SessionApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Session not found")]
    SessionNotFound,
    #[error("The session has been revoked")]
    SessionRevoked,
    #[error("This session is too new to manage other devices. Try again in about {0} hour(s)")]
    CooldownActive(i64),
    #[error("A session cannot revoke itself. Log out instead")]
    SelfRevocation,
}
