//! Cookie-based identity plumbing.
//!
//! Identity travels as independent opaque cookies: the session bearer ([`SESSION_COOKIE`]), the cart token
//! ([`CART_COOKIE`]) and, for guest checkouts, an order bearer ([`ORDER_COOKIE`]). The [`RequestIdentity`]
//! extractor only reads the raw values; resolving them against the store is the handlers' job, via
//! [`IdentityApi::resolve`](stage_commerce_engine::IdentityApi::resolve).

use std::future::{ready, Ready};

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    dev::Payload,
    FromRequest,
    HttpRequest,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Argon2,
};
use stage_commerce_engine::{IdentityApiError, PasswordVerifier};

pub const SESSION_COOKIE: &str = "stg_session";
pub const CART_COOKIE: &str = "stg_cart";
pub const ORDER_COOKIE: &str = "stg_order";

const SESSION_COOKIE_DAYS: i64 = 30;
const CART_COOKIE_DAYS: i64 = 180;
const ORDER_COOKIE_DAYS: i64 = 7;

/// The raw bearers a request carried. Extraction never fails; absent cookies are simply `None`.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub session_token: Option<String>,
    pub cart_token: Option<String>,
    pub order_token: Option<String>,
}

impl RequestIdentity {
    pub fn from_http_request(req: &HttpRequest) -> Self {
        let value = |name: &str| req.cookie(name).map(|c| c.value().to_string()).filter(|v| !v.is_empty());
        Self {
            session_token: value(SESSION_COOKIE),
            cart_token: value(CART_COOKIE),
            order_token: value(ORDER_COOKIE),
        }
    }
}

impl FromRequest for RequestIdentity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(Self::from_http_request(req)))
    }
}

fn bearer_cookie(name: &'static str, value: String, days: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::days(days))
        .finish()
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    bearer_cookie(SESSION_COOKIE, token, SESSION_COOKIE_DAYS)
}

/// The cart token outlives the session bearer on purpose: an anonymous cart must survive a logout.
pub fn cart_cookie(token: String) -> Cookie<'static> {
    bearer_cookie(CART_COOKIE, token, CART_COOKIE_DAYS)
}

pub fn order_cookie(token: String) -> Cookie<'static> {
    bearer_cookie(ORDER_COOKIE, token, ORDER_COOKIE_DAYS)
}

pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

/// The production password hasher behind the engine's [`PasswordVerifier`] seam.
#[derive(Clone, Default)]
pub struct Argon2Verifier;

impl PasswordVerifier for Argon2Verifier {
    fn hash_password(&self, password: &str) -> Result<String, IdentityApiError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| IdentityApiError::PasswordHashError(e.to_string()))
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, IdentityApiError> {
        let parsed = PasswordHash::new(hash).map_err(|e| IdentityApiError::PasswordHashError(e.to_string()))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    }
}
