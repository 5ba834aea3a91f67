//! Stage Commerce Engine
//!
//! The engine owns the storefront's identity-and-order reconciliation core: how an anonymous cart becomes
//! attributable to an account, how a checkout attempt becomes a durable order, how payment confirmation stays
//! idempotent under retries, and how concurrent device sessions are tracked and revoked.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). Sqlite is the supported backend. You should never need to
//!    access the database directly; use the public API instead. The exception is the data types used in the
//!    database, defined in the public `db_types` module.
//! 2. The engine public API ([`mod@sce_api`]). One API struct per reconciliation concern: [`IdentityApi`],
//!    [`CartApi`], [`OrderFlowApi`] and [`SessionApi`]. Backends implement the traits in [`mod@db`] to drive them.
//!
//! The engine also emits events for its fire-and-forget collaborators (order notifications, analytics, geo
//! annotation). A simple actor framework lets callers hook into these events without coupling core correctness
//! to external-call latency or failure.
mod db;

pub mod db_types;
pub mod events;
pub mod helpers;
mod sce_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits::{
    CartManagement,
    ConfirmOutcome,
    IdentityManagement,
    OrderManagement,
    RemoveLinesOutcome,
    SessionManagement,
    SessionRegistration,
    UpsertLineResult,
};
pub use sce_api::{
    cart_api::CartApi,
    errors::{CartApiError, IdentityApiError, OrderFlowApiError, SessionApiError},
    identity_api::{Identity, IdentityApi, PasswordVerifier},
    order_flow_api::OrderFlowApi,
    order_objects,
    session_api::{SessionApi, SessionPolicy},
    session_objects,
};
