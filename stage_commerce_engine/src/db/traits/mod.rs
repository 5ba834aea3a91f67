//! # Storage backend contracts.
//!
//! These traits define what a database backend must provide for the engine to run on top of it.
//!
//! * [`IdentityManagement`] — principal accounts, email verification codes, and binding guest orders to the account
//!   that presents the matching order token.
//! * [`CartManagement`] — cart resolution (including adopting an anonymous cart at login), line upserts/patches, and
//!   purging purchased lines after a confirmed checkout.
//! * [`OrderManagement`] — order creation and the Pending → Succeeded/Canceled state machine.
//! * [`SessionManagement`] — the device-session registry: fingerprint dedup, the primary flag, and revocation.
//!
//! Every method documented as atomic must run inside a single backend transaction.
mod cart_management;
mod identity_management;
mod order_management;
mod session_management;

mod data_objects;

pub use cart_management::CartManagement;
pub use data_objects::{ConfirmOutcome, RemoveLinesOutcome, SessionRegistration, UpsertLineResult};
pub use identity_management::IdentityManagement;
pub use order_management::OrderManagement;
pub use session_management::SessionManagement;
