//! # Database management and control.
//!
//! This module provides the interface contracts that storage backends must implement to drive the engine, plus the
//! Sqlite implementation of those contracts.
//!
//! ## Traits
//! * [`traits::IdentityManagement`] — accounts, verification codes and guest-order claiming.
//! * [`traits::CartManagement`] — cart resolution, line upserts/patches and post-purchase purging.
//! * [`traits::OrderManagement`] — order creation and the confirmation state machine.
//! * [`traits::SessionManagement`] — the device-session registry.
//!
//! All mutating operations that the contracts describe as atomic are carried out inside a single database
//! transaction by the backend.
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
