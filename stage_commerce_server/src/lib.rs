//! # Stage commerce server
//! The HTTP surface over the storefront reconciliation engine. It is responsible for:
//! * Turning request-carried cookies into an acting principal and a cart key.
//! * Exposing the cart, checkout, payment-confirmation, order-history and session-registry operations.
//! * Wiring the fire-and-forget integrations (notification webhook, geo lookup) into the engine's event hooks.
//!
//! ## Configuration
//! The server is configured via `STG_*` environment variables. See [config](config/index.html).

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod routes;
pub mod server;
