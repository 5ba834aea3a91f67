//! # Stage commerce engine public API
//!
//! The `sce_api` module exposes the programmatic API for the commerce engine. The API is modular, so that clients
//! can pick and choose the functionality they want, or run different parts (e.g. identity and orders) on different
//! machines.
//!
//! * [`identity_api`] manages principal accounts: registration, email verification, login, and binding guest orders
//!   to the account that presents the matching token.
//! * [`cart_api`] resolves carts and mutates their lines.
//! * [`order_flow_api`] is the primary API for the checkout and payment-confirmation flows.
//! * [`session_api`] is the device-session registry.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements the specific backend traits required by the API.
//!
//! ```rust,ignore
//! use stage_commerce_engine::{CartApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/store.db", 5).await?;
//! // SqliteDatabase implements CartManagement
//! let api = CartApi::new(db, producers);
//! let cart = api.resolve_cart(&key).await?;
//! ```

pub mod cart_api;
pub mod errors;
pub mod identity_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod session_api;
pub mod session_objects;
