use chrono::Duration;

use super::data_objects::ConfirmOutcome;
use crate::db_types::{NewOrder, Order, OrderLine};

/// Behaviour for creating orders and driving the Pending → Succeeded/Canceled state machine.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    type Error: std::error::Error;

    /// In a single atomic transaction, stores the order and its line snapshots. The order starts as `Pending`, with
    /// no public number and no paid timestamp, and carries the given bearer token.
    async fn insert_order(&self, order: NewOrder, token: &str) -> Result<Order, Self::Error>;

    async fn fetch_order_by_id(&self, order_id: i64) -> Result<Option<Order>, Self::Error>;

    /// Fetches an order by its bearer token.
    async fn fetch_order_by_token(&self, token: &str) -> Result<Option<Order>, Self::Error>;

    /// The principal's most recent order that has not succeeded, provided it was created within `max_age`. Used as
    /// a last-resort resolution target when a confirmation arrives with no usable token or id.
    async fn fetch_last_unconfirmed_order(
        &self,
        user_id: i64,
        max_age: Duration,
    ) -> Result<Option<Order>, Self::Error>;

    /// The principal's most recent `Pending` order, if any.
    async fn fetch_pending_order(&self, user_id: i64) -> Result<Option<Order>, Self::Error>;

    /// In a single atomic transaction, attempts the Pending → Succeeded transition:
    /// * The status update is conditional on the order still being `Pending`; only the call that wins that
    ///   condition reports `newly_confirmed` and may trigger side effects. Terminal orders never move again.
    /// * On the winning call, the paid timestamp is set, a public number is assigned if the order has none, every
    ///   sibling `Pending` order of the same principal is swept to `Canceled`, and the order's promo code (if any,
    ///   and if the order has an owner) is recorded as redeemed unless that (code, principal) pair was already
    ///   redeemed.
    /// * A replay against a `Succeeded` order changes nothing and reports `newly_confirmed = false`.
    ///
    /// Returns an error when the order does not exist.
    async fn confirm_order(&self, order_id: i64) -> Result<ConfirmOutcome, Self::Error>;

    /// All orders belonging to the principal, newest first.
    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, Self::Error>;

    /// The stored line snapshots of an order.
    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, Self::Error>;

    /// Records the chosen delivery slot on the order.
    async fn set_delivery_slot(&self, order_id: i64, slot: &str) -> Result<(), Self::Error>;

    /// True when the (promo code, principal) pair has already been redeemed.
    async fn is_promo_redeemed(&self, code: &str, user_id: i64) -> Result<bool, Self::Error>;
}
