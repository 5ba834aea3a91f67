use super::data_objects::{RemoveLinesOutcome, UpsertLineResult};
use crate::db_types::{Cart, CartKey, CartLine, LinePatch, LineSpec, OrderLine};

/// Behaviour for resolving carts and mutating their lines.
///
/// Resolution order is fixed: the principal's cart wins over the token's cart, and an anonymous cart reached by
/// token is adopted by the principal the first time the two appear together.
#[allow(async_fn_in_trait)]
pub trait CartManagement: Clone {
    type Error: std::error::Error;

    /// In a single atomic transaction, resolves the cart for the given key:
    /// * If the key carries a principal and that principal owns a cart, that cart is returned. The token in the key
    ///   is ignored.
    /// * Otherwise, if a cart exists for the key's token: when it is anonymous and the key carries a principal, the
    ///   cart is adopted (its `user_id` set) before being returned. A token cart already owned by a *different*
    ///   principal is never re-bound; a fresh cart is created instead.
    /// * Otherwise a new empty cart is created for the key.
    async fn resolve_or_create_cart(&self, key: &CartKey) -> Result<Cart, Self::Error>;

    /// Fetches the cart owned by the principal, without creating one.
    async fn fetch_cart_for_user(&self, user_id: i64) -> Result<Option<Cart>, Self::Error>;

    /// Fetches the cart holding the given token, without creating one.
    async fn fetch_cart_by_token(&self, token: &str) -> Result<Option<Cart>, Self::Error>;

    /// All lines of the cart, newest first.
    async fn fetch_cart_lines(&self, cart_id: i64) -> Result<Vec<CartLine>, Self::Error>;

    /// In a single atomic transaction, adds the spec to the cart. If a line with the same identity key (variant id,
    /// or (product id, size label) for non-variant lines) already exists, its quantity is increased by the spec's
    /// and its display snapshot refreshed; otherwise a new line is inserted. Two concurrent upserts of the same key
    /// must yield one line with the summed quantity.
    async fn upsert_cart_line(&self, cart_id: i64, spec: LineSpec) -> Result<UpsertLineResult, Self::Error>;

    /// Applies the patch to a line of the cart. Quantities are clamped to a minimum of 1. Returns the updated line,
    /// or `None` when the line does not exist or belongs to another cart.
    async fn update_cart_line(
        &self,
        cart_id: i64,
        line_id: i64,
        patch: LinePatch,
    ) -> Result<Option<CartLine>, Self::Error>;

    /// In a single atomic transaction, deletes the given lines from the cart. Ids with no line behind them are
    /// skipped, so a retried delete changes nothing. An id that lives in a *different* cart aborts the whole
    /// batch: nothing is deleted and [`RemoveLinesOutcome::ForeignLine`] names the offender.
    async fn remove_cart_lines(&self, cart_id: i64, line_ids: &[i64]) -> Result<RemoveLinesOutcome, Self::Error>;

    /// Deletes every line of the cart, returning the number removed.
    async fn clear_cart(&self, cart_id: i64) -> Result<u64, Self::Error>;

    /// In a single atomic transaction, removes the purchased quantities from the cart after a confirmed checkout.
    /// For each purchased line: if its cart-line back-reference still resolves, that line is deleted outright;
    /// otherwise the cart line matching (product id, size label) has its quantity reduced by the purchased amount,
    /// and is deleted when nothing remains. Lines with no surviving match are skipped silently. Returns the number
    /// of cart lines deleted.
    async fn purge_purchased_lines(&self, cart_id: i64, purchased: &[OrderLine]) -> Result<u64, Self::Error>;
}
