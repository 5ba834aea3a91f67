//! Unified API for resolving carts and mutating their lines.

use std::fmt::Debug;

use log::*;

use crate::{
    db::traits::{CartManagement, RemoveLinesOutcome, UpsertLineResult},
    db_types::{Cart, CartKey, CartLine, LinePatch, LineSpec},
    events::{CartLineAddedEvent, EventProducers},
    sce_api::errors::CartApiError,
};

pub struct CartApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B: Debug> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi ({:?})", self.db)
    }
}

impl<B> CartApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> CartApi<B>
where B: CartManagement
{
    /// Resolves the cart for the key, creating one if needed. An anonymous cart reached by token is adopted by the
    /// key's principal here.
    pub async fn resolve_cart(&self, key: &CartKey) -> Result<Cart, CartApiError> {
        self.db.resolve_or_create_cart(key).await.map_err(|e| CartApiError::DatabaseError(e.to_string()))
    }

    pub async fn cart_with_lines(&self, key: &CartKey) -> Result<(Cart, Vec<CartLine>), CartApiError> {
        let cart = self.resolve_cart(key).await?;
        let lines = self.lines(cart.id).await?;
        Ok((cart, lines))
    }

    pub async fn lines(&self, cart_id: i64) -> Result<Vec<CartLine>, CartApiError> {
        self.db.fetch_cart_lines(cart_id).await.map_err(|e| CartApiError::DatabaseError(e.to_string()))
    }

    /// Adds the spec to the resolved cart, merging into an existing line with the same identity key if there is
    /// one. Subscribers to the cart-line-added hook are notified either way.
    pub async fn add_line(&self, key: &CartKey, spec: LineSpec) -> Result<(Cart, UpsertLineResult), CartApiError> {
        let cart = self.resolve_cart(key).await?;
        let result = self
            .db
            .upsert_cart_line(cart.id, spec)
            .await
            .map_err(|e| CartApiError::DatabaseError(e.to_string()))?;
        trace!("🔄️🛒️ Cart #{}: line #{} now at quantity {}", cart.id, result.line().id, result.line().quantity);
        self.call_line_added_hook(&cart, &result).await;
        Ok((cart, result))
    }

    pub async fn update_line(
        &self,
        cart_id: i64,
        line_id: i64,
        patch: LinePatch,
    ) -> Result<CartLine, CartApiError> {
        if patch.is_empty() {
            return Err(CartApiError::EmptyPatch);
        }
        self.db
            .update_cart_line(cart_id, line_id, patch)
            .await
            .map_err(|e| CartApiError::DatabaseError(e.to_string()))?
            .ok_or(CartApiError::LineNotFound(line_id))
    }

    /// Deletes a line from the cart. Removing a line that is already gone is a quiet no-op, so retried deletes
    /// converge; a line id that lives in another cart is rejected as not found.
    pub async fn remove_line(&self, cart_id: i64, line_id: i64) -> Result<(), CartApiError> {
        self.remove_lines(cart_id, &[line_id]).await.map(|_| ())
    }

    /// Batch form of [`remove_line`](Self::remove_line). A single foreign id aborts the whole batch with nothing
    /// deleted; absent ids are skipped. Returns the number of lines actually deleted.
    pub async fn remove_lines(&self, cart_id: i64, line_ids: &[i64]) -> Result<u64, CartApiError> {
        let outcome = self
            .db
            .remove_cart_lines(cart_id, line_ids)
            .await
            .map_err(|e| CartApiError::DatabaseError(e.to_string()))?;
        match outcome {
            RemoveLinesOutcome::Removed(deleted) => Ok(deleted),
            RemoveLinesOutcome::ForeignLine(id) => Err(CartApiError::LineNotFound(id)),
        }
    }

    pub async fn clear(&self, cart_id: i64) -> Result<u64, CartApiError> {
        self.db.clear_cart(cart_id).await.map_err(|e| CartApiError::DatabaseError(e.to_string()))
    }

    async fn call_line_added_hook(&self, cart: &Cart, result: &UpsertLineResult) {
        for emitter in &self.producers.cart_line_added_producer {
            let event = CartLineAddedEvent {
                cart_id: cart.id,
                line: result.line().clone(),
                merged: result.was_merged(),
            };
            emitter.publish_event(event).await;
        }
    }
}
