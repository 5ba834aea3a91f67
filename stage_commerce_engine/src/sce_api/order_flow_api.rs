//! `OrderFlowApi` is the primary API for the checkout and payment-confirmation flows.

use std::fmt::Debug;

use chrono::Duration;
use log::*;

use crate::{
    db::traits::{CartManagement, ConfirmOutcome, OrderManagement},
    db_types::{ContactInfo, NewOrder, NewOrderLine, Order},
    events::{DeliveryRequestedEvent, EventProducers, OrderConfirmedEvent},
    helpers::{new_token, ORDER_TOKEN_LEN},
    sce_api::{errors::OrderFlowApiError, order_objects::{OrderWithLines, PaymentReference}},
};

/// How far back the last-resort confirmation resolution is allowed to reach for the principal's most recent
/// unconfirmed order.
pub fn fallback_window() -> Duration {
    Duration::hours(1)
}

pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement + CartManagement
{
    /// Creates a `Pending` order from the cart's active (non-postponed) lines, or from the chosen subset when
    /// `line_ids` is given. The cart itself is left untouched until the payment is confirmed. Returns the order,
    /// whose token the caller must hand to the paying client.
    pub async fn checkout(
        &self,
        cart_id: i64,
        user_id: Option<i64>,
        contact: ContactInfo,
        promo_code: Option<String>,
        line_ids: Option<&[i64]>,
    ) -> Result<Order, OrderFlowApiError> {
        if line_ids.is_some_and(|ids| ids.is_empty()) {
            return Err(OrderFlowApiError::EmptyCart);
        }
        let lines = self
            .db
            .fetch_cart_lines(cart_id)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        let purchasable: Vec<NewOrderLine> = lines
            .iter()
            .filter(|l| !l.postponed)
            .filter(|l| line_ids.map_or(true, |ids| ids.contains(&l.id)))
            .filter_map(NewOrderLine::from_cart_line)
            .collect();
        if purchasable.is_empty() {
            return Err(OrderFlowApiError::EmptyCart);
        }
        let mut order = NewOrder::new(user_id, contact, purchasable);
        if let Some(code) = promo_code {
            order = order.with_promo_code(code);
        }
        // A code the principal has already redeemed is rejected up front rather than silently dropped at
        // confirmation time.
        if let (Some(code), Some(uid)) = (&order.promo_code, user_id) {
            let redeemed = self
                .db
                .is_promo_redeemed(code, uid)
                .await
                .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
            if redeemed {
                return Err(OrderFlowApiError::PromoAlreadyRedeemed(code.clone()));
            }
        }
        let token = new_token(ORDER_TOKEN_LEN);
        let order = self
            .db
            .insert_order(order, &token)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        info!("🔄️📦️ Checkout created order #{} for {}", order.id, order.total);
        Ok(order)
    }

    /// Resolves which order a payment confirmation refers to. The token wins over the id, the id wins over the
    /// principal's most recent unconfirmed order, and the fallback never reaches further back than
    /// [`fallback_window`]. Both the token and the id resolve an owned order only for its owner.
    pub async fn resolve_payment_target(&self, reference: &PaymentReference) -> Result<Order, OrderFlowApiError> {
        if let Some(token) = &reference.order_token {
            if let Some(order) = self
                .db
                .fetch_order_by_token(token)
                .await
                .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?
            {
                // Possessing the token is only proof of ownership for guest orders. Once an order belongs to an
                // account, its token counts for that account alone, and anyone else gets the missing-order answer.
                if order.user_id.is_none() || order.user_id == reference.user_id {
                    return Ok(order);
                }
                debug!("🔄️✅️ An order token was presented by a principal who does not own the order");
                return Err(OrderFlowApiError::NoResolutionTarget);
            }
        }
        if let Some(order_id) = reference.order_id {
            if let Some(order) = self
                .db
                .fetch_order_by_id(order_id)
                .await
                .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?
            {
                // An id hint only counts for the order's owner. Anyone else gets the same answer as a missing
                // order, so existence is never leaked. Guest orders are confirmed by token, never by id.
                if order.user_id.is_some() && order.user_id == reference.user_id {
                    return Ok(order);
                }
                debug!("🔄️✅️ Order id hint #{order_id} did not match the requesting principal");
                return Err(OrderFlowApiError::NoResolutionTarget);
            }
        }
        if let Some(user_id) = reference.user_id {
            if let Some(order) = self
                .db
                .fetch_last_unconfirmed_order(user_id, fallback_window())
                .await
                .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?
            {
                debug!("🔄️✅️ Confirmation fell back to order #{} for account #{user_id}", order.id);
                return Ok(order);
            }
        }
        Err(OrderFlowApiError::NoResolutionTarget)
    }

    /// Confirms a payment. Safe to call any number of times for the same order: only the call that wins the
    /// Pending → Succeeded transition purges the cart, and only that call notifies the order-confirmed hook.
    pub async fn confirm_payment(&self, reference: PaymentReference) -> Result<ConfirmOutcome, OrderFlowApiError> {
        let target = self.resolve_payment_target(&reference).await?;
        let outcome = self
            .db
            .confirm_order(target.id)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        if !outcome.newly_confirmed {
            debug!("🔄️✅️ Redundant confirmation for order #{}. Nothing to do.", target.id);
            return Ok(outcome);
        }
        if let Err(e) = self.purge_cart_after_purchase(&outcome.order, reference.cart_token.as_deref()).await {
            // The order is confirmed; a stale cart is an annoyance, not a reason to fail the confirmation.
            warn!("🔄️✅️ Could not purge cart after confirming order #{}: {e}", outcome.order.id);
        }
        self.call_order_confirmed_hook(&outcome).await;
        Ok(outcome)
    }

    async fn purge_cart_after_purchase(
        &self,
        order: &Order,
        cart_token: Option<&str>,
    ) -> Result<(), OrderFlowApiError> {
        let cart = match order.user_id {
            Some(user_id) => self
                .db
                .fetch_cart_for_user(user_id)
                .await
                .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?,
            None => match cart_token {
                Some(token) => self
                    .db
                    .fetch_cart_by_token(token)
                    .await
                    .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?,
                None => None,
            },
        };
        let Some(cart) = cart else {
            return Ok(());
        };
        let purchased = self
            .db
            .fetch_order_lines(order.id)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        self.db
            .purge_purchased_lines(cart.id, &purchased)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub async fn order_by_token(&self, token: &str) -> Result<Option<Order>, OrderFlowApiError> {
        self.db.fetch_order_by_token(token).await.map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))
    }

    pub async fn pending_order(&self, user_id: i64) -> Result<Option<Order>, OrderFlowApiError> {
        self.db.fetch_pending_order(user_id).await.map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))
    }

    pub async fn order_history(&self, user_id: i64) -> Result<Vec<OrderWithLines>, OrderFlowApiError> {
        let orders = self
            .db
            .fetch_orders_for_user(user_id)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let lines = self
                .db
                .fetch_order_lines(order.id)
                .await
                .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
            result.push(OrderWithLines { order, lines });
        }
        Ok(result)
    }

    /// Records the delivery slot on a confirmed order belonging to the principal and notifies the delivery hook.
    pub async fn request_delivery(
        &self,
        user_id: i64,
        order_id: i64,
        slot: &str,
    ) -> Result<Order, OrderFlowApiError> {
        let order = self
            .db
            .fetch_order_by_id(order_id)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?
            .ok_or(OrderFlowApiError::OrderNotFound)?;
        if order.user_id != Some(user_id) {
            return Err(OrderFlowApiError::OrderNotFound);
        }
        if order.status != crate::db_types::OrderStatusType::Succeeded {
            return Err(OrderFlowApiError::DeliveryNotAllowed(format!(
                "order #{order_id} is {}, not Succeeded",
                order.status
            )));
        }
        self.db
            .set_delivery_slot(order_id, slot)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?;
        let order = self
            .db
            .fetch_order_by_id(order_id)
            .await
            .map_err(|e| OrderFlowApiError::DatabaseError(e.to_string()))?
            .ok_or(OrderFlowApiError::OrderNotFound)?;
        self.call_delivery_requested_hook(&order, slot).await;
        Ok(order)
    }

    async fn call_order_confirmed_hook(&self, outcome: &ConfirmOutcome) {
        for emitter in &self.producers.order_confirmed_producer {
            debug!("🔄️📦️ Notifying order confirmed hook subscribers");
            let event = OrderConfirmedEvent::new(outcome.order.clone(), outcome.canceled_siblings.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_delivery_requested_hook(&self, order: &Order, slot: &str) {
        for emitter in &self.producers.delivery_requested_producer {
            let event = DeliveryRequestedEvent { order: order.clone(), slot: slot.to_string() };
            emitter.publish_event(event).await;
        }
    }
}
