use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderLine};

/// An order together with its stored line snapshots, as handed to history views.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// The references a payment confirmation may carry. Resolution tries them strictly in field order: the order
/// token, then the order id, then the principal's most recent unconfirmed order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentReference {
    pub order_token: Option<String>,
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    /// The anonymous cart token, when the paying client holds one. Used only to purge the purchased lines from a
    /// guest cart after confirmation.
    pub cart_token: Option<String>,
}

impl PaymentReference {
    pub fn for_token<S: Into<String>>(token: S) -> Self {
        Self { order_token: Some(token.into()), ..Default::default() }
    }

    pub fn for_order_id(order_id: i64) -> Self {
        Self { order_id: Some(order_id), ..Default::default() }
    }

    pub fn for_user(user_id: i64) -> Self {
        Self { user_id: Some(user_id), ..Default::default() }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_cart_token<S: Into<String>>(mut self, token: S) -> Self {
        self.cart_token = Some(token.into());
        self
    }
}
