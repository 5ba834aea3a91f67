use std::fmt::Display;

use serde::{Deserialize, Serialize};
use stage_commerce_engine::{
    db_types::{Cart, CartLine, ContactInfo, LineSpec, Role, UserAccount},
    session_objects::SessionInfo,
};
use stg_common::Kopeck;

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//------------------------------------------  Auth payloads  ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The account as presented to its owner. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub verified: bool,
}

impl From<&UserAccount> for AccountResponse {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            role: account.role,
            verified: account.is_verified(),
        }
    }
}

//------------------------------------------  Cart payloads  ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AddLineRequest {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub size_label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Kopeck>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

impl AddLineRequest {
    pub fn into_spec(self) -> Result<LineSpec, ServerError> {
        let mut spec = LineSpec::new(self.product_id, self.variant_id, self.quantity)
            .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
        if let Some(size) = self.size_label {
            spec = spec.with_size(size);
        }
        Ok(spec.with_display(self.name, self.price, self.image))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLineRequest {
    pub line_id: i64,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub postponed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveLinesRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartResponse {
    pub cart_id: i64,
    pub lines: Vec<CartLine>,
    pub total: Kopeck,
}

impl CartResponse {
    pub fn new(cart: &Cart, lines: Vec<CartLine>) -> Self {
        let total = lines.iter().filter(|l| !l.postponed).map(|l| l.price * l.quantity).sum();
        Self { cart_id: cart.id, lines, total }
    }
}

//-----------------------------------------  Order payloads  ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ContactRequest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub comment: String,
}

impl ContactRequest {
    pub fn into_contact(self) -> ContactInfo {
        ContactInfo::new(&self.full_name, &self.email, &self.phone, &self.address, &self.comment)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub contact: ContactRequest,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// When present, only these cart lines are bought.
    #[serde(default)]
    pub line_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub order_token: Option<String>,
}

/// The confirmation envelope. Identical for the call that wins the transition and for any replay.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmPaymentResponse {
    pub success: bool,
    pub order_id: i64,
    pub public_number: Option<String>,
    pub already_confirmed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryRequest {
    pub order_id: i64,
    pub slot: String,
}

//----------------------------------------  Session payloads  --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RevokeSessionRequest {
    pub session_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub can_revoke_others: bool,
    pub cooldown_hours_left: i64,
}
