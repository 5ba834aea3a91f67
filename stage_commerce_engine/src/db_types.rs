use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use stg_common::Kopeck;
use thiserror::Error;

//--------------------------------------        Role        ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Role {
    /// An ordinary shopper account.
    Standard,
    /// An account whose identity key matched the privileged allow-list at login or verification time.
    Elevated,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Standard => write!(f, "Standard"),
            Role::Elevated => write!(f, "Elevated"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(Self::Standard),
            "Elevated" => Ok(Self::Elevated),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid role: {value}. But this conversion cannot fail. Defaulting to Standard");
            Role::Standard
        })
    }
}

//--------------------------------------     UserAccount     ---------------------------------------------------------
/// The principal: an account identified by its unique login email.
#[derive(Debug, Clone, FromRow)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub verified_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    pub fn is_deactivated(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewUserAccount {
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
}

impl NewUserAccount {
    /// Normalises the login key the same way every lookup does: trimmed and lowercased.
    pub fn new<S: Into<String>>(email: S, password_hash: S) -> Self {
        Self { email: normalize_email(&email.into()), full_name: None, password_hash: password_hash.into() }
    }

    pub fn with_full_name<S: Into<String>>(mut self, name: S) -> Self {
        self.full_name = Some(name.into());
        self
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//--------------------------------------   VerificationCode  ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCode {
    pub user_id: i64,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Cart         ---------------------------------------------------------
/// A cart belongs to at most one principal, XOR is reachable by an opaque client-held token.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: Option<i64>,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resolution key for a cart: by principal id when authenticated, by bearer token otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartKey {
    pub user_id: Option<i64>,
    pub token: String,
}

impl CartKey {
    pub fn anonymous<S: Into<String>>(token: S) -> Self {
        Self { user_id: None, token: token.into() }
    }

    pub fn for_user<S: Into<String>>(user_id: i64, token: S) -> Self {
        Self { user_id: Some(user_id), token: token.into() }
    }
}

//--------------------------------------      CartLine       ---------------------------------------------------------
/// One purchasable unit in a cart. Identified by its variant id, or by (product id, size label) when no variant is
/// involved, never both ambiguously. Carries a display snapshot taken at add-time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CartLine {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub size_label: Option<String>,
    pub name: String,
    pub price: Kopeck,
    pub image: Option<String>,
    pub quantity: i64,
    pub postponed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied shape for adding a line to a cart. [`LineSpec::new`] is the only way to build one, so a spec
/// always carries a usable identity key and a positive quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSpec {
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub size_label: Option<String>,
    pub name: Option<String>,
    pub price: Option<Kopeck>,
    pub image: Option<String>,
    pub quantity: i64,
}

impl LineSpec {
    pub fn new(product_id: Option<i64>, variant_id: Option<i64>, quantity: i64) -> Result<Self, ConversionError> {
        if product_id.is_none() && variant_id.is_none() {
            return Err(ConversionError("A cart line needs a variant id or a product id".into()));
        }
        Ok(Self {
            product_id,
            variant_id,
            size_label: None,
            name: None,
            price: None,
            image: None,
            quantity: quantity.max(1),
        })
    }

    pub fn with_size<S: Into<String>>(mut self, size: S) -> Self {
        self.size_label = Some(size.into());
        self
    }

    pub fn with_display(mut self, name: Option<String>, price: Option<Kopeck>, image: Option<String>) -> Self {
        self.name = name;
        self.price = price;
        self.image = image;
        self
    }

    /// True when `line` is the same identity key as this spec: same variant id, or same (product, size) pair for
    /// non-variant lines.
    pub fn matches(&self, line: &CartLine) -> bool {
        match self.variant_id {
            Some(vid) => line.variant_id == Some(vid),
            None => {
                line.variant_id.is_none() && line.product_id == self.product_id && line.size_label == self.size_label
            },
        }
    }
}

/// Partial update for a single line. At least one field must be present.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LinePatch {
    pub quantity: Option<i64>,
    pub postponed: Option<bool>,
}

impl LinePatch {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.postponed.is_none()
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The checkout attempt has been recorded and no payment has been confirmed yet.
    Pending,
    /// Payment was confirmed. Terminal.
    Succeeded,
    /// Superseded by a sibling order that succeeded. Terminal.
    Canceled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Succeeded | OrderStatusType::Canceled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Succeeded => write!(f, "Succeeded"),
            OrderStatusType::Canceled => write!(f, "Canceled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Succeeded" => Ok(Self::Succeeded),
            "Canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------     ContactInfo     ---------------------------------------------------------
/// Recipient contact fields snapshotted onto an order. The constructor hard-normalises user input so nothing
/// oversized or padded ever reaches the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub comment: String,
}

impl ContactInfo {
    pub fn new(full_name: &str, email: &str, phone: &str, address: &str, comment: &str) -> Self {
        Self {
            full_name: clip(full_name, 160),
            email: clip(email, 190),
            phone: clip(phone, 64),
            address: clip(address, 255),
            comment: clip(comment, 1000),
        }
    }
}

fn clip(v: &str, max_len: usize) -> String {
    let v = v.trim();
    v.chars().take(max_len).collect()
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: Option<i64>,
    /// Bearer token for the guest checkout flow. Presenting it later binds the order to an account.
    pub token: String,
    /// Human-facing number, assigned lazily at confirmation, never at creation.
    pub public_number: Option<String>,
    pub status: OrderStatusType,
    pub total: Kopeck,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub comment: String,
    pub promo_code: Option<String>,
    pub delivery_slot: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<i64>,
    pub contact: ContactInfo,
    pub promo_code: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    pub fn new(user_id: Option<i64>, contact: ContactInfo, lines: Vec<NewOrderLine>) -> Self {
        Self { user_id, contact, promo_code: None, lines }
    }

    pub fn with_promo_code<S: Into<String>>(mut self, code: S) -> Self {
        let code = code.into().trim().to_uppercase();
        if !code.is_empty() {
            self.promo_code = Some(code);
        }
        self
    }

    /// Total from per-line price × quantity.
    pub fn total(&self) -> Kopeck {
        self.lines.iter().map(|l| l.price * l.quantity).sum()
    }
}

/// Snapshot of a cart line taken at order-creation time.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    /// Back-reference to the originating cart line, if it still existed at creation time.
    pub cart_line_id: Option<i64>,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub size_label: Option<String>,
    pub name: String,
    pub price: Kopeck,
    pub quantity: i64,
}

impl NewOrderLine {
    pub fn from_cart_line(line: &CartLine) -> Option<Self> {
        let product_id = line.product_id?;
        Some(Self {
            cart_line_id: Some(line.id),
            product_id,
            variant_id: line.variant_id,
            size_label: line.size_label.clone(),
            name: line.name.clone(),
            price: line.price,
            quantity: line.quantity.max(1),
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub cart_line_id: Option<i64>,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub size_label: Option<String>,
    pub name: String,
    pub price: Kopeck,
    pub quantity: i64,
}

//--------------------------------------   SessionFingerprint -------------------------------------------------------
/// Coarse (device class, OS, IP, user-agent) tuple used to deduplicate sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFingerprint {
    pub ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub device: Option<String>,
    pub os: Option<String>,
    pub user_agent: Option<String>,
}

const UA_KEY_PREFIX_LEN: usize = 120;

impl SessionFingerprint {
    /// Dedup key. Two sessions with the same key are the same physical device as far as the registry cares.
    pub fn key(&self) -> String {
        let ua: String =
            self.user_agent.as_deref().unwrap_or("").chars().take(UA_KEY_PREFIX_LEN).collect();
        format!(
            "{}|{}|{}|{}",
            self.device.as_deref().unwrap_or("unknown-device"),
            self.os.as_deref().unwrap_or("unknown-os"),
            self.ip.as_deref().unwrap_or("unknown-ip"),
            ua
        )
    }
}

//--------------------------------------    DeviceSession    ---------------------------------------------------------
/// One authenticated device. Destroyed logically via `revoked_at`, never deleted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeviceSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub is_primary: bool,
    pub ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub device: Option<String>,
    pub os: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DeviceSession {
    pub fn is_live(&self) -> bool {
        self.revoked_at.is_none()
    }

    pub fn fingerprint_key(&self) -> String {
        SessionFingerprint {
            ip: self.ip.clone(),
            city: None,
            country: None,
            device: self.device.clone(),
            os: self.os.clone(),
            user_agent: self.user_agent.clone(),
        }
        .key()
    }
}

#[derive(Debug, Clone)]
pub struct NewDeviceSession {
    pub user_id: i64,
    pub token: String,
    pub fingerprint: SessionFingerprint,
}

const UA_STORED_MAX_LEN: usize = 500;

impl NewDeviceSession {
    pub fn new(user_id: i64, token: String, fingerprint: SessionFingerprint) -> Self {
        let mut fingerprint = fingerprint;
        if let Some(ua) = fingerprint.user_agent.take() {
            fingerprint.user_agent = Some(ua.chars().take(UA_STORED_MAX_LEN).collect());
        }
        Self { user_id, token, fingerprint }
    }
}

//--------------------------------------   PromoRedemption   ---------------------------------------------------------
/// Recorded exactly once per (promo code, principal), only after the order reached `Succeeded`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PromoRedemption {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    pub order_id: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_spec_requires_an_identity_key() {
        assert!(LineSpec::new(None, None, 1).is_err());
        assert!(LineSpec::new(Some(10), None, 1).is_ok());
        assert!(LineSpec::new(None, Some(7), 1).is_ok());
    }

    #[test]
    fn line_spec_clamps_quantity() {
        let spec = LineSpec::new(Some(10), None, -3).unwrap();
        assert_eq!(spec.quantity, 1);
    }

    #[test]
    fn contact_info_clips_oversized_fields() {
        let long = "x".repeat(400);
        let info = ContactInfo::new(&long, " a@b.c ", "123", &long, "ok");
        assert_eq!(info.full_name.len(), 160);
        assert_eq!(info.email, "a@b.c");
        assert_eq!(info.address.len(), 255);
    }

    #[test]
    fn fingerprint_key_truncates_user_agent() {
        let fp = SessionFingerprint {
            ip: Some("1.2.3.4".into()),
            device: Some("Mobile".into()),
            os: Some("iOS".into()),
            user_agent: Some("u".repeat(300)),
            ..Default::default()
        };
        assert_eq!(fp.key(), format!("Mobile|iOS|1.2.3.4|{}", "u".repeat(120)));
    }

    #[test]
    fn order_total_is_price_times_quantity() {
        let lines = vec![
            NewOrderLine {
                cart_line_id: None,
                product_id: 1,
                variant_id: None,
                size_label: None,
                name: "a".into(),
                price: Kopeck::from(500),
                quantity: 2,
            },
            NewOrderLine {
                cart_line_id: None,
                product_id: 2,
                variant_id: None,
                size_label: Some("M".into()),
                name: "b".into(),
                price: Kopeck::from(300),
                quantity: 1,
            },
        ];
        let order = NewOrder::new(None, ContactInfo::default(), lines);
        assert_eq!(order.total(), Kopeck::from(1300));
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatusType::Pending.is_terminal());
        assert!(OrderStatusType::Succeeded.is_terminal());
        assert!(OrderStatusType::Canceled.is_terminal());
    }
}
