use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::{cart_lines, carts, db_url, new_pool, orders, promos, sessions, users, SqliteDatabaseError};
use crate::{
    db::traits::{
        CartManagement,
        ConfirmOutcome,
        IdentityManagement,
        OrderManagement,
        RemoveLinesOutcome,
        SessionManagement,
        SessionRegistration,
        UpsertLineResult,
    },
    db_types::{
        Cart,
        CartKey,
        CartLine,
        DeviceSession,
        LinePatch,
        LineSpec,
        NewDeviceSession,
        NewOrder,
        NewUserAccount,
        Order,
        OrderLine,
        Role,
        UserAccount,
        VerificationCode,
    },
    helpers::{new_token, CART_TOKEN_LEN},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database given by the `STG_DATABASE_URL` environment variable, or the default path.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a transaction that takes sqlite's write lock before anything else runs in it.
    ///
    /// Pooled transactions begin deferred. A deferred transaction that reads first pins a snapshot, and once any
    /// other pooled connection commits a write, upgrading that snapshot to a write fails with a `database is
    /// locked` error that the busy handler is not allowed to retry. Issuing a write as the very first statement
    /// moves the contention to the busy handler, which waits instead of failing.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, SqliteDatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE carts SET id = id WHERE 1 = 0").execute(&mut *tx).await?;
        Ok(tx)
    }
}

impl IdentityManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_account(&self, account: NewUserAccount, role: Role) -> Result<UserAccount, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::insert_account(account, role, &mut conn).await
    }

    async fn fetch_account_by_email(&self, email: &str) -> Result<Option<UserAccount>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::account_by_email(email, &mut conn).await
    }

    async fn fetch_account_by_id(&self, user_id: i64) -> Result<Option<UserAccount>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::account_by_id(user_id, &mut conn).await
    }

    async fn upsert_verification_code(&self, user_id: i64, code: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::upsert_verification_code(user_id, code, &mut conn).await
    }

    async fn fetch_verification_code(&self, user_id: i64) -> Result<Option<VerificationCode>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::verification_code(user_id, &mut conn).await
    }

    async fn mark_verified(&self, user_id: i64, role: Role) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;
        users::mark_verified(user_id, role, &mut tx).await?;
        tx.commit().await?;
        debug!("🧑️ Account #{user_id} verified with role {role}");
        Ok(())
    }

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::update_password_hash(user_id, password_hash, &mut conn).await
    }

    async fn deactivate_account(&self, user_id: i64) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::deactivate_account(user_id, &mut conn).await
    }

    async fn claim_guest_orders(&self, user_id: i64, order_token: &str) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        users::claim_guest_orders(user_id, order_token, &mut conn).await
    }
}

impl CartManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn resolve_or_create_cart(&self, key: &CartKey) -> Result<Cart, Self::Error> {
        let mut tx = self.begin_write().await?;
        // The principal's own cart always wins.
        if let Some(user_id) = key.user_id {
            if let Some(cart) = carts::cart_for_user(user_id, &mut tx).await? {
                tx.commit().await?;
                return Ok(cart);
            }
        }
        let cart = match carts::cart_by_token(&key.token, &mut tx).await? {
            Some(cart) if cart.user_id.is_none() => match key.user_id {
                // First time this principal and this anonymous cart appear together: adopt it.
                Some(user_id) => {
                    carts::adopt_cart(cart.id, user_id, &mut tx).await?;
                    Cart { user_id: Some(user_id), ..cart }
                },
                None => cart,
            },
            // The token belongs to someone else's cart. Never re-bind it; start fresh.
            Some(_) => carts::insert_cart(key.user_id, &new_token(CART_TOKEN_LEN), &mut tx).await?,
            None => {
                let token = if key.token.is_empty() { new_token(CART_TOKEN_LEN) } else { key.token.clone() };
                carts::insert_cart(key.user_id, &token, &mut tx).await?
            },
        };
        tx.commit().await?;
        Ok(cart)
    }

    async fn fetch_cart_for_user(&self, user_id: i64) -> Result<Option<Cart>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        carts::cart_for_user(user_id, &mut conn).await
    }

    async fn fetch_cart_by_token(&self, token: &str) -> Result<Option<Cart>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        carts::cart_by_token(token, &mut conn).await
    }

    async fn fetch_cart_lines(&self, cart_id: i64) -> Result<Vec<CartLine>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        cart_lines::lines_for_cart(cart_id, &mut conn).await
    }

    async fn upsert_cart_line(&self, cart_id: i64, spec: LineSpec) -> Result<UpsertLineResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        // Touching the cart first also makes the transaction's opening statement a write, so the write lock is
        // taken up front rather than by a snapshot upgrade that can fail under a concurrent writer.
        carts::touch_cart(cart_id, &mut tx).await?;
        let result = cart_lines::upsert_line(cart_id, spec, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn update_cart_line(
        &self,
        cart_id: i64,
        line_id: i64,
        patch: LinePatch,
    ) -> Result<Option<CartLine>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        cart_lines::update_line(cart_id, line_id, patch, &mut conn).await
    }

    async fn remove_cart_lines(&self, cart_id: i64, line_ids: &[i64]) -> Result<RemoveLinesOutcome, Self::Error> {
        let mut tx = self.begin_write().await?;
        let outcome = cart_lines::delete_lines(cart_id, line_ids, &mut tx).await?;
        match &outcome {
            RemoveLinesOutcome::Removed(deleted) => {
                tx.commit().await?;
                debug!("🗃️ Cart #{cart_id}: deleted {deleted} of {} requested line(s)", line_ids.len());
            },
            RemoveLinesOutcome::ForeignLine(_) => tx.rollback().await?,
        }
        Ok(outcome)
    }

    async fn clear_cart(&self, cart_id: i64) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        cart_lines::clear_lines(cart_id, &mut conn).await
    }

    async fn purge_purchased_lines(&self, cart_id: i64, purchased: &[OrderLine]) -> Result<u64, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;
        for line in purchased {
            if cart_lines::purge_one(cart_id, line, &mut tx).await? {
                deleted += 1;
            }
        }
        tx.commit().await?;
        debug!("🗃️ Purged {deleted} purchased line(s) from cart #{cart_id}");
        Ok(deleted)
    }
}

impl OrderManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_order(&self, order: NewOrder, token: &str) -> Result<Order, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let stored = orders::insert_order(order, token, &mut tx).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn fetch_order_by_id(&self, order_id: i64) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::order_by_id(order_id, &mut conn).await
    }

    async fn fetch_order_by_token(&self, token: &str) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::order_by_token(token, &mut conn).await
    }

    async fn fetch_last_unconfirmed_order(
        &self,
        user_id: i64,
        max_age: Duration,
    ) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::last_unconfirmed_order(user_id, max_age, &mut conn).await
    }

    async fn fetch_pending_order(&self, user_id: i64) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::pending_order(user_id, &mut conn).await
    }

    async fn confirm_order(&self, order_id: i64) -> Result<ConfirmOutcome, Self::Error> {
        let mut tx = self.begin_write().await?;
        let order =
            orders::order_by_id(order_id, &mut tx).await?.ok_or(SqliteDatabaseError::OrderNotFound(order_id))?;
        let newly_confirmed = orders::mark_succeeded(order_id, &mut tx).await?;
        let mut canceled_siblings = Vec::new();
        let mut promo_redeemed = false;
        if newly_confirmed {
            orders::assign_public_number(order_id, &mut tx).await?;
            if let Some(user_id) = order.user_id {
                canceled_siblings = orders::cancel_pending_siblings(user_id, order_id, &mut tx).await?;
                if let Some(code) = &order.promo_code {
                    promo_redeemed = promos::record_redemption(code, user_id, order_id, &mut tx).await?;
                }
            }
        }
        let order =
            orders::order_by_id(order_id, &mut tx).await?.ok_or(SqliteDatabaseError::OrderNotFound(order_id))?;
        tx.commit().await?;
        if newly_confirmed {
            info!("🗃️ Order #{order_id} confirmed as {}", order.public_number.as_deref().unwrap_or("?"));
        } else {
            debug!("🗃️ Order #{order_id} confirmation replayed. No change.");
        }
        Ok(ConfirmOutcome { order, newly_confirmed, canceled_siblings, promo_redeemed })
    }

    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::orders_for_user(user_id, &mut conn).await
    }

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::lines_for_order(order_id, &mut conn).await
    }

    async fn set_delivery_slot(&self, order_id: i64, slot: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::set_delivery_slot(order_id, slot, &mut conn).await
    }

    async fn is_promo_redeemed(&self, code: &str, user_id: i64) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        promos::is_redeemed(code, user_id, &mut conn).await
    }
}

impl SessionManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn register_session(&self, session: NewDeviceSession) -> Result<SessionRegistration, Self::Error> {
        let mut tx = self.begin_write().await?;
        let key = session.fingerprint.key();
        let existing = sessions::live_sessions(session.user_id, &mut tx)
            .await?
            .into_iter()
            .find(|s| s.fingerprint_key() == key);
        let result = match existing {
            Some(live) => {
                let refreshed = sessions::refresh_session(live.id, &session.token, &mut tx).await?;
                SessionRegistration::Reused(refreshed)
            },
            None => {
                let is_primary = !sessions::has_any_session(session.user_id, &mut tx).await?;
                let stored = sessions::insert_session(&session, is_primary, &mut tx).await?;
                SessionRegistration::New(stored)
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_session_by_token(&self, token: &str) -> Result<Option<DeviceSession>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        sessions::session_by_token(token, &mut conn).await
    }

    async fn fetch_live_sessions(&self, user_id: i64) -> Result<Vec<DeviceSession>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        sessions::live_sessions(user_id, &mut conn).await
    }

    async fn touch_session(&self, token: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        sessions::touch_session(token, &mut conn).await
    }

    async fn revoke_session(&self, user_id: i64, session_id: i64) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        sessions::revoke_session(user_id, session_id, &mut conn).await
    }

    async fn revoke_session_by_token(&self, token: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        sessions::revoke_by_token(token, &mut conn).await
    }

    async fn annotate_session_geo(
        &self,
        session_id: i64,
        city: Option<&str>,
        country: Option<&str>,
    ) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        sessions::annotate_geo(session_id, city, country, &mut conn).await
    }
}
