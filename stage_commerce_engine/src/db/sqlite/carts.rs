use log::trace;
use sqlx::SqliteConnection;

use crate::{db::sqlite::SqliteDatabaseError, db_types::Cart};

pub async fn cart_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Cart>, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = $1 LIMIT 1")
        .bind(user_id)
        .fetch_one(conn)
        .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(cart) => Ok(Some(cart)),
    }
}

pub async fn cart_by_token(token: &str, conn: &mut SqliteConnection) -> Result<Option<Cart>, SqliteDatabaseError> {
    let result =
        sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE token = $1").bind(token).fetch_one(conn).await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(cart) => Ok(Some(cart)),
    }
}

pub async fn insert_cart(
    user_id: Option<i64>,
    token: &str,
    conn: &mut SqliteConnection,
) -> Result<Cart, SqliteDatabaseError> {
    let cart = sqlx::query_as::<_, Cart>("INSERT INTO carts (user_id, token) VALUES ($1, $2) RETURNING *")
        .bind(user_id)
        .bind(token)
        .fetch_one(conn)
        .await?;
    trace!("🗃️ Created cart #{} (owner: {:?})", cart.id, cart.user_id);
    Ok(cart)
}

/// Binds an anonymous cart to a principal. A no-op if the cart already has an owner.
pub async fn adopt_cart(cart_id: i64, user_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE carts SET user_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND user_id IS NULL",
    )
    .bind(user_id)
    .bind(cart_id)
    .execute(conn)
    .await?;
    let adopted = result.rows_affected() > 0;
    if adopted {
        trace!("🗃️ Cart #{cart_id} adopted by account #{user_id}");
    }
    Ok(adopted)
}

pub async fn touch_cart(cart_id: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE carts SET updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}
