use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewOrder, Order, OrderLine},
    helpers::public_order_number,
};

/// Stores the order row and its line snapshots. Not atomic on its own; callers wrap it in a transaction.
pub async fn insert_order(order: NewOrder, token: &str, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    let total = order.total();
    let stored = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (user_id, token, total, full_name, email, phone, address, comment, promo_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order.user_id)
    .bind(token)
    .bind(total)
    .bind(&order.contact.full_name)
    .bind(&order.contact.email)
    .bind(&order.contact.phone)
    .bind(&order.contact.address)
    .bind(&order.contact.comment)
    .bind(&order.promo_code)
    .fetch_one(&mut *conn)
    .await?;
    for line in &order.lines {
        sqlx::query(
            r#"
                INSERT INTO order_lines (order_id, cart_line_id, product_id, variant_id, size_label, name, price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
            "#,
        )
        .bind(stored.id)
        .bind(line.cart_line_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(&line.size_label)
        .bind(&line.name)
        .bind(line.price)
        .bind(line.quantity.max(1))
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order #{} saved with {} line(s), total {total}", stored.id, order.lines.len());
    Ok(stored)
}

pub async fn order_by_id(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let result =
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_one(conn).await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(o) => Ok(Some(o)),
    }
}

pub async fn order_by_token(token: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let result =
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE token = $1").bind(token).fetch_one(conn).await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(o) => Ok(Some(o)),
    }
}

/// The principal's most recent order that has not succeeded, created no earlier than `max_age` ago.
pub async fn last_unconfirmed_order(
    user_id: i64,
    max_age: Duration,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let cutoff: DateTime<Utc> = Utc::now() - max_age;
    let result = sqlx::query_as::<_, Order>(
        r#"
            SELECT * FROM orders
            WHERE user_id = $1 AND status != 'Succeeded' AND created_at >= $2
            ORDER BY id DESC
            LIMIT 1;
        "#,
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_one(conn)
    .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(o) => Ok(Some(o)),
    }
}

pub async fn pending_order(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 AND status = 'Pending' ORDER BY id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(o) => Ok(Some(o)),
    }
}

/// The conditional transition. Exactly one caller sees a row affected for any given order, no matter how many
/// confirmations race or replay, and terminal orders never move again.
pub async fn mark_succeeded(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE orders
            SET status = 'Succeeded', paid_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending';
        "#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Assigns the public number if the order does not have one yet. Idempotent.
pub async fn assign_public_number(order_id: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let number = public_order_number(order_id);
    sqlx::query("UPDATE orders SET public_number = $1 WHERE id = $2 AND public_number IS NULL")
        .bind(&number)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Sweeps the principal's other pending orders to `Canceled`. Returns the ids that were swept.
pub async fn cancel_pending_siblings(
    user_id: i64,
    confirmed_order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, SqliteDatabaseError> {
    let ids = sqlx::query_as::<_, (i64,)>(
        r#"
            UPDATE orders
            SET status = 'Canceled', updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1 AND id != $2 AND status = 'Pending'
            RETURNING id;
        "#,
    )
    .bind(user_id)
    .bind(confirmed_order_id)
    .fetch_all(conn)
    .await?;
    let ids: Vec<i64> = ids.into_iter().map(|(id,)| id).collect();
    if !ids.is_empty() {
        trace!("🗃️ Canceled {} sibling pending order(s) of #{confirmed_order_id}", ids.len());
    }
    Ok(ids)
}

pub async fn orders_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, SqliteDatabaseError> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 ORDER BY id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn lines_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, SqliteDatabaseError> {
    let lines = sqlx::query_as::<_, OrderLine>("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

pub async fn set_delivery_slot(order_id: i64, slot: &str, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE orders SET delivery_slot = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(slot)
        .bind(order_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::OrderNotFound(order_id));
    }
    Ok(())
}
