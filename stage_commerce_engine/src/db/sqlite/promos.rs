use log::debug;
use sqlx::SqliteConnection;

use crate::db::sqlite::SqliteDatabaseError;

pub async fn is_redeemed(code: &str, user_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM promo_redemptions WHERE code = $1 AND user_id = $2",
    )
    .bind(code)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Records the redemption unless the (code, principal) pair has been recorded before. Returns true when this call
/// recorded it.
pub async fn record_redemption(
    code: &str,
    user_id: i64,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            INSERT INTO promo_redemptions (code, user_id, order_id) VALUES ($1, $2, $3)
            ON CONFLICT (code, user_id) DO NOTHING;
        "#,
    )
    .bind(code)
    .bind(user_id)
    .bind(order_id)
    .execute(conn)
    .await?;
    let recorded = result.rows_affected() > 0;
    if recorded {
        debug!("🗃️ Promo {code} redeemed by account #{user_id} on order #{order_id}");
    }
    Ok(recorded)
}
