use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{DeviceSession, NewDeviceSession},
};

pub async fn live_sessions(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<DeviceSession>, SqliteDatabaseError> {
    let sessions = sqlx::query_as::<_, DeviceSession>(
        "SELECT * FROM device_sessions WHERE user_id = $1 AND revoked_at IS NULL ORDER BY last_seen DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(sessions)
}

pub async fn session_by_token(
    token: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<DeviceSession>, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, DeviceSession>("SELECT * FROM device_sessions WHERE token = $1")
        .bind(token)
        .fetch_one(conn)
        .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(s) => Ok(Some(s)),
    }
}

/// True when the account has ever had a session, live or revoked.
pub async fn has_any_session(user_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM device_sessions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

pub async fn insert_session(
    session: &NewDeviceSession,
    is_primary: bool,
    conn: &mut SqliteConnection,
) -> Result<DeviceSession, SqliteDatabaseError> {
    let fp = &session.fingerprint;
    let stored = sqlx::query_as::<_, DeviceSession>(
        r#"
            INSERT INTO device_sessions (user_id, token, is_primary, ip, city, country, device, os, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(session.user_id)
    .bind(&session.token)
    .bind(is_primary)
    .bind(&fp.ip)
    .bind(&fp.city)
    .bind(&fp.country)
    .bind(&fp.device)
    .bind(&fp.os)
    .bind(&fp.user_agent)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ New session #{} for account #{} (primary: {is_primary})", stored.id, stored.user_id);
    Ok(stored)
}

/// Hands an existing registry row a fresh token and bumps its last-seen timestamp. The old token stops resolving.
pub async fn refresh_session(
    session_id: i64,
    token: &str,
    conn: &mut SqliteConnection,
) -> Result<DeviceSession, SqliteDatabaseError> {
    let session = sqlx::query_as::<_, DeviceSession>(
        "UPDATE device_sessions SET token = $1, last_seen = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(token)
    .bind(session_id)
    .fetch_one(conn)
    .await?;
    Ok(session)
}

pub async fn touch_session(token: &str, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE device_sessions SET last_seen = CURRENT_TIMESTAMP WHERE token = $1 AND revoked_at IS NULL")
        .bind(token)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn revoke_session(
    user_id: i64,
    session_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE device_sessions SET revoked_at = CURRENT_TIMESTAMP \
         WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL",
    )
    .bind(session_id)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn revoke_by_token(token: &str, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result =
        sqlx::query("UPDATE device_sessions SET revoked_at = CURRENT_TIMESTAMP WHERE token = $1 AND revoked_at IS NULL")
            .bind(token)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn annotate_geo(
    session_id: i64,
    city: Option<&str>,
    country: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE device_sessions SET city = $1, country = $2 WHERE id = $3")
        .bind(city)
        .bind(country)
        .bind(session_id)
        .execute(conn)
        .await?;
    trace!("🖥️ Annotated session {session_id} with location {city:?}, {country:?}");
    Ok(())
}
