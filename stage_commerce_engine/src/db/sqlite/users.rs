use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewUserAccount, Role, UserAccount, VerificationCode},
};

pub async fn insert_account(
    account: NewUserAccount,
    role: Role,
    conn: &mut SqliteConnection,
) -> Result<UserAccount, SqliteDatabaseError> {
    let role = role.to_string();
    let result = sqlx::query_as::<_, UserAccount>(
        r#"
            INSERT INTO user_accounts (email, full_name, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(&account.email)
    .bind(&account.full_name)
    .bind(&account.password_hash)
    .bind(role)
    .fetch_one(conn)
    .await;
    match result {
        Ok(acc) => {
            trace!("🧑️ Created account #{} for {}", acc.id, acc.email);
            Ok(acc)
        },
        Err(sqlx::Error::Database(de)) if de.is_unique_violation() => {
            Err(SqliteDatabaseError::AccountCreationError(format!("{} is already registered", account.email)))
        },
        Err(e) => Err(e.into()),
    }
}

/// Fetches a live account by its normalised email. Deactivated accounts are treated as absent.
pub async fn account_by_email(
    email: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, UserAccount>(
        "SELECT * FROM user_accounts WHERE email = $1 AND deleted_at IS NULL LIMIT 1",
    )
    .bind(email)
    .fetch_one(conn)
    .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(acc) => Ok(Some(acc)),
    }
}

pub async fn account_by_id(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, UserAccount>("SELECT * FROM user_accounts WHERE id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(acc) => Ok(Some(acc)),
    }
}

pub async fn upsert_verification_code(
    user_id: i64,
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO verification_codes (user_id, code) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET code = excluded.code, created_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(user_id)
    .bind(code)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn verification_code(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<VerificationCode>, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, VerificationCode>("SELECT * FROM verification_codes WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(vc) => Ok(Some(vc)),
    }
}

pub async fn mark_verified(user_id: i64, role: Role, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let role = role.to_string();
    let result = sqlx::query(
        r#"
            UPDATE user_accounts
            SET verified_at = CURRENT_TIMESTAMP, role = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2;
        "#,
    )
    .bind(role)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::AccountNotFound(user_id));
    }
    sqlx::query("DELETE FROM verification_codes WHERE user_id = $1").bind(user_id).execute(conn).await?;
    Ok(())
}

pub async fn update_password_hash(
    user_id: i64,
    password_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE user_accounts SET password_hash = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(password_hash)
    .bind(user_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::AccountNotFound(user_id));
    }
    Ok(())
}

pub async fn deactivate_account(user_id: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE user_accounts SET deleted_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(user_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::AccountNotFound(user_id));
    }
    Ok(())
}

/// Binds ownerless orders carrying the guest token to the account. Orders with an owner are left untouched.
pub async fn claim_guest_orders(
    user_id: i64,
    order_token: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE orders SET user_id = $1, updated_at = CURRENT_TIMESTAMP WHERE token = $2 AND user_id IS NULL",
    )
    .bind(user_id)
    .bind(order_token)
    .execute(conn)
    .await?;
    let n = result.rows_affected();
    if n > 0 {
        trace!("🧑️ Account #{user_id} claimed {n} guest order(s)");
    }
    Ok(n)
}
