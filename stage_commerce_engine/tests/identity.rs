//! Account lifecycle tests: registration, verification codes, role elevation, login and password changes.

use sqlx::{migrate::MigrateDatabase, Sqlite};
use stage_commerce_engine::{
    test_utils::{prepare_test_env, random_db_path},
    db_types::Role,
    IdentityApi,
    IdentityApiError,
    IdentityManagement,
    PasswordVerifier,
    SqliteDatabase,
};

/// A deliberately weak verifier. Real hashing is the server's concern.
#[derive(Clone)]
struct PlainVerifier;

impl PasswordVerifier for PlainVerifier {
    fn hash_password(&self, password: &str) -> Result<String, IdentityApiError> {
        Ok(format!("plain:{password}"))
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, IdentityApiError> {
        Ok(hash == format!("plain:{password}"))
    }
}

async fn setup() -> (SqliteDatabase, IdentityApi<SqliteDatabase, PlainVerifier>) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let api = IdentityApi::new(db.clone(), PlainVerifier).with_elevated_emails(vec!["Boss@Example.com".to_string()]);
    (db, api)
}

async fn tear_down(db: SqliteDatabase) {
    Sqlite::drop_database(db.url()).await.expect("Error dropping database");
}

#[tokio::test]
async fn register_verify_login_round_trip() {
    let (db, api) = setup().await;
    let (account, code) = api.register("  Nia@Example.COM ", "hunter2", Some("Nia".into())).await.unwrap();
    assert_eq!(account.email, "nia@example.com");
    assert_eq!(code.len(), 6);
    assert!(!account.is_verified());

    // Unverified accounts cannot log in, even with the right password.
    let err = api.login("nia@example.com", "hunter2").await.unwrap_err();
    assert!(matches!(err, IdentityApiError::NotVerified));

    let err = api.verify("nia@example.com", "000000x").await.unwrap_err();
    assert!(matches!(err, IdentityApiError::CodeMismatch));
    let account = api.verify("nia@example.com", &code).await.unwrap();
    assert!(account.is_verified());
    assert_eq!(account.role, Role::Standard);

    let account = api.login("nia@example.com", "hunter2").await.unwrap();
    assert_eq!(account.email, "nia@example.com");
    let err = api.login("nia@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, IdentityApiError::InvalidCredentials));
    tear_down(db).await;
}

#[tokio::test]
async fn duplicate_and_bad_emails_are_rejected() {
    let (db, api) = setup().await;
    api.register("oz@example.com", "pw", None).await.unwrap();
    let err = api.register("OZ@example.com", "pw", None).await.unwrap_err();
    assert!(matches!(err, IdentityApiError::EmailTaken(_)));
    let err = api.register("not-an-email", "pw", None).await.unwrap_err();
    assert!(matches!(err, IdentityApiError::BadEmail(_)));
    tear_down(db).await;
}

#[tokio::test]
async fn elevated_emails_verify_into_the_elevated_role() {
    let (db, api) = setup().await;
    let (_, code) = api.register("boss@example.com", "pw", None).await.unwrap();
    let account = api.verify("boss@example.com", &code).await.unwrap();
    assert_eq!(account.role, Role::Elevated);
    tear_down(db).await;
}

#[tokio::test]
async fn reissued_code_replaces_the_old_one() {
    let (db, api) = setup().await;
    let (_, first) = api.register("pia@example.com", "pw", None).await.unwrap();
    let (_, second) = api.request_verification_code("pia@example.com").await.unwrap();
    if first != second {
        let err = api.verify("pia@example.com", &first).await.unwrap_err();
        assert!(matches!(err, IdentityApiError::CodeMismatch));
    }
    api.verify("pia@example.com", &second).await.expect("Error verifying with the reissued code");
    tear_down(db).await;
}

#[tokio::test]
async fn password_change_requires_the_old_password() {
    let (db, api) = setup().await;
    let (account, code) = api.register("raj@example.com", "old-pw", None).await.unwrap();
    api.verify("raj@example.com", &code).await.unwrap();

    let err = api.change_password(account.id, "wrong", "new-pw").await.unwrap_err();
    assert!(matches!(err, IdentityApiError::InvalidCredentials));
    api.change_password(account.id, "old-pw", "new-pw").await.unwrap();
    assert!(api.login("raj@example.com", "new-pw").await.is_ok());
    assert!(api.login("raj@example.com", "old-pw").await.is_err());
    tear_down(db).await;
}

#[tokio::test]
async fn deactivated_accounts_disappear_from_login() {
    let (db, api) = setup().await;
    let (account, code) = api.register("sam@example.com", "pw", None).await.unwrap();
    api.verify("sam@example.com", &code).await.unwrap();
    api.deactivate(account.id).await.unwrap();

    let err = api.login("sam@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, IdentityApiError::InvalidCredentials));
    // The row itself survives for audit.
    let row = db.fetch_account_by_id(account.id).await.unwrap().unwrap();
    assert!(row.is_deactivated());
    tear_down(db).await;
}

#[tokio::test]
async fn bearers_resolve_to_a_principal_and_a_cart_key() {
    use stage_commerce_engine::{
        db_types::SessionFingerprint,
        events::EventProducers,
        SessionApi,
        SessionPolicy,
    };
    let (db, api) = setup().await;
    let (account, code) = api.register("mo@example.com", "hunter2", None).await.unwrap();
    api.verify("mo@example.com", &code).await.unwrap();
    let sessions = SessionApi::new(db.clone(), SessionPolicy::default(), EventProducers::default());
    let session = sessions.start_session(account.id, SessionFingerprint::default()).await.unwrap();

    // A live bearer plus a cart token yields an owned key and mints nothing.
    let identity = api.resolve(Some(&session.token), Some("cart-abc")).await.unwrap();
    assert_eq!(identity.user_id, Some(account.id));
    assert_eq!(identity.cart_key.user_id, Some(account.id));
    assert_eq!(identity.cart_key.token, "cart-abc");
    assert!(identity.minted_cart_token.is_none());

    // No bearers at all: anonymous, with a fresh cart token minted for the caller to keep.
    let identity = api.resolve(None, None).await.unwrap();
    assert!(identity.user_id.is_none());
    let minted = identity.minted_cart_token.expect("a cart token should have been minted");
    assert_eq!(identity.cart_key.token, minted);

    // A revoked bearer degrades to anonymous instead of erroring.
    sessions.logout(&session.token).await.unwrap();
    let identity = api.resolve(Some(&session.token), Some("cart-abc")).await.unwrap();
    assert!(identity.user_id.is_none());
    assert!(identity.cart_key.user_id.is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn stale_verification_codes_are_rejected() {
    let (db, api) = setup().await;
    let (account, code) = api.register("ola@example.com", "pw", None).await.unwrap();
    // Age the code past its window.
    sqlx::query("UPDATE verification_codes SET created_at = datetime('now', '-11 minutes') WHERE user_id = $1")
        .bind(account.id)
        .execute(db.pool())
        .await
        .unwrap();
    let err = api.verify("ola@example.com", &code).await.unwrap_err();
    assert!(matches!(err, IdentityApiError::CodeExpired));
    // A reissued code works.
    let (_, fresh) = api.request_verification_code("ola@example.com").await.unwrap();
    let account = api.verify("ola@example.com", &fresh).await.unwrap();
    assert!(account.is_verified());
    tear_down(db).await;
}
