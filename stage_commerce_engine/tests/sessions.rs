//! Device-session registry tests: the primary flag, fingerprint dedup, cooldown-gated revocation and logout.

use chrono::Duration;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use stage_commerce_engine::{
    db_types::{NewUserAccount, Role, SessionFingerprint},
    events::EventProducers,
    test_utils::{prepare_test_env, random_db_path},
    IdentityManagement,
    SessionApi,
    SessionApiError,
    SessionPolicy,
    SqliteDatabase,
};

async fn setup(policy: SessionPolicy) -> (SqliteDatabase, SessionApi<SqliteDatabase>, i64) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let account = db
        .create_account(NewUserAccount::new("kim@example.com", "hash"), Role::Standard)
        .await
        .expect("Error creating account");
    let api = SessionApi::new(db.clone(), policy, EventProducers::default());
    (db, api, account.id)
}

async fn tear_down(db: SqliteDatabase) {
    Sqlite::drop_database(db.url()).await.expect("Error dropping database");
}

fn laptop() -> SessionFingerprint {
    SessionFingerprint {
        ip: Some("203.0.113.7".into()),
        device: Some("Desktop".into()),
        os: Some("Linux".into()),
        user_agent: Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0".into()),
        ..Default::default()
    }
}

fn phone() -> SessionFingerprint {
    SessionFingerprint {
        ip: Some("203.0.113.9".into()),
        device: Some("Mobile".into()),
        os: Some("Android".into()),
        user_agent: Some("Mozilla/5.0 (Linux; Android 14) Chrome/124.0".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn only_the_first_ever_session_is_primary() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let first = api.start_session(user_id, laptop()).await.unwrap();
    assert!(first.is_primary);
    let second = api.start_session(user_id, phone()).await.unwrap();
    assert!(!second.is_primary);
    assert_ne!(first.id, second.id);
    tear_down(db).await;
}

#[tokio::test]
async fn same_device_reuses_the_registry_row() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let first = api.start_session(user_id, laptop()).await.unwrap();
    let again = api.start_session(user_id, laptop()).await.unwrap();
    assert_eq!(again.id, first.id);
    assert_ne!(again.token, first.token, "the token rotates on every login");

    // The old token stopped resolving; the new one works.
    assert!(matches!(api.authenticate(&first.token).await, Err(SessionApiError::SessionNotFound)));
    let session = api.authenticate(&again.token).await.unwrap();
    assert_eq!(session.id, first.id);

    let overview = api.list_sessions(user_id, Some(&again.token), laptop()).await.unwrap();
    assert!(!overview.token_minted);
    assert_eq!(overview.sessions.len(), 1);
    assert!(overview.sessions[0].is_current);
    tear_down(db).await;
}

#[tokio::test]
async fn a_cleared_bearer_gets_a_session_minted() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    api.start_session(user_id, laptop()).await.unwrap();

    // Cookie gone: the listing registers a session on the spot and pins it first.
    let overview = api.list_sessions(user_id, None, phone()).await.unwrap();
    assert!(overview.token_minted);
    assert_eq!(overview.sessions.len(), 2);
    assert!(overview.sessions[0].is_current);
    assert_eq!(overview.sessions[0].id, overview.current.id);
    assert!(api.authenticate(&overview.current.token).await.is_ok());
    tear_down(db).await;
}

#[tokio::test]
async fn the_current_session_is_pinned_first() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let old = api.start_session(user_id, laptop()).await.unwrap();
    api.start_session(user_id, phone()).await.unwrap();

    // The phone session is the most recent, but the caller's own session leads the list.
    let overview = api.list_sessions(user_id, Some(&old.token), laptop()).await.unwrap();
    assert_eq!(overview.sessions[0].id, old.id);
    assert!(overview.sessions[0].is_current);
    assert!(!overview.sessions[1].is_current);
    tear_down(db).await;
}

#[tokio::test]
async fn duplicate_fingerprints_collapse_to_the_newest() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let current = api.start_session(user_id, laptop()).await.unwrap();
    // A leftover row with the same fingerprint, as older deployments could produce.
    sqlx::query(
        "INSERT INTO device_sessions (user_id, token, ip, device, os, user_agent, last_seen) \
         VALUES ($1, 'stale-twin', $2, $3, $4, $5, datetime('now', '-2 days'))",
    )
    .bind(user_id)
    .bind("203.0.113.7")
    .bind("Desktop")
    .bind("Linux")
    .bind("Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0")
    .execute(db.pool())
    .await
    .unwrap();

    let overview = api.list_sessions(user_id, Some(&current.token), laptop()).await.unwrap();
    assert_eq!(overview.sessions.len(), 1);
    assert_eq!(overview.sessions[0].id, current.id);
    // The twin was revoked, not just hidden.
    assert!(matches!(api.authenticate("stale-twin").await, Err(SessionApiError::SessionRevoked)));
    tear_down(db).await;
}

#[tokio::test]
async fn young_sessions_cannot_revoke_other_devices() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let primary = api.start_session(user_id, laptop()).await.unwrap();
    let newcomer = api.start_session(user_id, phone()).await.unwrap();

    // The phone session is minutes old and not primary: the 24h default cooldown applies.
    let err = api.revoke_other(user_id, &newcomer.token, primary.id).await.unwrap_err();
    assert!(matches!(err, SessionApiError::CooldownActive(_)));
    let overview = api.list_sessions(user_id, Some(&newcomer.token), phone()).await.unwrap();
    assert!(!overview.can_revoke_others);
    assert!(overview.cooldown_hours_left > 0);
    assert!(api.authenticate(&primary.token).await.is_ok());
    tear_down(db).await;
}

#[tokio::test]
async fn the_primary_session_skips_the_cooldown() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let primary = api.start_session(user_id, laptop()).await.unwrap();
    let newcomer = api.start_session(user_id, phone()).await.unwrap();

    // Just-created, but primary: it may evict the newcomer immediately.
    api.revoke_other(user_id, &primary.token, newcomer.id).await.expect("Error revoking session");
    assert!(matches!(api.authenticate(&newcomer.token).await, Err(SessionApiError::SessionRevoked)));
    let overview = api.list_sessions(user_id, Some(&primary.token), laptop()).await.unwrap();
    assert!(overview.can_revoke_others);
    assert_eq!(overview.cooldown_hours_left, 0);
    tear_down(db).await;
}

#[tokio::test]
async fn revocation_works_once_the_cooldown_lapses() {
    let policy = SessionPolicy { revoke_cooldown: Duration::zero() };
    let (db, api, user_id) = setup(policy).await;
    let first = api.start_session(user_id, laptop()).await.unwrap();
    let second = api.start_session(user_id, phone()).await.unwrap();
    api.revoke_other(user_id, &second.token, first.id).await.expect("Error revoking session");

    assert!(matches!(api.authenticate(&first.token).await, Err(SessionApiError::SessionRevoked)));

    // Revoked rows still count for the primary flag: the replacement session is not primary.
    let replacement = api.start_session(user_id, laptop()).await.unwrap();
    assert!(!replacement.is_primary);
    assert_ne!(replacement.id, first.id);
    tear_down(db).await;
}

#[tokio::test]
async fn a_session_cannot_revoke_itself() {
    let policy = SessionPolicy { revoke_cooldown: Duration::zero() };
    let (db, api, user_id) = setup(policy).await;
    let session = api.start_session(user_id, laptop()).await.unwrap();
    let err = api.revoke_other(user_id, &session.token, session.id).await.unwrap_err();
    assert!(matches!(err, SessionApiError::SelfRevocation));
    assert!(api.authenticate(&session.token).await.is_ok());
    tear_down(db).await;
}

#[tokio::test]
async fn sessions_cannot_be_revoked_across_accounts() {
    let policy = SessionPolicy { revoke_cooldown: Duration::zero() };
    let (db, api, user_id) = setup(policy).await;
    let other = db
        .create_account(NewUserAccount::new("lee@example.com", "hash"), Role::Standard)
        .await
        .unwrap();
    let target = api.start_session(user_id, laptop()).await.unwrap();
    let intruder = api.start_session(other.id, phone()).await.unwrap();

    let err = api.revoke_other(other.id, &intruder.token, target.id).await.unwrap_err();
    assert!(matches!(err, SessionApiError::SessionNotFound));
    assert!(api.authenticate(&target.token).await.is_ok());
    tear_down(db).await;
}

#[tokio::test]
async fn logout_has_no_cooldown() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let session = api.start_session(user_id, laptop()).await.unwrap();
    assert!(api.logout(&session.token).await.unwrap());
    assert!(matches!(api.authenticate(&session.token).await, Err(SessionApiError::SessionRevoked)));
    // Logging out twice is harmless.
    assert!(!api.logout(&session.token).await.unwrap());
    tear_down(db).await;
}

#[tokio::test]
async fn geo_annotations_land_on_the_session_row() {
    let (db, api, user_id) = setup(SessionPolicy::default()).await;
    let session = api.start_session(user_id, laptop()).await.unwrap();
    assert!(session.city.is_none());
    api.annotate_geo(session.id, Some("Lisbon"), Some("PT")).await.expect("Error annotating session");
    let annotated = api.authenticate(&session.token).await.unwrap();
    assert_eq!(annotated.city.as_deref(), Some("Lisbon"));
    assert_eq!(annotated.country.as_deref(), Some("PT"));
    tear_down(db).await;
}
