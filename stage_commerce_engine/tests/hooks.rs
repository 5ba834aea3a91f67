//! Hook delivery tests: confirmation notifies subscribers exactly once, and reused sessions stay quiet.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use stage_commerce_engine::{
    db_types::{CartKey, ContactInfo, LineSpec, NewUserAccount, Role, SessionFingerprint},
    events::{EventHandlers, EventHooks},
    order_objects::PaymentReference,
    test_utils::{prepare_test_env, random_db_path},
    CartApi,
    IdentityManagement,
    OrderFlowApi,
    SessionApi,
    SessionPolicy,
    SqliteDatabase,
};
use stg_common::Kopeck;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::SeqCst)
    }
}

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(db: SqliteDatabase) {
    Sqlite::drop_database(db.url()).await.expect("Error dropping database");
}

#[tokio::test]
async fn order_confirmed_hook_fires_exactly_once() {
    let db = setup().await;
    let fired = HookCalled::default();
    let fired_copy = fired.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_confirmed(move |ev| {
        info!("🪝️ order #{} confirmed", ev.order.id);
        fired_copy.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();

    let carts = CartApi::new(db.clone(), producers.clone());
    let api = OrderFlowApi::new(db.clone(), producers);
    let key = CartKey::anonymous("hook-cart");
    let spec = LineSpec::new(Some(1), None, 1)
        .unwrap()
        .with_display(Some("Tee".into()), Some(Kopeck::from_rubles(10)), None);
    let (cart, _) = carts.add_line(&key, spec).await.unwrap();
    let order = api.checkout(cart.id, None, ContactInfo::default(), None, None).await.unwrap();

    let reference = PaymentReference::for_token(order.token);
    api.confirm_payment(reference.clone()).await.unwrap();
    api.confirm_payment(reference.clone()).await.unwrap();
    api.confirm_payment(reference).await.unwrap();

    // Dropping every producer lets the handler drain and shut down.
    drop(api);
    drop(carts);
    handlers.start_handlers().await;
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    assert_eq!(fired.count(), 1, "three confirmations, one event");
    tear_down(db).await;
}

#[tokio::test]
async fn session_created_hook_ignores_reused_devices() {
    let db = setup().await;
    let fired = HookCalled::default();
    let fired_copy = fired.clone();
    let mut hooks = EventHooks::default();
    hooks.on_session_created(move |ev| {
        info!("🪝️ session #{} created", ev.session.id);
        fired_copy.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();

    let account = db.create_account(NewUserAccount::new("tess@example.com", "hash"), Role::Standard).await.unwrap();
    let api = SessionApi::new(db.clone(), SessionPolicy::default(), producers);
    let fp = SessionFingerprint {
        ip: Some("198.51.100.4".into()),
        device: Some("Desktop".into()),
        os: Some("macOS".into()),
        user_agent: Some("Safari".into()),
        ..Default::default()
    };
    api.start_session(account.id, fp.clone()).await.unwrap();
    api.start_session(account.id, fp).await.unwrap();

    drop(api);
    handlers.start_handlers().await;
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    assert_eq!(fired.count(), 1, "two logins from one device, one event");
    tear_down(db).await;
}
