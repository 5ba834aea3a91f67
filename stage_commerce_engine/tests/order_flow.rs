//! End-to-end order flow tests against a real sqlite backend: checkout, idempotent confirmation, sibling
//! cancellation, cart purging and promo redemption.

use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use stage_commerce_engine::{
    db_types::{CartKey, ContactInfo, LinePatch, LineSpec, NewUserAccount, OrderStatusType, Role},
    events::EventProducers,
    order_objects::PaymentReference,
    test_utils::{prepare_test_env, random_db_path},
    CartApi,
    CartManagement,
    IdentityManagement,
    OrderFlowApi,
    OrderFlowApiError,
    OrderManagement,
    SqliteDatabase,
};
use stg_common::Kopeck;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(db: SqliteDatabase) {
    Sqlite::drop_database(db.url()).await.expect("Error dropping database");
}

fn contact() -> ContactInfo {
    ContactInfo::new("Ada Shopper", "ada@example.com", "+7 900 000 00 00", "1 Test Lane", "")
}

async fn filled_cart(db: &SqliteDatabase, key: &CartKey) -> i64 {
    let carts = CartApi::new(db.clone(), EventProducers::default());
    let spec = LineSpec::new(Some(11), None, 2)
        .unwrap()
        .with_size("M")
        .with_display(Some("Tee".into()), Some(Kopeck::from_rubles(15)), None);
    let (cart, _) = carts.add_line(key, spec).await.expect("Error adding line");
    let spec = LineSpec::new(Some(12), Some(120), 1)
        .unwrap()
        .with_display(Some("Hoodie".into()), Some(Kopeck::from_rubles(40)), None);
    carts.add_line(key, spec).await.expect("Error adding line");
    cart.id
}

#[tokio::test]
async fn checkout_snapshots_active_lines_only() {
    let db = setup().await;
    let key = CartKey::anonymous("cart-token-1");
    let cart_id = filled_cart(&db, &key).await;
    let carts = CartApi::new(db.clone(), EventProducers::default());
    // Postpone the hoodie. It must not appear on the order.
    let lines = carts.lines(cart_id).await.unwrap();
    let hoodie = lines.iter().find(|l| l.variant_id == Some(120)).unwrap();
    carts
        .update_line(cart_id, hoodie.id, LinePatch { quantity: None, postponed: Some(true) })
        .await
        .unwrap();

    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, None, contact(), None, None).await.expect("Error checking out");
    assert_eq!(order.status, OrderStatusType::Pending);
    assert!(order.public_number.is_none());
    assert!(order.paid_at.is_none());
    assert_eq!(order.total, Kopeck::from_rubles(30));
    let snapshot = db.fetch_order_lines(order.id).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].product_id, 11);
    assert_eq!(snapshot[0].quantity, 2);
    tear_down(db).await;
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let db = setup().await;
    let carts = CartApi::new(db.clone(), EventProducers::default());
    let cart = carts.resolve_cart(&CartKey::anonymous("empty-cart")).await.unwrap();
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let err = api.checkout(cart.id, None, contact(), None, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::EmptyCart));
    tear_down(db).await;
}

#[tokio::test]
async fn confirmation_is_idempotent() {
    let db = setup().await;
    let key = CartKey::anonymous("cart-token-2");
    let cart_id = filled_cart(&db, &key).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, None, contact(), None, None).await.unwrap();

    let reference = PaymentReference::for_token(order.token.clone()).with_cart_token("cart-token-2");
    let first = api.confirm_payment(reference.clone()).await.expect("Error confirming");
    assert!(first.newly_confirmed);
    assert_eq!(first.order.status, OrderStatusType::Succeeded);
    assert!(first.order.paid_at.is_some());
    assert_eq!(first.order.public_number.as_deref(), Some(format!("STG-{:06}", order.id).as_str()));

    // The webhook fires again. Nothing changes and nothing is reported as new.
    let second = api.confirm_payment(reference).await.expect("Error confirming");
    assert!(!second.newly_confirmed);
    assert_eq!(second.order.paid_at, first.order.paid_at);
    assert_eq!(second.order.public_number, first.order.public_number);
    tear_down(db).await;
}

#[tokio::test]
async fn confirmation_purges_purchased_lines() {
    let db = setup().await;
    let key = CartKey::anonymous("cart-token-3");
    let cart_id = filled_cart(&db, &key).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, None, contact(), None, None).await.unwrap();
    let reference = PaymentReference::for_token(order.token).with_cart_token("cart-token-3");
    api.confirm_payment(reference).await.unwrap();

    let remaining = db.fetch_cart_lines(cart_id).await.unwrap();
    // The tee was purchased in full; the hoodie was never on the order.
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].variant_id, Some(120));
    tear_down(db).await;
}

#[tokio::test]
async fn purge_falls_back_to_product_and_size_decrement() {
    let db = setup().await;
    let key = CartKey::anonymous("cart-token-4");
    let carts = CartApi::new(db.clone(), EventProducers::default());
    let spec = LineSpec::new(Some(21), None, 3)
        .unwrap()
        .with_size("L")
        .with_display(Some("Socks".into()), Some(Kopeck::from_rubles(5)), None);
    let (cart, added) = carts.add_line(&key, spec).await.unwrap();
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart.id, None, contact(), None, None).await.unwrap();

    // The original line disappears and comes back with 5 units, so the back-reference goes stale and the
    // (product, size) fallback has to decrement instead.
    carts.remove_line(cart.id, added.line().id).await.unwrap();
    let respec = LineSpec::new(Some(21), None, 5)
        .unwrap()
        .with_size("L")
        .with_display(Some("Socks".into()), Some(Kopeck::from_rubles(5)), None);
    carts.add_line(&key, respec).await.unwrap();

    let reference = PaymentReference::for_token(order.token).with_cart_token("cart-token-4");
    api.confirm_payment(reference).await.unwrap();
    let remaining = db.fetch_cart_lines(cart.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].quantity, 2, "5 in the cart minus 3 purchased");
    tear_down(db).await;
}

#[tokio::test]
async fn confirming_one_order_cancels_pending_siblings() {
    let db = setup().await;
    let account = db.create_account(NewUserAccount::new("bob@example.com", "hash"), Role::Standard).await.unwrap();
    let key = CartKey::for_user(account.id, "cart-token-5");
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let cart_id = filled_cart(&db, &key).await;
    let abandoned = api.checkout(cart_id, Some(account.id), contact(), None, None).await.unwrap();
    // The shopper retried checkout; the first attempt was never paid.
    let cart_id = filled_cart(&db, &key).await;
    let retried = api.checkout(cart_id, Some(account.id), contact(), None, None).await.unwrap();
    assert_ne!(abandoned.id, retried.id);

    let outcome = api
        .confirm_payment(PaymentReference::for_token(retried.token).with_user(account.id))
        .await
        .expect("Error confirming");
    assert!(outcome.newly_confirmed);
    assert_eq!(outcome.canceled_siblings, vec![abandoned.id]);
    let stale = db.fetch_order_by_id(abandoned.id).await.unwrap().unwrap();
    assert_eq!(stale.status, OrderStatusType::Canceled);

    // A late duplicate webhook for the canceled sibling must not revive it.
    let outcome =
        api.confirm_payment(PaymentReference::for_token(stale.token).with_user(account.id)).await.unwrap();
    assert!(!outcome.newly_confirmed);
    assert_eq!(outcome.order.status, OrderStatusType::Canceled);
    assert!(outcome.order.paid_at.is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn fallback_resolution_finds_recent_unconfirmed_order() {
    let db = setup().await;
    let account = db.create_account(NewUserAccount::new("carol@example.com", "hash"), Role::Standard).await.unwrap();
    let key = CartKey::for_user(account.id, "cart-token-6");
    let cart_id = filled_cart(&db, &key).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, Some(account.id), contact(), None, None).await.unwrap();

    // The payment provider lost both the token and the id; only the logged-in shopper is known.
    let outcome = api.confirm_payment(PaymentReference::for_user(account.id)).await.expect("Error confirming");
    assert!(outcome.newly_confirmed);
    assert_eq!(outcome.order.id, order.id);

    // Nothing left to resolve afterwards.
    let err = api.confirm_payment(PaymentReference::for_user(account.id)).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::NoResolutionTarget));
    tear_down(db).await;
}

#[tokio::test]
async fn promo_redeems_once_per_principal_and_only_after_success() {
    let db = setup().await;
    let account = db.create_account(NewUserAccount::new("dave@example.com", "hash"), Role::Standard).await.unwrap();
    let key = CartKey::for_user(account.id, "cart-token-7");
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let cart_id = filled_cart(&db, &key).await;
    let order = api.checkout(cart_id, Some(account.id), contact(), Some("welcome10".into()), None).await.unwrap();
    assert_eq!(order.promo_code.as_deref(), Some("WELCOME10"));
    // Checkout alone must not redeem the code.
    assert!(!db.is_promo_redeemed("WELCOME10", account.id).await.unwrap());

    let outcome =
        api.confirm_payment(PaymentReference::for_token(order.token).with_user(account.id)).await.unwrap();
    assert!(outcome.promo_redeemed);
    assert!(db.is_promo_redeemed("WELCOME10", account.id).await.unwrap());

    // A second checkout with the same code is rejected up front.
    let cart_id = filled_cart(&db, &key).await;
    let err = api.checkout(cart_id, Some(account.id), contact(), Some("WELCOME10".into()), None).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::PromoAlreadyRedeemed(_)));
    tear_down(db).await;
}

#[tokio::test]
async fn guest_order_is_claimed_by_token() {
    let db = setup().await;
    let key = CartKey::anonymous("cart-token-8");
    let cart_id = filled_cart(&db, &key).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, None, contact(), None, None).await.unwrap();
    assert!(order.user_id.is_none());

    let account = db.create_account(NewUserAccount::new("erin@example.com", "hash"), Role::Standard).await.unwrap();
    let claimed = db.claim_guest_orders(account.id, &order.token).await.unwrap();
    assert_eq!(claimed, 1);
    let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.user_id, Some(account.id));

    // Claiming again, or by another account, is a no-op.
    let other = db.create_account(NewUserAccount::new("mallory@example.com", "hash"), Role::Standard).await.unwrap();
    assert_eq!(db.claim_guest_orders(other.id, &order.token).await.unwrap(), 0);
    let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.user_id, Some(account.id));
    tear_down(db).await;
}

#[tokio::test]
async fn delivery_slot_requires_a_succeeded_order() {
    let db = setup().await;
    let account = db.create_account(NewUserAccount::new("faye@example.com", "hash"), Role::Standard).await.unwrap();
    let key = CartKey::for_user(account.id, "cart-token-9");
    let cart_id = filled_cart(&db, &key).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, Some(account.id), contact(), None, None).await.unwrap();

    let err = api.request_delivery(account.id, order.id, "2026-09-02 10:00").await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::DeliveryNotAllowed(_)));

    api.confirm_payment(PaymentReference::for_token(order.token).with_user(account.id)).await.unwrap();
    let updated = api.request_delivery(account.id, order.id, "2026-09-02 10:00").await.unwrap();
    assert_eq!(updated.delivery_slot.as_deref(), Some("2026-09-02 10:00"));
    info!("🚀️ delivery test complete");
    tear_down(db).await;
}

#[tokio::test]
async fn checkout_can_take_a_chosen_subset_of_lines() {
    let db = setup().await;
    let key = CartKey::anonymous("cart-token-9");
    let cart_id = filled_cart(&db, &key).await;
    let carts = CartApi::new(db.clone(), EventProducers::default());
    let lines = carts.lines(cart_id).await.unwrap();
    let tee = lines.iter().find(|l| l.product_id == Some(11)).unwrap();

    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, None, contact(), None, Some(&[tee.id])).await.unwrap();
    assert_eq!(order.total, Kopeck::from_rubles(30), "only the two tees were bought");
    let snapshot = db.fetch_order_lines(order.id).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].product_id, 11);

    // An explicit empty selection is rejected up front.
    let err = api.checkout(cart_id, None, contact(), None, Some(&[])).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::EmptyCart));
    tear_down(db).await;
}

#[tokio::test]
async fn foreign_order_ids_do_not_confirm_or_leak() {
    let db = setup().await;
    let owner = db.create_account(NewUserAccount::new("own@example.com", "hash"), Role::Standard).await.unwrap();
    let intruder =
        db.create_account(NewUserAccount::new("else@example.com", "hash"), Role::Standard).await.unwrap();
    let cart_id = filled_cart(&db, &CartKey::for_user(owner.id, "cart-token-10")).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, Some(owner.id), contact(), None, None).await.unwrap();

    // Someone else's order id resolves exactly like a nonexistent one.
    let foreign = PaymentReference::for_order_id(order.id).with_user(intruder.id);
    let err = api.confirm_payment(foreign).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::NoResolutionTarget));
    let missing = PaymentReference::for_order_id(order.id + 999).with_user(intruder.id);
    let err = api.confirm_payment(missing).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::NoResolutionTarget));

    // The owner's id hint still works.
    let outcome = api.confirm_payment(PaymentReference::for_order_id(order.id).with_user(owner.id)).await.unwrap();
    assert!(outcome.newly_confirmed);
    tear_down(db).await;
}

#[tokio::test]
async fn an_owned_order_token_only_confirms_for_its_owner() {
    let db = setup().await;
    let owner = db.create_account(NewUserAccount::new("nora@example.com", "hash"), Role::Standard).await.unwrap();
    let intruder =
        db.create_account(NewUserAccount::new("oleg@example.com", "hash"), Role::Standard).await.unwrap();
    let cart_id = filled_cart(&db, &CartKey::for_user(owner.id, "cart-token-11")).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.checkout(cart_id, Some(owner.id), contact(), None, None).await.unwrap();

    // A leaked token in someone else's hands answers exactly like a missing order.
    let stolen = PaymentReference::for_token(order.token.clone()).with_user(intruder.id);
    let err = api.confirm_payment(stolen).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::NoResolutionTarget));
    // So does the bare token with no principal at all.
    let err = api.confirm_payment(PaymentReference::for_token(order.token.clone())).await.unwrap_err();
    assert!(matches!(err, OrderFlowApiError::NoResolutionTarget));
    let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);

    let outcome =
        api.confirm_payment(PaymentReference::for_token(order.token).with_user(owner.id)).await.unwrap();
    assert!(outcome.newly_confirmed);
    tear_down(db).await;
}
