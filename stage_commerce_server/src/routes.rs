//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler that acts on behalf of someone starts from [`RequestIdentity`] (the raw cookies) and resolves it
//! through [`IdentityApi::resolve`](stage_commerce_engine::IdentityApi::resolve). A dead session bearer degrades
//! to an anonymous caller; routes that need a principal answer 401 themselves.

use actix_web::{delete, get, patch, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use stage_commerce_engine::{
    db_types::{DeviceSession, LinePatch, UserAccount},
    order_objects::PaymentReference,
    CartApi,
    Identity,
    IdentityApi,
    OrderFlowApi,
    SessionApi,
    SqliteDatabase,
};

use crate::{
    auth::{
        cart_cookie,
        order_cookie,
        removal_cookie,
        session_cookie,
        Argon2Verifier,
        RequestIdentity,
        ORDER_COOKIE,
        SESSION_COOKIE,
    },
    data_objects::{
        AccountResponse,
        AddLineRequest,
        CartResponse,
        CheckoutRequest,
        ConfirmPaymentRequest,
        ConfirmPaymentResponse,
        DeliveryRequest,
        JsonResponse,
        LoginRequest,
        RegisterRequest,
        RemoveLinesRequest,
        RevokeSessionRequest,
        SessionListResponse,
        UpdateLineRequest,
        VerifyRequest,
    },
    errors::ServerError,
    helpers::request_fingerprint,
    integrations::Notifier,
};

pub type Identities = IdentityApi<SqliteDatabase, Argon2Verifier>;
pub type Carts = CartApi<SqliteDatabase>;
pub type Orders = OrderFlowApi<SqliteDatabase>;
pub type Sessions = SessionApi<SqliteDatabase>;

/// The subset of the server configuration the handlers need. Kept small on purpose; no secrets travel here.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

// ----------------------------------------------   Health  ----------------------------------------------------

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Auth  ----------------------------------------------------

#[post("/auth/register")]
pub async fn register(
    body: web::Json<RegisterRequest>,
    identities: web::Data<Identities>,
    notifier: web::Data<Option<Notifier>>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let (account, code) = identities.register(&body.email, &body.password, body.full_name).await?;
    dispatch_verification_code(notifier.get_ref(), &account.email, code);
    Ok(HttpResponse::Created().json(AccountResponse::from(&account)))
}

/// Completes email verification and, like login, binds the caller's anonymous state to the account: the session
/// is created, an anonymous cart may be adopted and guest orders may be claimed.
#[post("/auth/verify")]
pub async fn verify(
    req: HttpRequest,
    body: web::Json<VerifyRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
    sessions: web::Data<Sessions>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let account = identities.verify(&body.email, &body.code).await?;
    let session =
        bind_principal(&account, &identity, &req, &options, &identities, &carts, &sessions).await?;
    Ok(principal_response(&account, session, &identity))
}

#[post("/auth/login")]
pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
    sessions: web::Data<Sessions>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let account = identities.login(&body.email, &body.password).await?;
    let session =
        bind_principal(&account, &identity, &req, &options, &identities, &carts, &sessions).await?;
    Ok(principal_response(&account, session, &identity))
}

/// Idempotent: logging out with a stale or missing bearer still clears the cookie and succeeds. The cart cookie
/// survives a logout on purpose.
#[post("/auth/logout")]
pub async fn logout(
    identity: RequestIdentity,
    sessions: web::Data<Sessions>,
) -> Result<HttpResponse, ServerError> {
    if let Some(token) = &identity.session_token {
        sessions.logout(token).await?;
    }
    Ok(HttpResponse::Ok().cookie(removal_cookie(SESSION_COOKIE)).json(JsonResponse::success("Logged out")))
}

//----------------------------------------------   Cart  ----------------------------------------------------

#[get("/cart")]
pub async fn get_cart(
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
) -> Result<HttpResponse, ServerError> {
    let resolved = resolve(&identities, &identity).await?;
    let (cart, lines) = carts.cart_with_lines(&resolved.cart_key).await?;
    Ok(with_minted_cart_token(HttpResponse::Ok(), &resolved).json(CartResponse::new(&cart, lines)))
}

#[post("/cart")]
pub async fn add_cart_line(
    body: web::Json<AddLineRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
) -> Result<HttpResponse, ServerError> {
    let spec = body.into_inner().into_spec()?;
    let resolved = resolve(&identities, &identity).await?;
    let (cart, _result) = carts.add_line(&resolved.cart_key, spec).await?;
    let lines = carts.lines(cart.id).await?;
    Ok(with_minted_cart_token(HttpResponse::Ok(), &resolved).json(CartResponse::new(&cart, lines)))
}

#[patch("/cart")]
pub async fn update_cart_line(
    body: web::Json<UpdateLineRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let resolved = resolve(&identities, &identity).await?;
    let cart = carts.resolve_cart(&resolved.cart_key).await?;
    let patch = LinePatch { quantity: body.quantity, postponed: body.postponed };
    carts.update_line(cart.id, body.line_id, patch).await?;
    let lines = carts.lines(cart.id).await?;
    Ok(with_minted_cart_token(HttpResponse::Ok(), &resolved).json(CartResponse::new(&cart, lines)))
}

/// Batch removal. Ids already gone are skipped so a retried delete answers the same way; an id belonging to
/// another cart 404s and nothing is deleted.
#[delete("/cart/lines")]
pub async fn remove_cart_lines(
    body: web::Json<RemoveLinesRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
) -> Result<HttpResponse, ServerError> {
    let ids = body.into_inner().ids;
    let resolved = resolve(&identities, &identity).await?;
    let cart = carts.resolve_cart(&resolved.cart_key).await?;
    carts.remove_lines(cart.id, &ids).await?;
    let lines = carts.lines(cart.id).await?;
    Ok(with_minted_cart_token(HttpResponse::Ok(), &resolved).json(CartResponse::new(&cart, lines)))
}

#[delete("/cart/{line_id}")]
pub async fn remove_cart_line(
    path: web::Path<i64>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
) -> Result<HttpResponse, ServerError> {
    let line_id = path.into_inner();
    let resolved = resolve(&identities, &identity).await?;
    let cart = carts.resolve_cart(&resolved.cart_key).await?;
    carts.remove_line(cart.id, line_id).await?;
    let lines = carts.lines(cart.id).await?;
    Ok(with_minted_cart_token(HttpResponse::Ok(), &resolved).json(CartResponse::new(&cart, lines)))
}

#[delete("/cart")]
pub async fn clear_cart(
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
) -> Result<HttpResponse, ServerError> {
    let resolved = resolve(&identities, &identity).await?;
    let cart = carts.resolve_cart(&resolved.cart_key).await?;
    let removed = carts.clear(cart.id).await?;
    Ok(with_minted_cart_token(HttpResponse::Ok(), &resolved)
        .json(JsonResponse::success(format!("Removed {removed} line(s)"))))
}

//----------------------------------------------   Checkout  ----------------------------------------------------

/// Snapshots the cart into a `Pending` order. Guests get the order's bearer token as a cookie so a later login
/// can claim the order; the cart itself is untouched until the payment is confirmed.
#[post("/checkout")]
pub async fn checkout(
    body: web::Json<CheckoutRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    carts: web::Data<Carts>,
    orders: web::Data<Orders>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let resolved = resolve(&identities, &identity).await?;
    let cart = carts.resolve_cart(&resolved.cart_key).await?;
    let order = orders
        .checkout(cart.id, resolved.user_id, body.contact.into_contact(), body.promo_code, body.line_ids.as_deref())
        .await?;
    let mut builder = with_minted_cart_token(HttpResponse::Created(), &resolved);
    if resolved.user_id.is_none() {
        builder.cookie(order_cookie(order.token.clone()));
    }
    Ok(builder.json(order))
}

/// The storefront's "is there an unpaid order?" probe. Answers null rather than 404 when there is none.
#[get("/checkout/pending")]
pub async fn pending_order(
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    orders: web::Data<Orders>,
) -> Result<HttpResponse, ServerError> {
    let resolved = resolve(&identities, &identity).await?;
    let user_id = resolved.user_id.ok_or(ServerError::Unauthenticated)?;
    let pending = orders.pending_order(user_id).await?;
    Ok(HttpResponse::Ok().json(pending))
}

/// Payment confirmation, safe under at-least-once delivery. The hints are taken from the body first and the
/// cookies second; the response envelope is identical for the winning call and for any replay.
#[post("/confirm-payment")]
pub async fn confirm_payment(
    body: web::Json<ConfirmPaymentRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    orders: web::Data<Orders>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let resolved = resolve(&identities, &identity).await?;
    let reference = PaymentReference {
        order_token: body.order_token.or_else(|| identity.order_token.clone()),
        order_id: body.order_id,
        user_id: resolved.user_id,
        cart_token: identity.cart_token.clone(),
    };
    let outcome = orders.confirm_payment(reference).await?;
    let response = ConfirmPaymentResponse {
        success: true,
        order_id: outcome.order.id,
        public_number: outcome.order.public_number.clone(),
        already_confirmed: !outcome.newly_confirmed,
    };
    // The guest order bearer has served its purpose once the order is paid.
    Ok(HttpResponse::Ok().cookie(removal_cookie(ORDER_COOKIE)).json(response))
}

//----------------------------------------------   Orders  ----------------------------------------------------

#[get("/orders/history")]
pub async fn order_history(
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    orders: web::Data<Orders>,
) -> Result<HttpResponse, ServerError> {
    let resolved = resolve(&identities, &identity).await?;
    let user_id = resolved.user_id.ok_or(ServerError::Unauthenticated)?;
    let history = orders.order_history(user_id).await?;
    Ok(HttpResponse::Ok().json(history))
}

#[post("/orders/delivery")]
pub async fn request_delivery(
    body: web::Json<DeliveryRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    orders: web::Data<Orders>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let resolved = resolve(&identities, &identity).await?;
    let user_id = resolved.user_id.ok_or(ServerError::Unauthenticated)?;
    let order = orders.request_delivery(user_id, body.order_id, &body.slot).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Sessions  ----------------------------------------------------

#[get("/sessions")]
pub async fn list_sessions(
    req: HttpRequest,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    sessions: web::Data<Sessions>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let resolved = resolve(&identities, &identity).await?;
    let user_id = resolved.user_id.ok_or(ServerError::Unauthenticated)?;
    let fingerprint = request_fingerprint(&req, options.use_x_forwarded_for, options.use_forwarded);
    let overview = sessions.list_sessions(user_id, identity.session_token.as_deref(), fingerprint).await?;
    let response = SessionListResponse {
        sessions: overview.sessions,
        can_revoke_others: overview.can_revoke_others,
        cooldown_hours_left: overview.cooldown_hours_left,
    };
    let mut builder = HttpResponse::Ok();
    if overview.token_minted {
        builder.cookie(session_cookie(overview.current.token));
    }
    Ok(builder.json(response))
}

#[post("/sessions/revoke")]
pub async fn revoke_session(
    body: web::Json<RevokeSessionRequest>,
    identity: RequestIdentity,
    identities: web::Data<Identities>,
    sessions: web::Data<Sessions>,
) -> Result<HttpResponse, ServerError> {
    let resolved = resolve(&identities, &identity).await?;
    let user_id = resolved.user_id.ok_or(ServerError::Unauthenticated)?;
    let bearer = identity.session_token.as_deref().ok_or(ServerError::Unauthenticated)?;
    sessions.revoke_other(user_id, bearer, body.session_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Session revoked")))
}

//----------------------------------------------   Shared plumbing  ----------------------------------------------------

async fn resolve(identities: &Identities, identity: &RequestIdentity) -> Result<Identity, ServerError> {
    let resolved =
        identities.resolve(identity.session_token.as_deref(), identity.cart_token.as_deref()).await?;
    Ok(resolved)
}

/// Attaches the freshly minted cart token, when there is one, to the response being built.
fn with_minted_cart_token(
    mut builder: actix_web::HttpResponseBuilder,
    resolved: &Identity,
) -> actix_web::HttpResponseBuilder {
    if let Some(token) = &resolved.minted_cart_token {
        builder.cookie(cart_cookie(token.clone()));
    }
    builder
}

/// The post-authentication binding shared by login and verification. The session is required; cart adoption and
/// guest-order claiming are best-effort and never fail the authentication itself.
async fn bind_principal(
    account: &UserAccount,
    identity: &RequestIdentity,
    req: &HttpRequest,
    options: &ServerOptions,
    identities: &Identities,
    carts: &Carts,
    sessions: &Sessions,
) -> Result<DeviceSession, ServerError> {
    let fingerprint = request_fingerprint(req, options.use_x_forwarded_for, options.use_forwarded);
    let session = sessions.start_session(account.id, fingerprint).await?;
    if let Some(cart_token) = &identity.cart_token {
        let key = stage_commerce_engine::db_types::CartKey::for_user(account.id, cart_token.clone());
        if let Err(e) = carts.resolve_cart(&key).await {
            warn!("💻️ Could not bind the cart to account #{} at login. {e}", account.id);
        }
    }
    if let Some(order_token) = &identity.order_token {
        if let Err(e) = identities.claim_guest_orders(account.id, order_token).await {
            warn!("💻️ Could not claim guest orders for account #{} at login. {e}", account.id);
        }
    }
    Ok(session)
}

fn principal_response(account: &UserAccount, session: DeviceSession, identity: &RequestIdentity) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    builder.cookie(session_cookie(session.token));
    if identity.order_token.is_some() {
        builder.cookie(removal_cookie(ORDER_COOKIE));
    }
    builder.json(AccountResponse::from(account))
}

fn dispatch_verification_code(notifier: &Option<Notifier>, email: &str, code: String) {
    let Some(notifier) = notifier.clone() else {
        warn!("💻️ No notifier is configured; the verification code for {email} cannot be delivered");
        return;
    };
    let email = email.to_string();
    tokio::spawn(async move {
        notifier.verification_code(&email, &code).await;
    });
}
