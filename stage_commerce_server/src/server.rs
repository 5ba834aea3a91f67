use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use stage_commerce_engine::{
    events::EventProducers,
    CartApi,
    IdentityApi,
    OrderFlowApi,
    SessionApi,
    SqliteDatabase,
};

use crate::{
    auth::Argon2Verifier,
    config::ServerConfig,
    errors::ServerError,
    integrations::{build_notifier, create_event_handlers},
    routes::{
        add_cart_line,
        checkout,
        clear_cart,
        confirm_payment,
        get_cart,
        health,
        list_sessions,
        login,
        logout,
        order_history,
        pending_order,
        register,
        remove_cart_line,
        remove_cart_lines,
        request_delivery,
        revoke_session,
        update_cart_line,
        verify,
        ServerOptions,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_event_handlers(&config, db.clone());
    let producers = handlers.producers();
    tokio::spawn(handlers.start_handlers());
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let identities = IdentityApi::new(db.clone(), Argon2Verifier)
            .with_elevated_emails(config.elevated_emails.iter().cloned());
        let carts = CartApi::new(db.clone(), producers.clone());
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        let sessions = SessionApi::new(db.clone(), config.session_policy, producers.clone());
        let notifier = build_notifier(&config);
        let options =
            ServerOptions { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded };
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("stg::access_log"))
            .app_data(web::Data::new(identities))
            .app_data(web::Data::new(carts))
            .app_data(web::Data::new(orders))
            .app_data(web::Data::new(sessions))
            .app_data(web::Data::new(notifier))
            .app_data(web::Data::new(options))
            .service(health)
            .service(register)
            .service(verify)
            .service(login)
            .service(logout)
            .service(get_cart)
            .service(add_cart_line)
            .service(update_cart_line)
            .service(remove_cart_lines)
            .service(remove_cart_line)
            .service(clear_cart)
            .service(checkout)
            .service(pending_order)
            .service(confirm_payment)
            .service(order_history)
            .service(request_delivery)
            .service(list_sessions)
            .service(revoke_session)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
