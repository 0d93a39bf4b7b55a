use actix_web::{web, App, HttpServer};
use session_chat_service::{
    cache::CacheClient,
    config, error, logging,
    services::{
        ChatStore, ModerationService, RateLimiter, SessionAnalyticsService, SessionChatService,
        VodMetricsClient,
    },
    state::AppState,
    store::ZeroDbClient,
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);
    let limits = Arc::new(cfg.limits.clone());

    let store = ZeroDbClient::new(&cfg.store_url, &cfg.store_api_key);
    let cache = CacheClient::new(&cfg.redis_url)
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;
    let registry = ConnectionRegistry::new();

    let vod = cfg.vod_provider.as_ref().map(VodMetricsClient::new);
    if vod.is_none() {
        tracing::info!("no VOD provider configured, reports will carry the unavailable placeholder");
    }

    let chat = Arc::new(SessionChatService::new(
        ChatStore::new(store.clone()),
        ModerationService::new(store.clone(), cache.clone(), limits.clone()),
        RateLimiter::new(cache.clone(), limits.clone()),
        cache.clone(),
        limits.clone(),
    ));
    let analytics = Arc::new(SessionAnalyticsService::new(store, vod, limits));

    let state = AppState {
        config: cfg.clone(),
        registry,
        chat,
        analytics,
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting session-chat-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .service(session_chat_service::routes::wsroute::ws_handler)
            .service(session_chat_service::routes::messages::list_messages)
            .service(session_chat_service::routes::messages::export_messages)
            .service(session_chat_service::routes::sessions::list_participants)
            .service(session_chat_service::routes::sessions::typing_users)
            .service(session_chat_service::routes::sessions::raised_hands)
            .service(session_chat_service::routes::analytics::session_report)
            .service(session_chat_service::routes::analytics::attendance_csv)
            .service(session_chat_service::routes::analytics::compare_sessions)
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))
}
