use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate_server::{
    config::ServerConfig, db::SqliteStore, metrics::register_metrics, routes, state::AppState,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().expect("Failed to load configuration");
    let host = config.host.clone();
    let port = config.port;
    let base_path = config.base_path.clone();
    let allowed_origins = config.allowed_origins.clone();
    let rate_limit_rpm = config.rate_limit_rpm;

    tracing::info!("Starting paygate on {}:{}", host, port);
    tracing::info!("API base path: {}", if base_path.is_empty() { "/" } else { base_path.as_str() });
    tracing::info!("Callback base: {}", config.providers.callback_base);
    tracing::info!(
        "Admin listing: {}",
        if config.admin_token.is_some() {
            "enabled"
        } else {
            "disabled (dev mode)"
        }
    );

    let store = SqliteStore::new(&config.db_path).expect("Failed to initialize database");
    tracing::info!("Database initialized at: {}", config.db_path);
    match store.count_merchants() {
        Ok(n) => tracing::info!("{n} merchants registered"),
        Err(e) => tracing::warn!("Failed to count merchants: {e}"),
    }

    register_metrics();

    let state = AppState::new(config, store).expect("Failed to create HTTP client");
    let state_data = web::Data::new(state);

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm as u64)
        .finish()
        .expect("Failed to create rate limiter config");

    HttpServer::new(move || {
        let cors = paygate_server::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .app_data(web::PayloadConfig::new(1024 * 1024)) // 1MB body limit
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Governor::new(&governor_conf))
            .configure(routes::health::configure)
            .service(routes::api_scope(&base_path))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
