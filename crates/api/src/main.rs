//! Herald API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db;
use herald_notifier::fcm::FcmClient;
use herald_notifier::postgres::PgStore;
use herald_notifier::queue::RedisEventQueue;
use herald_notifier::service::NotificationService;

use herald_api::routes::create_router;
use herald_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald_api=debug,herald_notifier=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Herald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database pool created");

    // Creation events go to the notifier worker over Redis
    let queue = RedisEventQueue::connect(&config.redis_url, &config.queue_key).await?;
    tracing::info!("Redis connection established");

    let store = Arc::new(PgStore::new(pool));
    let gateway = Arc::new(FcmClient::from_config(&config).await?);
    let service = Arc::new(NotificationService::new(
        store.clone(),
        store,
        gateway,
        Arc::new(queue),
    ));

    let port = config.api_port;
    let state = AppState::new(service, config);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
