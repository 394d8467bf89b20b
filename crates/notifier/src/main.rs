//! Herald notifier worker: dispatches pushes for newly created notifications
//! and runs the retention sweep.

use std::sync::Arc;
use std::time::Duration;

use herald_common::config::AppConfig;
use herald_common::db;
use herald_notifier::fcm::FcmClient;
use herald_notifier::postgres::PgStore;
use herald_notifier::queue::RedisEventQueue;
use herald_notifier::retention::RetentionSweeper;
use herald_notifier::service::NotificationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald notifier starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let queue = RedisEventQueue::connect(&config.redis_url, &config.queue_key).await?;
    let gateway = Arc::new(FcmClient::from_config(&config).await?);

    let service = Arc::new(NotificationService::new(
        store.clone(),
        store.clone(),
        gateway,
        Arc::new(queue.clone()),
    ));
    let sweeper = RetentionSweeper::from_config(store, &config);

    let poll_timeout = Duration::from_secs(config.queue_poll_timeout_secs);
    let sweep_period = Duration::from_secs(config.retention_sweep_interval_secs);

    // Run until Ctrl+C; in-flight dispatch tasks are dropped with the runtime.
    tokio::select! {
        _ = queue.run_consumer(service, poll_timeout) => {}
        _ = sweeper.run(sweep_period) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Herald notifier stopped.");
    Ok(())
}
