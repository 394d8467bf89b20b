use std::str::FromStr;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the HTTP API binds to (default: 3000)
    pub api_port: u16,

    /// JWT secret used to verify caller identity
    pub jwt_secret: String,

    /// Firebase project that owns the registration tokens (default: the key's project)
    pub fcm_project_id: Option<String>,

    /// Service account key used to mint FCM access tokens
    pub fcm_service_account_path: Option<String>,

    /// Base URL of the FCM API (overridable for tests)
    pub fcm_endpoint: String,

    /// Redis list carrying ids of newly created notifications
    pub queue_key: String,

    /// Seconds the worker blocks on the queue before re-polling (default: 5)
    pub queue_poll_timeout_secs: u64,

    /// Notifications older than this many days are swept (default: 30)
    pub retention_days: i64,

    /// Maximum records deleted per sweep batch (default: 500)
    pub retention_batch_size: i64,

    /// Seconds between retention sweeps (default: one week)
    pub retention_sweep_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            api_port: parse_var("API_PORT", "3000")?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            fcm_project_id: std::env::var("FCM_PROJECT_ID").ok(),
            fcm_service_account_path: std::env::var("FCM_SERVICE_ACCOUNT_PATH")
                .or_else(|_| std::env::var("GOOGLE_APPLICATION_CREDENTIALS"))
                .ok(),
            fcm_endpoint: std::env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
            queue_key: std::env::var("QUEUE_KEY")
                .unwrap_or_else(|_| "herald:notifications:created".to_string()),
            queue_poll_timeout_secs: parse_var("QUEUE_POLL_TIMEOUT_SECS", "5")?,
            retention_days: parse_var("RETENTION_DAYS", "30")?,
            retention_batch_size: parse_var("RETENTION_BATCH_SIZE", "500")?,
            retention_sweep_interval_secs: parse_var("RETENTION_SWEEP_INTERVAL_SECS", "604800")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but would make the worker misbehave.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retention_days < 1 {
            anyhow::bail!("RETENTION_DAYS must be at least 1, got {}", self.retention_days);
        }
        if self.retention_batch_size < 1 {
            anyhow::bail!(
                "RETENTION_BATCH_SIZE must be at least 1, got {}",
                self.retention_batch_size
            );
        }
        if self.retention_sweep_interval_secs < 1 {
            anyhow::bail!("RETENTION_SWEEP_INTERVAL_SECS must be at least 1");
        }
        if self.queue_poll_timeout_secs < 1 {
            anyhow::bail!("QUEUE_POLL_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

/// Read `name` from the environment (falling back to `default`) and parse it.
fn parse_var<T: FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        })
}
