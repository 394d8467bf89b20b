//! Notification-created events carried over a Redis list.
//!
//! Producers `LPUSH` the id of each new record; the worker `BRPOP`s ids and
//! runs the on-create trigger. Popping removes the event, so a dispatch that
//! crashes midway is not redelivered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use herald_common::error::AppError;

use crate::service::NotificationService;

/// Announces newly created notification records.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_created(&self, notification_id: Uuid) -> Result<(), AppError>;
}

/// Redis list used as the creation-event queue.
#[derive(Clone)]
pub struct RedisEventQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisEventQueue {
    pub async fn connect(redis_url: &str, key: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(queue = key, "Connected to Redis event queue");
        Ok(Self {
            conn,
            key: key.to_string(),
        })
    }

    /// Block for up to `timeout` waiting for the next created-notification id.
    ///
    /// Returns `None` on timeout. Entries that are not UUIDs are logged and dropped.
    pub async fn next_created(&self, timeout: Duration) -> Result<Option<Uuid>, AppError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> =
            conn.brpop(&self.key, timeout.as_secs_f64()).await?;

        let Some((_, raw)) = popped else {
            return Ok(None);
        };

        match Uuid::parse_str(&raw) {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                tracing::warn!(queue = %self.key, entry = %raw, "Dropping malformed queue entry");
                Ok(None)
            }
        }
    }

    /// Consume creation events forever, handling each on its own task.
    pub async fn run_consumer(self, service: Arc<NotificationService>, poll_timeout: Duration) {
        tracing::info!(queue = %self.key, "Waiting for created notifications");

        loop {
            match self.next_created(poll_timeout).await {
                Ok(Some(notification_id)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        service.handle_created(notification_id).await;
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read from event queue");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[async_trait]
impl EventPublisher for RedisEventQueue {
    async fn publish_created(&self, notification_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.key, notification_id.to_string())
            .await?;

        tracing::debug!(notification_id = %notification_id, "Published notification-created event");
        Ok(())
    }
}
