//! Storage seams for users' push tokens and notification records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryMark, NewNotification, NotificationRecord};

/// Access to each user's set of push tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The user's tokens, or `None` when the user record does not exist.
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Option<Vec<String>>, AppError>;

    /// Remove every occurrence of `tokens` from the user's token set.
    ///
    /// Tokens that are not present are ignored, so repeating a removal is a no-op.
    async fn remove_tokens(&self, user_id: Uuid, tokens: &[String]) -> Result<(), AppError>;
}

/// Access to notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new record. The store assigns `id` and `created_at`.
    async fn insert(&self, new: &NewNotification) -> Result<NotificationRecord, AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError>;

    /// Number of the user's records with `is_read == false`.
    async fn count_unread(&self, user_id: Uuid) -> Result<i64, AppError>;

    /// Record the delivery result on the notification.
    async fn mark_delivery(&self, id: Uuid, mark: &DeliveryMark) -> Result<(), AppError>;

    /// Flip `is_read` on a record owned by `user_id`. Returns false if no such record.
    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError>;

    /// Delete up to `limit` records with `created_at < cutoff`, atomically.
    /// Returns the number deleted.
    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AppError>;
}
