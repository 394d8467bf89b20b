//! PostgreSQL-backed implementation of the token and notification stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    DEFAULT_NOTIFICATION_TYPE, DeliveryMark, NewNotification, NotificationRecord,
};

use crate::store::{NotificationStore, TokenStore};

/// Store backed by the `users` and `notifications` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Option<Vec<String>>, AppError> {
        let row: Option<(Vec<String>,)> =
            sqlx::query_as("SELECT push_tokens FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(tokens,)| tokens))
    }

    async fn remove_tokens(&self, user_id: Uuid, tokens: &[String]) -> Result<(), AppError> {
        // Keeps the order of surviving tokens; removes every occurrence of each listed token.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET push_tokens = COALESCE(
                (
                    SELECT array_agg(t ORDER BY ord)
                    FROM unnest(push_tokens) WITH ORDINALITY AS u(t, ord)
                    WHERE t <> ALL($2)
                ),
                '{}'
            )
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(tokens)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            requested = tokens.len(),
            rows = result.rows_affected(),
            "Removed push tokens"
        );

        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, new: &NewNotification) -> Result<NotificationRecord, AppError> {
        let record: NotificationRecord = sqlx::query_as(
            r#"
            INSERT INTO notifications (
                id, user_id, title, message, type, post_id, from_user_id,
                from_user_name, action_url, priority, is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(
            new.notification_type
                .as_deref()
                .unwrap_or(DEFAULT_NOTIFICATION_TYPE),
        )
        .bind(&new.post_id)
        .bind(&new.from_user_id)
        .bind(&new.from_user_name)
        .bind(&new.action_url)
        .bind(new.priority.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError> {
        let record = sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_delivery(&self, id: Uuid, mark: &DeliveryMark) -> Result<(), AppError> {
        match mark {
            DeliveryMark::Sent {
                at,
                success_count,
                failure_count,
            } => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET sent = true, sent_at = $2, success_count = $3, failure_count = $4
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(at)
                .bind(*success_count as i32)
                .bind(*failure_count as i32)
                .execute(&self.pool)
                .await?;
            }
            DeliveryMark::Failed { at, error } => {
                sqlx::query(
                    "UPDATE notifications SET sent = false, error = $2, error_at = $3 WHERE id = $1",
                )
                .bind(id)
                .bind(error)
                .bind(at)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE id IN (
                SELECT id FROM notifications
                WHERE created_at < $1
                ORDER BY created_at
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
