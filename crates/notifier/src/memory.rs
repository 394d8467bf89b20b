//! In-process store, gateway, and publisher.
//!
//! These back the trigger and HTTP tests so the full pipeline runs without
//! PostgreSQL, Redis, or FCM. Each double can be told to fail specific
//! operations and records what was asked of it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    DEFAULT_NOTIFICATION_TYPE, DeliveryMark, NewNotification, NotificationRecord, Priority,
};

use crate::gateway::{DeliveryOutcome, MulticastResponse, PushGateway, PushMessage};
use crate::queue::EventPublisher;
use crate::store::{NotificationStore, TokenStore};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    TokensForUser,
    RemoveTokens,
    Insert,
    Find,
    CountUnread,
    MarkDelivery,
    MarkRead,
    DeleteCreatedBefore,
}

#[derive(Default)]
struct StoreState {
    users: HashMap<Uuid, Vec<String>>,
    notifications: HashMap<Uuid, NotificationRecord>,
    failing: HashSet<StoreOp>,
    removal_calls: usize,
}

/// Token and notification store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    operations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user with the given tokens and return its id.
    pub async fn add_user(&self, tokens: Vec<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.users.insert(id, tokens);
        id
    }

    pub async fn tokens_of(&self, user_id: Uuid) -> Option<Vec<String>> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    /// Insert a notification directly, bypassing the trait.
    pub async fn seed_notification(&self, user_id: Option<Uuid>, is_read: bool) -> Uuid {
        let mut record = blank_record(user_id, Utc::now());
        record.is_read = is_read;
        let id = record.id;
        self.state.lock().await.notifications.insert(id, record);
        id
    }

    /// Insert a notification with a specific creation time.
    pub async fn seed_notification_at(&self, created_at: DateTime<Utc>) -> Uuid {
        let record = blank_record(None, created_at);
        let id = record.id;
        self.state.lock().await.notifications.insert(id, record);
        id
    }

    pub async fn notification(&self, id: Uuid) -> Option<NotificationRecord> {
        self.state.lock().await.notifications.get(&id).cloned()
    }

    pub async fn notification_count(&self) -> usize {
        self.state.lock().await.notifications.len()
    }

    /// Make every subsequent call of `op` return an error.
    pub async fn fail(&self, op: StoreOp) {
        self.state.lock().await.failing.insert(op);
    }

    /// Number of `remove_tokens` calls that reached the store.
    pub async fn removal_calls(&self) -> usize {
        self.state.lock().await.removal_calls
    }

    /// Total number of trait calls made against this store.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn check(&self, state: &StoreState, op: StoreOp) -> Result<(), AppError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if state.failing.contains(&op) {
            return Err(AppError::Internal(format!("{:?} unavailable", op)));
        }
        Ok(())
    }
}

fn blank_record(user_id: Option<Uuid>, created_at: DateTime<Utc>) -> NotificationRecord {
    NotificationRecord {
        id: Uuid::new_v4(),
        user_id,
        title: "Seeded".to_string(),
        message: "Seeded notification".to_string(),
        notification_type: DEFAULT_NOTIFICATION_TYPE.to_string(),
        post_id: None,
        from_user_id: None,
        from_user_name: None,
        action_url: None,
        priority: Priority::Medium,
        is_read: false,
        created_at,
        sent: None,
        sent_at: None,
        success_count: None,
        failure_count: None,
        error: None,
        error_at: None,
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Option<Vec<String>>, AppError> {
        let state = self.state.lock().await;
        self.check(&state, StoreOp::TokensForUser)?;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn remove_tokens(&self, user_id: Uuid, tokens: &[String]) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        self.check(&state, StoreOp::RemoveTokens)?;
        state.removal_calls += 1;
        if let Some(existing) = state.users.get_mut(&user_id) {
            existing.retain(|t| !tokens.contains(t));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, new: &NewNotification) -> Result<NotificationRecord, AppError> {
        let mut state = self.state.lock().await;
        self.check(&state, StoreOp::Insert)?;
        let record = NotificationRecord {
            title: new.title.clone(),
            message: new.message.clone(),
            notification_type: new
                .notification_type
                .clone()
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_TYPE.to_string()),
            post_id: new.post_id.clone(),
            from_user_id: new.from_user_id.clone(),
            from_user_name: new.from_user_name.clone(),
            action_url: new.action_url.clone(),
            priority: new.priority,
            ..blank_record(new.user_id, Utc::now())
        };
        state.notifications.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError> {
        let state = self.state.lock().await;
        self.check(&state, StoreOp::Find)?;
        Ok(state.notifications.get(&id).cloned())
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.lock().await;
        self.check(&state, StoreOp::CountUnread)?;
        let count = state
            .notifications
            .values()
            .filter(|n| n.user_id == Some(user_id) && !n.is_read)
            .count();
        Ok(count as i64)
    }

    async fn mark_delivery(&self, id: Uuid, mark: &DeliveryMark) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        self.check(&state, StoreOp::MarkDelivery)?;
        if let Some(record) = state.notifications.get_mut(&id) {
            match mark {
                DeliveryMark::Sent {
                    at,
                    success_count,
                    failure_count,
                } => {
                    record.sent = Some(true);
                    record.sent_at = Some(*at);
                    record.success_count = Some(*success_count as i32);
                    record.failure_count = Some(*failure_count as i32);
                }
                DeliveryMark::Failed { at, error } => {
                    record.sent = Some(false);
                    record.error = Some(error.clone());
                    record.error_at = Some(*at);
                }
            }
        }
        Ok(())
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        self.check(&state, StoreOp::MarkRead)?;
        match state.notifications.get_mut(&id) {
            Some(record) if record.user_id == Some(user_id) => {
                record.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        self.check(&state, StoreOp::DeleteCreatedBefore)?;
        let mut expired: Vec<(DateTime<Utc>, Uuid)> = state
            .notifications
            .values()
            .filter(|n| n.created_at < cutoff)
            .map(|n| (n.created_at, n.id))
            .collect();
        expired.sort();
        expired.truncate(usize::try_from(limit).unwrap_or(0));
        for (_, id) in &expired {
            state.notifications.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

#[derive(Default)]
struct GatewayState {
    outcomes: HashMap<String, DeliveryOutcome>,
    response_override: Option<MulticastResponse>,
    failing: bool,
    sent: Vec<(PushMessage, Vec<String>)>,
    calls: usize,
}

/// Gateway that delivers to every token unless told otherwise.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<GatewayState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `outcome` whenever `token` is sent to.
    pub async fn set_outcome(&self, token: &str, outcome: DeliveryOutcome) {
        self.state
            .lock()
            .await
            .outcomes
            .insert(token.to_string(), outcome);
    }

    /// Return `response` verbatim instead of computing per-token outcomes.
    pub async fn set_response_override(&self, response: MulticastResponse) {
        self.state.lock().await.response_override = Some(response);
    }

    /// Make the send call itself fail.
    pub async fn fail_sends(&self, failing: bool) {
        self.state.lock().await.failing = failing;
    }

    /// Number of `send_multicast` calls, including failed ones.
    pub async fn send_count(&self) -> usize {
        self.state.lock().await.calls
    }

    /// Messages that were accepted, with the tokens they were sent to.
    pub async fn sent(&self) -> Vec<(PushMessage, Vec<String>)> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl PushGateway for MemoryGateway {
    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, AppError> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        if state.failing {
            return Err(AppError::Push("gateway unavailable".to_string()));
        }
        state.sent.push((message.clone(), tokens.to_vec()));

        if let Some(response) = state.response_override.clone() {
            return Ok(response);
        }
        let outcomes = tokens
            .iter()
            .map(|t| {
                state
                    .outcomes
                    .get(t)
                    .cloned()
                    .unwrap_or(DeliveryOutcome::Delivered)
            })
            .collect();
        Ok(MulticastResponse { outcomes })
    }
}

/// Publisher that remembers published notification ids.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<Uuid>>,
    failing: Mutex<bool>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<Uuid> {
        self.published.lock().await.clone()
    }

    pub async fn fail_publishes(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish_created(&self, notification_id: Uuid) -> Result<(), AppError> {
        if *self.failing.lock().await {
            return Err(AppError::Internal("queue unavailable".to_string()));
        }
        self.published.lock().await.push(notification_id);
        Ok(())
    }
}
