//! Notification triggers: on-create dispatch, direct send, and the producer
//! operations that create records.
//!
//! All three dispatch paths share `deliver_to_user`:
//! 1. Resolve the user's tokens
//! 2. Count unread notifications for the badge (best-effort)
//! 3. Multicast the push
//! 4. Prune permanently invalid tokens if anything failed (best-effort)

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    DEFAULT_NOTIFICATION_TYPE, DIRECT_NOTIFICATION_TYPE, DeliveryMark, DirectSendRequest,
    NewNotification, NotificationRecord, Priority, PushContent, SendResponse,
};

use crate::best_effort::BestEffort;
use crate::dispatcher::{Dispatch, MulticastDispatcher, MulticastReport};
use crate::gateway::PushGateway;
use crate::queue::EventPublisher;
use crate::reconciler::TokenReconciler;
use crate::store::{NotificationStore, TokenStore};
use crate::unread::UnreadCounter;

const GENERIC_ERROR: &str = "Internal server error";
const TEST_TITLE: &str = "Test notification";
const TEST_MESSAGE: &str = "Push notifications are working!";
const TEST_SENDER: &str = "Herald";

/// What happened to a newly created notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedOutcome {
    /// The record was gone by the time the event was handled.
    RecordMissing,
    /// The record has no owner, or the owner's user record does not exist.
    SkippedNoUser,
    /// The owner has no registered push tokens.
    SkippedNoTokens,
    Dispatched {
        success_count: u32,
        failure_count: u32,
        removed_tokens: usize,
        recorded: bool,
    },
    Failed {
        error: String,
        recorded: bool,
    },
}

/// Result of pushing to one user.
enum UserDelivery {
    UserMissing,
    NoTokens,
    Sent {
        report: MulticastReport,
        removed: BestEffort<Vec<String>>,
    },
}

/// Entry point for every notification operation.
pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    tokens: Arc<dyn TokenStore>,
    publisher: Arc<dyn EventPublisher>,
    dispatcher: MulticastDispatcher,
    reconciler: TokenReconciler,
    unread: UnreadCounter,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        tokens: Arc<dyn TokenStore>,
        gateway: Arc<dyn PushGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            dispatcher: MulticastDispatcher::new(gateway),
            reconciler: TokenReconciler::new(Arc::clone(&tokens)),
            unread: UnreadCounter::new(Arc::clone(&notifications)),
            notifications,
            tokens,
            publisher,
        }
    }

    /// React to a newly created notification record. Never fails: errors are
    /// logged and, when the record is known, written onto it.
    pub async fn handle_created(&self, notification_id: Uuid) -> CreatedOutcome {
        let record = match self.notifications.find(notification_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(notification_id = %notification_id, "Created notification not found");
                return CreatedOutcome::RecordMissing;
            }
            Err(e) => {
                tracing::error!(
                    notification_id = %notification_id,
                    error = %e,
                    "Failed to load created notification"
                );
                return CreatedOutcome::Failed {
                    error: e.to_string(),
                    recorded: false,
                };
            }
        };

        match self.deliver_record(&record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    notification_id = %record.id,
                    error = %e,
                    "Failed to dispatch notification"
                );
                let mark = DeliveryMark::Failed {
                    at: Utc::now(),
                    error: e.to_string(),
                };
                let recorded = BestEffort::capture(
                    self.notifications.mark_delivery(record.id, &mark).await,
                    "record delivery failure",
                )
                .is_ok();
                CreatedOutcome::Failed {
                    error: e.to_string(),
                    recorded,
                }
            }
        }
    }

    async fn deliver_record(&self, record: &NotificationRecord) -> Result<CreatedOutcome, AppError> {
        let Some(user_id) = record.user_id else {
            tracing::info!(notification_id = %record.id, "Notification has no user, skipping");
            return Ok(CreatedOutcome::SkippedNoUser);
        };

        let content = PushContent::from_record(record);
        let (report, removed) = match self.deliver_to_user(user_id, &content).await? {
            UserDelivery::UserMissing => return Ok(CreatedOutcome::SkippedNoUser),
            UserDelivery::NoTokens => return Ok(CreatedOutcome::SkippedNoTokens),
            UserDelivery::Sent { report, removed } => (report, removed),
        };

        let mark = DeliveryMark::Sent {
            at: Utc::now(),
            success_count: report.success_count,
            failure_count: report.failure_count,
        };
        let recorded = BestEffort::capture(
            self.notifications.mark_delivery(record.id, &mark).await,
            "record delivery outcome",
        )
        .is_ok();

        Ok(CreatedOutcome::Dispatched {
            success_count: report.success_count,
            failure_count: report.failure_count,
            removed_tokens: removed.ok().map_or(0, |tokens| tokens.len()),
            recorded,
        })
    }

    async fn deliver_to_user(
        &self,
        user_id: Uuid,
        content: &PushContent,
    ) -> Result<UserDelivery, AppError> {
        let Some(tokens) = self.tokens.tokens_for_user(user_id).await? else {
            tracing::info!(user_id = %user_id, "User not found, skipping push");
            return Ok(UserDelivery::UserMissing);
        };

        if tokens.is_empty() {
            tracing::info!(user_id = %user_id, "User has no push tokens, skipping push");
            return Ok(UserDelivery::NoTokens);
        }

        let badge = self.unread.count(user_id).await.unwrap_or(0);

        tracing::debug!(user_id = %user_id, devices = tokens.len(), badge, "Sending push");
        let report = match self.dispatcher.dispatch(content, badge, &tokens).await? {
            Dispatch::Skipped => return Ok(UserDelivery::NoTokens),
            Dispatch::Sent(report) => report,
        };

        let removed = if report.has_failures() {
            self.reconciler.reconcile(user_id, &report.deliveries).await
        } else {
            BestEffort::Ok(Vec::new())
        };

        Ok(UserDelivery::Sent { report, removed })
    }

    /// Push a notification to `targetUserId` immediately on behalf of `caller`.
    ///
    /// Validation happens before any store access. A target without tokens is a
    /// success with zero counts; a target that does not exist is `NotFound`.
    pub async fn send_direct(
        &self,
        caller: Uuid,
        request: DirectSendRequest,
    ) -> Result<SendResponse, AppError> {
        let target = required(request.target_user_id.as_deref())
            .ok_or_else(|| AppError::Validation("targetUserId is required".to_string()))?;
        let (Some(title), Some(body)) = (
            required(request.title.as_deref()),
            required(request.body.as_deref()),
        ) else {
            return Err(AppError::Validation(
                "title and body are required".to_string(),
            ));
        };
        let target = Uuid::parse_str(target).map_err(|_| {
            AppError::Validation("targetUserId must be a valid user id".to_string())
        })?;

        let content = PushContent {
            title: title.to_string(),
            body: body.to_string(),
            notification_type: request
                .notification_type
                .unwrap_or_else(|| DIRECT_NOTIFICATION_TYPE.to_string()),
            post_id: request.post_id,
            from_user_id: Some(request.from_user_id.unwrap_or_else(|| caller.to_string())),
            from_user_name: request.from_user_name,
            action_url: request.action_url,
            priority: request.priority.unwrap_or_default(),
            notification_id: None,
        };

        let delivery = self
            .deliver_to_user(target, &content)
            .await
            .map_err(|e| conceal(e, "direct send"))?;

        match delivery {
            UserDelivery::UserMissing => Err(AppError::NotFound(format!(
                "Target user {} not found",
                target
            ))),
            UserDelivery::NoTokens => Ok(SendResponse {
                success: true,
                success_count: Some(0),
                failure_count: Some(0),
                message: Some("Target user has no registered push tokens".to_string()),
            }),
            UserDelivery::Sent { report, .. } => {
                tracing::info!(
                    caller = %caller,
                    target = %target,
                    success_count = report.success_count,
                    failure_count = report.failure_count,
                    "Direct notification sent"
                );
                Ok(SendResponse {
                    success: true,
                    success_count: Some(report.success_count),
                    failure_count: Some(report.failure_count),
                    message: None,
                })
            }
        }
    }

    /// Store a notification for a user and announce it to the on-create trigger.
    pub async fn create(
        &self,
        caller: Uuid,
        mut new: NewNotification,
    ) -> Result<NotificationRecord, AppError> {
        if new.user_id.is_none() {
            return Err(AppError::Validation("userId is required".to_string()));
        }
        if required(Some(new.title.as_str())).is_none()
            || required(Some(new.message.as_str())).is_none()
        {
            return Err(AppError::Validation(
                "title and message are required".to_string(),
            ));
        }
        if new.from_user_id.is_none() {
            new.from_user_id = Some(caller.to_string());
        }
        if new.notification_type.is_none() {
            new.notification_type = Some(DEFAULT_NOTIFICATION_TYPE.to_string());
        }

        self.store_and_publish(&new)
            .await
            .map_err(|e| conceal(e, "create notification"))
    }

    /// Create the canned test notification for the caller.
    pub async fn send_test(&self, caller: Uuid) -> Result<SendResponse, AppError> {
        let new = NewNotification {
            user_id: Some(caller),
            title: TEST_TITLE.to_string(),
            message: TEST_MESSAGE.to_string(),
            notification_type: Some(DEFAULT_NOTIFICATION_TYPE.to_string()),
            from_user_name: Some(TEST_SENDER.to_string()),
            priority: Priority::Medium,
            ..Default::default()
        };

        self.store_and_publish(&new)
            .await
            .map_err(|e| conceal(e, "test notification"))?;

        Ok(SendResponse {
            success: true,
            success_count: None,
            failure_count: None,
            message: Some("Test notification queued".to_string()),
        })
    }

    /// Mark one of the caller's notifications as read.
    pub async fn mark_read(&self, caller: Uuid, notification_id: Uuid) -> Result<(), AppError> {
        let updated = self
            .notifications
            .mark_read(notification_id, caller)
            .await
            .map_err(|e| conceal(e, "mark read"))?;

        if updated {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )))
        }
    }

    async fn store_and_publish(&self, new: &NewNotification) -> Result<NotificationRecord, AppError> {
        let record = self.notifications.insert(new).await?;
        self.publisher.publish_created(record.id).await?;

        tracing::info!(
            notification_id = %record.id,
            user_id = ?record.user_id,
            notification_type = %record.notification_type,
            "Notification created"
        );
        Ok(record)
    }
}

/// `Some(trimmed)` for a present, non-blank string.
fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Log an internal error and replace it with a generic one for the caller.
fn conceal(error: AppError, operation: &'static str) -> AppError {
    if error.is_caller_facing() {
        return error;
    }
    tracing::error!(operation, error = %error, "Request failed");
    AppError::Internal(GENERIC_ERROR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{DeliveryOutcome, INVALID_REGISTRATION_TOKEN, TOKEN_NOT_REGISTERED};
    use crate::memory::{MemoryGateway, MemoryPublisher, MemoryStore, StoreOp};

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<MemoryGateway>,
        publisher: Arc<MemoryPublisher>,
        service: NotificationService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let publisher = Arc::new(MemoryPublisher::new());
        let service = NotificationService::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            publisher.clone(),
        );
        Harness {
            store,
            gateway,
            publisher,
            service,
        }
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn direct(target: Option<String>) -> DirectSendRequest {
        DirectSendRequest {
            title: Some("Hello".to_string()),
            body: Some("World".to_string()),
            target_user_id: target,
            ..Default::default()
        }
    }

    // ---- on-create ----

    #[tokio::test]
    async fn test_created_dispatches_and_records_outcome() {
        let h = harness();
        let user = h.store.add_user(strings(&["A", "B", "C"])).await;
        h.gateway
            .set_outcome("B", DeliveryOutcome::failed(INVALID_REGISTRATION_TOKEN))
            .await;
        h.gateway
            .set_outcome("C", DeliveryOutcome::failed("messaging/internal-error"))
            .await;
        let id = h.store.seed_notification(Some(user), false).await;

        let outcome = h.service.handle_created(id).await;

        assert_eq!(
            outcome,
            CreatedOutcome::Dispatched {
                success_count: 1,
                failure_count: 2,
                removed_tokens: 1,
                recorded: true,
            }
        );
        assert_eq!(h.store.tokens_of(user).await, Some(strings(&["A", "C"])));

        let record = h.store.notification(id).await.unwrap();
        assert_eq!(record.sent, Some(true));
        assert_eq!(record.success_count, Some(1));
        assert_eq!(record.failure_count, Some(2));
        assert!(record.sent_at.is_some());

        let sent = h.gateway.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.data["notificationId"], id.to_string());
        // The record itself is unread.
        assert_eq!(sent[0].0.apns.payload.aps.badge, 1);
    }

    #[tokio::test]
    async fn test_created_without_user_is_skipped() {
        let h = harness();
        let id = h.store.seed_notification(None, false).await;

        assert_eq!(h.service.handle_created(id).await, CreatedOutcome::SkippedNoUser);
        assert_eq!(h.gateway.send_count().await, 0);
    }

    #[tokio::test]
    async fn test_created_for_missing_user_is_skipped() {
        let h = harness();
        let id = h.store.seed_notification(Some(Uuid::new_v4()), false).await;

        assert_eq!(h.service.handle_created(id).await, CreatedOutcome::SkippedNoUser);
        assert_eq!(h.gateway.send_count().await, 0);
    }

    #[tokio::test]
    async fn test_created_without_tokens_is_skipped() {
        let h = harness();
        let user = h.store.add_user(vec![]).await;
        let id = h.store.seed_notification(Some(user), false).await;

        assert_eq!(h.service.handle_created(id).await, CreatedOutcome::SkippedNoTokens);
        assert_eq!(h.gateway.send_count().await, 0);
        assert_eq!(h.store.notification(id).await.unwrap().sent, None);
    }

    #[tokio::test]
    async fn test_created_missing_record() {
        let h = harness();
        assert_eq!(
            h.service.handle_created(Uuid::new_v4()).await,
            CreatedOutcome::RecordMissing
        );
    }

    #[tokio::test]
    async fn test_created_gateway_failure_marks_record() {
        let h = harness();
        let user = h.store.add_user(strings(&["A"])).await;
        h.gateway.fail_sends(true).await;
        let id = h.store.seed_notification(Some(user), false).await;

        let outcome = h.service.handle_created(id).await;

        assert!(matches!(outcome, CreatedOutcome::Failed { recorded: true, .. }));
        let record = h.store.notification(id).await.unwrap();
        assert_eq!(record.sent, Some(false));
        assert!(record.error.unwrap().contains("gateway unavailable"));
        assert!(record.error_at.is_some());
        assert_eq!(h.store.tokens_of(user).await, Some(strings(&["A"])));
    }

    #[tokio::test]
    async fn test_created_best_effort_failures_do_not_block_delivery() {
        let h = harness();
        let user = h.store.add_user(strings(&["A", "B"])).await;
        h.gateway
            .set_outcome("B", DeliveryOutcome::failed(TOKEN_NOT_REGISTERED))
            .await;
        let id = h.store.seed_notification(Some(user), false).await;
        h.store.fail(StoreOp::CountUnread).await;
        h.store.fail(StoreOp::RemoveTokens).await;
        h.store.fail(StoreOp::MarkDelivery).await;

        let outcome = h.service.handle_created(id).await;

        assert_eq!(
            outcome,
            CreatedOutcome::Dispatched {
                success_count: 1,
                failure_count: 1,
                removed_tokens: 0,
                recorded: false,
            }
        );
        assert_eq!(h.gateway.sent().await[0].0.apns.payload.aps.badge, 0);
    }

    #[tokio::test]
    async fn test_created_all_success_skips_reconcile() {
        let h = harness();
        let user = h.store.add_user(strings(&["A", "B"])).await;
        let id = h.store.seed_notification(Some(user), false).await;

        h.service.handle_created(id).await;

        assert_eq!(h.store.removal_calls().await, 0);
    }

    // ---- direct send ----

    #[tokio::test]
    async fn test_direct_requires_target_before_store_access() {
        let h = harness();

        let err = h
            .service
            .send_direct(Uuid::new_v4(), direct(None))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m.contains("targetUserId")));
        assert_eq!(h.store.operations(), 0);
    }

    #[tokio::test]
    async fn test_direct_requires_title_and_body() {
        let h = harness();
        let mut request = direct(Some(Uuid::new_v4().to_string()));
        request.body = Some("   ".to_string());

        let err = h
            .service
            .send_direct(Uuid::new_v4(), request)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m.contains("title and body")));
        assert_eq!(h.store.operations(), 0);
    }

    #[tokio::test]
    async fn test_direct_rejects_malformed_target() {
        let h = harness();
        let err = h
            .service
            .send_direct(Uuid::new_v4(), direct(Some("not-a-user".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_direct_unknown_target_is_not_found() {
        let h = harness();
        let err = h
            .service
            .send_direct(Uuid::new_v4(), direct(Some(Uuid::new_v4().to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_direct_without_tokens_succeeds_with_zero_counts() {
        let h = harness();
        let user = h.store.add_user(vec![]).await;

        let response = h
            .service
            .send_direct(Uuid::new_v4(), direct(Some(user.to_string())))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.success_count, Some(0));
        assert_eq!(response.failure_count, Some(0));
        assert!(response.message.is_some());
        assert_eq!(h.gateway.send_count().await, 0);
    }

    #[tokio::test]
    async fn test_direct_sends_and_reconciles() {
        let h = harness();
        let caller = Uuid::new_v4();
        let user = h.store.add_user(strings(&["A", "B"])).await;
        h.gateway
            .set_outcome("A", DeliveryOutcome::failed(TOKEN_NOT_REGISTERED))
            .await;

        let response = h
            .service
            .send_direct(caller, direct(Some(user.to_string())))
            .await
            .unwrap();

        assert_eq!(response.success_count, Some(1));
        assert_eq!(response.failure_count, Some(1));
        assert_eq!(h.store.tokens_of(user).await, Some(strings(&["B"])));

        let (message, tokens) = h.gateway.sent().await.remove(0);
        assert_eq!(tokens, strings(&["A", "B"]));
        assert_eq!(message.data["type"], DIRECT_NOTIFICATION_TYPE);
        assert_eq!(message.data["fromUserId"], caller.to_string());
    }

    #[tokio::test]
    async fn test_direct_conceals_internal_errors() {
        let h = harness();
        let user = h.store.add_user(strings(&["A"])).await;
        h.gateway.fail_sends(true).await;

        let err = h
            .service
            .send_direct(Uuid::new_v4(), direct(Some(user.to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Internal(ref m) if m == GENERIC_ERROR));
    }

    // ---- producers ----

    #[tokio::test]
    async fn test_create_stores_and_publishes() {
        let h = harness();
        let caller = Uuid::new_v4();
        let user = h.store.add_user(vec![]).await;
        let new = NewNotification {
            user_id: Some(user),
            title: "Liked".to_string(),
            message: "Someone liked your post".to_string(),
            ..Default::default()
        };

        let record = h.service.create(caller, new).await.unwrap();

        assert_eq!(record.notification_type, DEFAULT_NOTIFICATION_TYPE);
        assert_eq!(record.from_user_id, Some(caller.to_string()));
        assert!(!record.is_read);
        assert_eq!(h.publisher.published().await, vec![record.id]);
    }

    #[tokio::test]
    async fn test_create_requires_user() {
        let h = harness();
        let new = NewNotification {
            title: "t".to_string(),
            message: "m".to_string(),
            ..Default::default()
        };
        let err = h.service.create(Uuid::new_v4(), new).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_test_creates_record_for_caller() {
        let h = harness();
        let caller = Uuid::new_v4();

        let response = h.service.send_test(caller).await.unwrap();

        assert!(response.success);
        let published = h.publisher.published().await;
        assert_eq!(published.len(), 1);
        let record = h.store.notification(published[0]).await.unwrap();
        assert_eq!(record.user_id, Some(caller));
        assert_eq!(record.from_user_name.as_deref(), Some(TEST_SENDER));
    }

    #[tokio::test]
    async fn test_send_test_publish_failure_is_generic() {
        let h = harness();
        h.publisher.fail_publishes(true).await;
        let err = h.service.send_test(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(ref m) if m == GENERIC_ERROR));
    }

    #[tokio::test]
    async fn test_mark_read_only_for_owner() {
        let h = harness();
        let owner = h.store.add_user(vec![]).await;
        let id = h.store.seed_notification(Some(owner), false).await;

        let err = h.service.mark_read(Uuid::new_v4(), id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        h.service.mark_read(owner, id).await.unwrap();
        assert!(h.store.notification(id).await.unwrap().is_read);
    }
}
