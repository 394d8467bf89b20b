use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type assigned when a producer does not set one.
pub const DEFAULT_NOTIFICATION_TYPE: &str = "system_message";

/// Notification type assigned to direct sends that do not set one.
pub const DIRECT_NOTIFICATION_TYPE: &str = "direct_message";

/// Delivery priority carried in the push data map.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A stored notification addressed to a single user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    /// Owning user. Records without one are never dispatched.
    pub user_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: String,
    pub post_id: Option<String>,
    pub from_user_id: Option<String>,
    pub from_user_name: Option<String>,
    pub action_url: Option<String>,
    pub priority: Priority,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub sent: Option<bool>,
    pub sent_at: Option<DateTime<Utc>>,
    pub success_count: Option<i32>,
    pub failure_count: Option<i32>,
    pub error: Option<String>,
    pub error_at: Option<DateTime<Utc>>,
}

/// Fields a producer supplies when creating a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub notification_type: Option<String>,
    pub post_id: Option<String>,
    pub from_user_id: Option<String>,
    pub from_user_name: Option<String>,
    pub action_url: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// Delivery result recorded back onto a notification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMark {
    Sent {
        at: DateTime<Utc>,
        success_count: u32,
        failure_count: u32,
    },
    Failed {
        at: DateTime<Utc>,
        error: String,
    },
}

/// Human-readable and machine-readable content of one push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushContent {
    pub title: String,
    pub body: String,
    pub notification_type: String,
    pub post_id: Option<String>,
    pub from_user_id: Option<String>,
    pub from_user_name: Option<String>,
    pub action_url: Option<String>,
    pub priority: Priority,
    /// Set when the push originates from a stored record.
    pub notification_id: Option<Uuid>,
}

impl PushContent {
    /// Content for dispatching a stored record.
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            title: record.title.clone(),
            body: record.message.clone(),
            notification_type: record.notification_type.clone(),
            post_id: record.post_id.clone(),
            from_user_id: record.from_user_id.clone(),
            from_user_name: record.from_user_name.clone(),
            action_url: record.action_url.clone(),
            priority: record.priority,
            notification_id: Some(record.id),
        }
    }
}

/// Body of a direct-send request.
///
/// Required fields are optional here so that missing values surface as
/// validation errors rather than deserialization failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectSendRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub post_id: Option<String>,
    pub from_user_id: Option<String>,
    pub from_user_name: Option<String>,
    pub action_url: Option<String>,
    pub priority: Option<Priority>,
    pub target_user_id: Option<String>,
}

/// Response returned to request/response callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_request_uses_camel_case() {
        let req: DirectSendRequest = serde_json::from_value(serde_json::json!({
            "title": "Hi",
            "body": "There",
            "type": "comment",
            "targetUserId": "abc",
            "priority": "high"
        }))
        .unwrap();
        assert_eq!(req.target_user_id.as_deref(), Some("abc"));
        assert_eq!(req.notification_type.as_deref(), Some("comment"));
        assert_eq!(req.priority, Some(Priority::High));
        assert!(req.post_id.is_none());
    }

    #[test]
    fn test_send_response_omits_empty_fields() {
        let resp = SendResponse {
            success: true,
            success_count: None,
            failure_count: None,
            message: Some("queued".into()),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "message": "queued"}));
    }

    #[test]
    fn test_new_notification_defaults() {
        let new: NewNotification = serde_json::from_value(serde_json::json!({
            "title": "t",
            "message": "m"
        }))
        .unwrap();
        assert_eq!(new.priority, Priority::Medium);
        assert!(new.notification_type.is_none());
        assert!(new.user_id.is_none());
    }
}
