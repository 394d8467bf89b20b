//! Multicast dispatcher: turns notification content into a push message and
//! sends it to all of a user's tokens in one gateway call.

use std::collections::BTreeMap;
use std::sync::Arc;

use herald_common::error::AppError;
use herald_common::types::PushContent;

use crate::gateway::{
    AndroidConfig, AndroidNotification, ApnsConfig, ApnsPayload, Aps, DeliveryOutcome,
    PushGateway, PushMessage, PushNotification,
};

/// Android click action understood by the mobile client.
const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";
const NOTIFICATION_COLOR: &str = "#2196F3";
const DEFAULT_SOUND: &str = "default";

/// A token paired with what happened when we pushed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDelivery {
    pub token: String,
    pub outcome: DeliveryOutcome,
}

/// Aggregate result of one multicast send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastReport {
    pub success_count: u32,
    pub failure_count: u32,
    pub deliveries: Vec<TokenDelivery>,
}

impl MulticastReport {
    pub fn has_failures(&self) -> bool {
        self.failure_count > 0
    }
}

/// What the dispatcher did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No tokens to send to; the gateway was not called.
    Skipped,
    Sent(MulticastReport),
}

/// Sends push messages through an injected gateway.
pub struct MulticastDispatcher {
    gateway: Arc<dyn PushGateway>,
}

impl MulticastDispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>) -> Self {
        Self { gateway }
    }

    /// Build the platform payload for `content` with the given badge count.
    ///
    /// Optional data fields are sent as empty strings so the client always sees
    /// the same keys.
    pub fn build_message(content: &PushContent, badge: u32) -> PushMessage {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), content.notification_type.clone());
        data.insert(
            "postId".to_string(),
            content.post_id.clone().unwrap_or_default(),
        );
        data.insert(
            "fromUserId".to_string(),
            content.from_user_id.clone().unwrap_or_default(),
        );
        data.insert(
            "fromUserName".to_string(),
            content.from_user_name.clone().unwrap_or_default(),
        );
        data.insert(
            "actionUrl".to_string(),
            content.action_url.clone().unwrap_or_default(),
        );
        data.insert("priority".to_string(), content.priority.to_string());
        if let Some(id) = content.notification_id {
            data.insert("notificationId".to_string(), id.to_string());
        }

        PushMessage {
            notification: PushNotification {
                title: content.title.clone(),
                body: content.body.clone(),
            },
            data,
            android: AndroidConfig {
                priority: "HIGH".to_string(),
                notification: AndroidNotification {
                    click_action: CLICK_ACTION.to_string(),
                    notification_priority: "PRIORITY_HIGH".to_string(),
                    sound: DEFAULT_SOUND.to_string(),
                    color: NOTIFICATION_COLOR.to_string(),
                },
            },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        sound: DEFAULT_SOUND.to_string(),
                        badge,
                    },
                },
            },
        }
    }

    /// Send `content` to every token in one gateway call.
    ///
    /// Failed sends are reported in the result and never retried.
    pub async fn dispatch(
        &self,
        content: &PushContent,
        badge: u32,
        tokens: &[String],
    ) -> Result<Dispatch, AppError> {
        if tokens.is_empty() {
            return Ok(Dispatch::Skipped);
        }

        let message = Self::build_message(content, badge);
        let response = self.gateway.send_multicast(&message, tokens).await?;

        if response.outcomes.len() != tokens.len() {
            return Err(AppError::Push(format!(
                "Gateway returned {} outcomes for {} tokens",
                response.outcomes.len(),
                tokens.len()
            )));
        }

        let success_count = response.success_count();
        let failure_count = response.failure_count();
        let deliveries = tokens
            .iter()
            .cloned()
            .zip(response.outcomes)
            .map(|(token, outcome)| TokenDelivery { token, outcome })
            .collect();

        tracing::info!(
            title = %content.title,
            success_count,
            failure_count,
            "Multicast push sent"
        );

        Ok(Dispatch::Sent(MulticastReport {
            success_count,
            failure_count,
            deliveries,
        }))
    }
}
