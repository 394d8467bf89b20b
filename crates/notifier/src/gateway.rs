//! Push gateway seam: the message shape, per-token outcomes, and the trait
//! implemented by the FCM client and the in-memory double.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use herald_common::error::AppError;

/// The gateway no longer recognises the token (app uninstalled, token rotated).
pub const TOKEN_NOT_REGISTERED: &str = "messaging/registration-token-not-registered";

/// The token is malformed or was never valid.
pub const INVALID_REGISTRATION_TOKEN: &str = "messaging/invalid-registration-token";

const CODE_PREFIX: &str = "messaging/";

/// Whether an error code means the token can never be delivered to again.
///
/// Codes are accepted with or without the `messaging/` prefix.
pub fn is_permanent_failure(code: &str) -> bool {
    let bare = code.strip_prefix(CODE_PREFIX).unwrap_or(code);
    [TOKEN_NOT_REGISTERED, INVALID_REGISTRATION_TOKEN]
        .iter()
        .any(|known| known.strip_prefix(CODE_PREFIX) == Some(bare))
}

/// Result of delivering to a single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { code: String },
}

impl DeliveryOutcome {
    pub fn failed(code: impl Into<String>) -> Self {
        DeliveryOutcome::Failed { code: code.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Delivered => None,
            DeliveryOutcome::Failed { code } => Some(code),
        }
    }

    /// True only for failures whose code marks the token as permanently unusable.
    pub fn is_permanently_invalid(&self) -> bool {
        self.error_code().is_some_and(is_permanent_failure)
    }
}

/// Title and body shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidNotification {
    pub click_action: String,
    pub notification_priority: String,
    pub sound: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aps {
    pub sound: String,
    pub badge: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

/// A push message, minus the target token. Field names follow the FCM HTTP v1
/// `Message` resource so the client can serialize it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub notification: PushNotification,
    pub data: BTreeMap<String, String>,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

/// Per-token outcomes of one multicast call, in the same order as the tokens sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MulticastResponse {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl MulticastResponse {
    pub fn success_count(&self) -> u32 {
        self.outcomes.iter().filter(|o| o.is_success()).count() as u32
    }

    pub fn failure_count(&self) -> u32 {
        self.outcomes.len() as u32 - self.success_count()
    }
}

/// A push gateway capable of sending one message to many tokens in a single call.
///
/// Per-token failures are reported in the response, not as an `Err`; `Err` is
/// reserved for the call itself failing.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_codes() {
        assert!(is_permanent_failure(TOKEN_NOT_REGISTERED));
        assert!(is_permanent_failure(INVALID_REGISTRATION_TOKEN));
        assert!(is_permanent_failure("invalid-registration-token"));
        assert!(is_permanent_failure("registration-token-not-registered"));
    }

    #[test]
    fn test_transient_codes_are_not_permanent() {
        assert!(!is_permanent_failure("messaging/internal-error"));
        assert!(!is_permanent_failure("messaging/server-unavailable"));
        assert!(!is_permanent_failure("messaging/invalid-argument"));
        assert!(!is_permanent_failure(""));
    }

    #[test]
    fn test_outcome_classification() {
        assert!(!DeliveryOutcome::Delivered.is_permanently_invalid());
        assert!(DeliveryOutcome::failed(TOKEN_NOT_REGISTERED).is_permanently_invalid());
        assert!(!DeliveryOutcome::failed("messaging/internal-error").is_permanently_invalid());
        assert_eq!(
            DeliveryOutcome::failed("x").error_code(),
            Some("x")
        );
    }

    #[test]
    fn test_multicast_counts() {
        let response = MulticastResponse {
            outcomes: vec![
                DeliveryOutcome::Delivered,
                DeliveryOutcome::failed(TOKEN_NOT_REGISTERED),
                DeliveryOutcome::Delivered,
            ],
        };
        assert_eq!(response.success_count(), 2);
        assert_eq!(response.failure_count(), 1);
    }
}
