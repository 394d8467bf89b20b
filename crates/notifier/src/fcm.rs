//! Firebase Cloud Messaging HTTP v1 client.
//!
//! FCM v1 accepts one token per request, so a multicast is a bounded set of
//! concurrent sends whose per-token results are mapped onto the `messaging/*`
//! error codes. Access tokens come from a Google service account and are
//! refreshed by `gcp_auth` before they expire.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::{Deserialize, Serialize};

use herald_common::config::AppConfig;
use herald_common::error::AppError;

use crate::gateway::{
    DeliveryOutcome, INVALID_REGISTRATION_TOKEN, MulticastResponse, PushGateway, PushMessage,
    TOKEN_NOT_REGISTERED,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests in flight per multicast.
const MAX_CONCURRENT_SENDS: usize = 16;

/// OAuth scope required by the FCM send endpoint.
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Reported when the request never produced an HTTP response.
const NETWORK_ERROR: &str = "app/network-error";

/// Supplies the bearer token for each multicast.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AppError>;
}

/// Tokens minted from a service account key, cached and refreshed by `gcp_auth`.
pub struct ServiceAccountTokens {
    provider: Arc<dyn TokenProvider>,
}

impl ServiceAccountTokens {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, AppError> {
        let token = self
            .provider
            .token(&[FCM_SCOPE])
            .await
            .map_err(|e| AppError::Push(format!("Failed to obtain FCM access token: {}", e)))?;
        Ok(token.as_str().to_string())
    }
}

/// A pre-minted token, e.g. for a local FCM emulator.
pub struct StaticAccessToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> Result<String, AppError> {
        Ok(self.0.clone())
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: TargetedMessage<'a>,
}

#[derive(Serialize)]
struct TargetedMessage<'a> {
    token: &'a str,
    #[serde(flatten)]
    message: &'a PushMessage,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// Push gateway backed by the FCM HTTP v1 API.
pub struct FcmClient {
    http: reqwest::Client,
    send_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl FcmClient {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                endpoint.trim_end_matches('/'),
                project_id
            ),
            tokens,
        })
    }

    pub fn with_static_token(
        endpoint: &str,
        project_id: &str,
        access_token: &str,
    ) -> Result<Self, AppError> {
        Self::new(
            endpoint,
            project_id,
            Arc::new(StaticAccessToken(access_token.to_string())),
        )
    }

    /// Build a client from the service account key named by the configuration.
    ///
    /// The project id defaults to the one recorded in the key.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let key_path = config.fcm_service_account_path.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "FCM_SERVICE_ACCOUNT_PATH or GOOGLE_APPLICATION_CREDENTIALS environment variable is required"
            )
        })?;
        let account = CustomServiceAccount::from_file(key_path)?;

        let project_id = match &config.fcm_project_id {
            Some(project_id) => project_id.clone(),
            None => TokenProvider::project_id(&account).await?.to_string(),
        };

        tracing::info!(project_id = %project_id, "FCM client configured from service account");
        let tokens = Arc::new(ServiceAccountTokens::new(Arc::new(account)));
        Ok(Self::new(&config.fcm_endpoint, &project_id, tokens)?)
    }

    async fn send_one(
        &self,
        message: &PushMessage,
        token: &str,
        access_token: &str,
    ) -> DeliveryOutcome {
        let request = SendRequest {
            message: TargetedMessage { token, message },
        };

        let response = match self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(token_prefix = token_prefix(token), error = %e, "FCM request failed");
                return DeliveryOutcome::failed(NETWORK_ERROR);
            }
        };

        let status = response.status();
        if status.is_success() {
            return DeliveryOutcome::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        let code = error_code_for(status.as_u16(), &body);
        tracing::debug!(
            token_prefix = token_prefix(token),
            http_status = status.as_u16(),
            code = %code,
            "FCM rejected token"
        );
        DeliveryOutcome::failed(code)
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, AppError> {
        if tokens.is_empty() {
            return Err(AppError::Push(
                "Multicast requires at least one token".to_string(),
            ));
        }

        let access_token = self.tokens.access_token().await?;

        // `buffered` yields in input order, keeping outcomes aligned with tokens.
        let sends: Vec<_> = tokens
            .iter()
            .map(|token| self.send_one(message, token, &access_token))
            .collect();
        let outcomes = stream::iter(sends)
            .buffered(MAX_CONCURRENT_SENDS)
            .collect::<Vec<_>>()
            .await;

        Ok(MulticastResponse { outcomes })
    }
}

/// Map an FCM v1 error response onto a `messaging/*` code.
pub fn error_code_for(http_status: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();

    // Without an FCM error body a 404 says nothing about the token: it is as
    // likely a wrong project id or endpoint path.
    let Some(ErrorEnvelope { error }) = parsed else {
        return match http_status {
            429 => "messaging/message-rate-exceeded".to_string(),
            500 => "messaging/internal-error".to_string(),
            503 => "messaging/server-unavailable".to_string(),
            _ => "messaging/unknown-error".to_string(),
        };
    };

    // The FCM-specific code in `details` is more precise than the canonical status.
    let detail = error.details.iter().find_map(|d| d.error_code.as_deref());

    // Only FCM's own detail marks a token unregistered; a bare NOT_FOUND does not.
    if detail == Some("UNREGISTERED") {
        return TOKEN_NOT_REGISTERED.to_string();
    }

    let code = match detail.unwrap_or(error.status.as_str()) {
        "INVALID_ARGUMENT" if error.message.contains("registration token") => {
            INVALID_REGISTRATION_TOKEN
        }
        "INVALID_ARGUMENT" => "messaging/invalid-argument",
        "SENDER_ID_MISMATCH" => "messaging/mismatched-credential",
        "QUOTA_EXCEEDED" | "RESOURCE_EXHAUSTED" => "messaging/message-rate-exceeded",
        "UNAVAILABLE" => "messaging/server-unavailable",
        "INTERNAL" => "messaging/internal-error",
        "THIRD_PARTY_AUTH_ERROR" => "messaging/third-party-auth-error",
        "UNAUTHENTICATED" | "PERMISSION_DENIED" => "messaging/authentication-error",
        _ => "messaging/unknown-error",
    };
    code.to_string()
}

/// First few characters of a token, safe to log.
fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
