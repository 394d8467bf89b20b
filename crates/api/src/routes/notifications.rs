//! Notification routes: direct send and the producer endpoints.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DirectSendRequest, NewNotification, NotificationRecord, SendResponse};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(create_notification))
        .route("/api/notifications/direct", post(send_direct))
        .route("/api/notifications/test", post(send_test))
        .route("/api/notifications/{id}/read", post(mark_read))
}

/// POST /api/notifications/direct: Push to `targetUserId` now and report counts.
async fn send_direct(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<DirectSendRequest>,
) -> Result<Json<SendResponse>, AppError> {
    let response = state.service.send_direct(auth.user_id, request).await?;
    Ok(Json(response))
}

/// POST /api/notifications: Store a notification; the worker pushes it.
async fn create_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(new): Json<NewNotification>,
) -> Result<Json<NotificationRecord>, AppError> {
    let record = state.service.create(auth.user_id, new).await?;
    Ok(Json(record))
}

/// POST /api/notifications/test: Queue a test notification to the caller's devices.
async fn send_test(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<SendResponse>, AppError> {
    let response = state.service.send_test(auth.user_id).await?;
    Ok(Json(response))
}

/// POST /api/notifications/{id}/read: Mark one of the caller's notifications read.
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.service.mark_read(auth.user_id, id).await?;
    Ok(Json(serde_json::json!({"read": true})))
}
