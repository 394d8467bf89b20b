//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_notifier::service::NotificationService;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotificationService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(service: Arc<NotificationService>, config: AppConfig) -> Self {
        Self { service, config }
    }
}
