//! HTTP surface for Herald.
//!
//! Endpoints:
//! - POST /api/notifications/direct: push to a user immediately
//! - POST /api/notifications: create a notification (pushed by the worker)
//! - POST /api/notifications/test: create a test notification for the caller
//! - POST /api/notifications/{id}/read: mark one of the caller's notifications read
//! - GET  /health

pub mod middleware;
pub mod routes;
pub mod state;
