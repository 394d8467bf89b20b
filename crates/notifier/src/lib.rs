//! Push notification delivery for Herald.
//!
//! The pipeline for a single notification:
//! 1. Resolve the target user's push tokens (`TokenStore`)
//! 2. Count unread notifications for the badge (`UnreadCounter`)
//! 3. Send one multicast push (`MulticastDispatcher` → `PushGateway`)
//! 4. Prune tokens the gateway reported as permanently invalid (`TokenReconciler`)
//!
//! Storage, gateway, and event queue are injected as trait objects so the
//! whole pipeline runs against the in-memory doubles in `memory` (enabled for
//! tests and by the `test-util` feature).

pub mod best_effort;
pub mod dispatcher;
pub mod fcm;
pub mod gateway;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod reconciler;
pub mod retention;
pub mod service;
pub mod store;
pub mod unread;
