use std::sync::Arc;

use uuid::Uuid;

use crate::best_effort::BestEffort;
use crate::store::NotificationStore;

/// Counts unread notifications for the push badge. Never fails the caller.
pub struct UnreadCounter {
    notifications: Arc<dyn NotificationStore>,
}

impl UnreadCounter {
    pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
        Self { notifications }
    }

    pub async fn count(&self, user_id: Uuid) -> BestEffort<u32> {
        let result = self
            .notifications
            .count_unread(user_id)
            .await
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX));

        BestEffort::capture(result, "count unread notifications")
    }
}
