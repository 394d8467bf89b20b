//! Retention sweep: periodically deletes notifications older than the
//! retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use herald_common::config::AppConfig;

use crate::store::NotificationStore;

/// Shortest period `run` will schedule; `tokio::time::interval` rejects zero.
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
    pub batches: u32,
    /// Set when a batch failed; records deleted before it stay deleted.
    pub error: Option<String>,
}

pub struct RetentionSweeper {
    notifications: Arc<dyn NotificationStore>,
    retention: chrono::Duration,
    batch_size: i64,
}

impl RetentionSweeper {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        retention: chrono::Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            notifications,
            retention,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(notifications: Arc<dyn NotificationStore>, config: &AppConfig) -> Self {
        Self::new(
            notifications,
            chrono::Duration::days(config.retention_days),
            config.retention_batch_size,
        )
    }

    /// Delete every record created strictly before `now - retention`.
    ///
    /// Deletes in batches of at most `batch_size`, each atomic, until a batch
    /// comes back short. Never fails; errors end the sweep early and are logged.
    /// A non-positive retention window deletes nothing.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - self.retention;
        let mut report = SweepReport {
            cutoff,
            deleted: 0,
            batches: 0,
            error: None,
        };

        if self.retention <= chrono::Duration::zero() {
            tracing::error!(cutoff = %cutoff, "Retention window is not positive, refusing to sweep");
            report.error = Some("retention window must be positive".to_string());
            return report;
        }

        loop {
            match self
                .notifications
                .delete_created_before(cutoff, self.batch_size)
                .await
            {
                Ok(deleted) => {
                    report.deleted += deleted;
                    report.batches += 1;
                    if deleted < self.batch_size as u64 {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        cutoff = %cutoff,
                        deleted = report.deleted,
                        error = %e,
                        "Retention sweep failed"
                    );
                    report.error = Some(e.to_string());
                    return report;
                }
            }
        }

        tracing::info!(
            cutoff = %cutoff,
            deleted = report.deleted,
            batches = report.batches,
            "Retention sweep complete"
        );
        report
    }

    /// Sweep every `period`, starting one period from now.
    pub async fn run(self, period: Duration) {
        let period = period.max(MIN_SWEEP_PERIOD);
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        tracing::info!(period_secs = period.as_secs(), "Retention sweeper scheduled");

        loop {
            ticker.tick().await;
            self.sweep(Utc::now()).await;
        }
    }
}
