//! Retention sweeper: deletes processing records past the dedup window.
//!
//! Records only need to outlive the bus's redelivery horizon. The Redis store
//! expires keys on its own, so sweeping it is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use labpush_common::error::AppError;

use crate::store::RecordStore;

pub struct RetentionSweeper {
    store: Arc<dyn RecordStore>,
    retention: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn RecordStore>,
        retention: Duration,
        interval: Duration,
    ) -> Result<Self, AppError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| AppError::Config(format!("Invalid retention window: {}", e)))?;
        Ok(Self {
            store,
            retention,
            interval,
        })
    }

    /// Delete every record last updated before `now - retention`.
    pub async fn sweep_once(&self) -> Result<u64, AppError> {
        let cutoff = Utc::now() - self.retention;
        let purged = self.store.purge_before(cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, cutoff = %cutoff, "Purged expired processing records");
        }
        Ok(purged)
    }

    /// Sweep on every interval tick. Runs until the task is cancelled.
    pub async fn run(&self) {
        tracing::info!(
            retention_hours = self.retention.num_hours(),
            interval_secs = self.interval.as_secs(),
            "Retention sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                // Store outages are transient; try again next tick.
                tracing::warn!(error = %e, "Retention sweep failed");
            }
        }
    }
}
