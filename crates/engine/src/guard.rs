//! Idempotency guard. At-least-once delivery means duplicates.
//!
//! The guard turns every push into one of three answers by claiming the
//! report id in the record store: dispatch it, acknowledge it as already
//! handled, or back off because another invocation is working on it.

use std::sync::Arc;
use std::time::Duration;

use labpush_common::error::AppError;

use crate::store::{ClaimOutcome, RecordStore};

pub struct IdempotencyGuard {
    store: Arc<dyn RecordStore>,
    liveness: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn RecordStore>, liveness: Duration) -> Self {
        Self { store, liveness }
    }

    pub fn liveness(&self) -> Duration {
        self.liveness
    }

    /// Atomically claim `report_id` for this invocation.
    pub async fn claim(&self, report_id: &str) -> Result<ClaimOutcome, AppError> {
        let outcome = self.store.try_claim(report_id, self.liveness).await?;

        match outcome {
            ClaimOutcome::FirstAttempt { attempt } if attempt > 1 => {
                tracing::info!(report_id, attempt, "Re-claimed report for another attempt");
            }
            ClaimOutcome::FirstAttempt { .. } => {
                tracing::debug!(report_id, "Claimed new report");
            }
            ClaimOutcome::AlreadyHandled { status } => {
                tracing::info!(report_id, %status, "Duplicate delivery suppressed");
            }
            ClaimOutcome::InFlight => {
                tracing::info!(
                    report_id,
                    liveness_secs = self.liveness.as_secs(),
                    "Report claimed by a concurrent delivery"
                );
            }
        }

        Ok(outcome)
    }
}
