//! Processing record stores.
//!
//! The [`RecordStore`] trait is the persistence seam for dedup state:
//!
//! - **Production**: [`PgRecordStore`] (conditional upsert) or
//!   [`RedisRecordStore`] (Lua script)
//! - **Testing / single replica**: [`MemoryRecordStore`]
//!
//! Every implementation must make `try_claim` a single atomic step. Two
//! concurrent claims for the same unclaimed id yield exactly one
//! [`ClaimOutcome::FirstAttempt`].

pub mod memory;
pub mod postgres;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use labpush_common::error::AppError;
use labpush_common::types::{ProcessingRecord, ProcessingStatus};

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;
pub use redis_store::RedisRecordStore;

/// Result of an atomic claim on a report id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the report and must dispatch it.
    ///
    /// `attempt` is the record's attempt counter after this claim (1 for a
    /// report never seen before).
    FirstAttempt { attempt: i32 },
    /// A terminal record exists; acknowledge without dispatching.
    AlreadyHandled { status: ProcessingStatus },
    /// Another invocation holds a live claim; ask the bus to retry later.
    InFlight,
}

impl ClaimOutcome {
    pub const fn is_claimed(&self) -> bool {
        matches!(self, Self::FirstAttempt { .. })
    }
}

/// How a failed attempt should be recorded.
#[derive(Debug, Clone)]
pub struct FailureMark<'a> {
    pub reason: &'a str,
    /// Attempts after which the record becomes `PermanentlyFailed`.
    pub max_attempts: u32,
    /// Force `PermanentlyFailed` regardless of the attempt count.
    pub permanent: bool,
}

impl FailureMark<'_> {
    fn exhausts(&self, attempts: i32) -> bool {
        self.permanent || i64::from(attempts) >= i64::from(self.max_attempts)
    }
}

/// Persistence for `ProcessingRecord`s with atomic conditional updates.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Atomically claim `report_id` for dispatch.
    ///
    /// A `Pending` record whose `last_attempt_at` is at least `liveness` old
    /// is presumed abandoned and re-claimed.
    async fn try_claim(&self, report_id: &str, liveness: Duration)
    -> Result<ClaimOutcome, AppError>;

    /// Record a completed send. Unconditional: once the side effect happened
    /// the record must read `Succeeded`.
    async fn mark_succeeded(&self, report_id: &str) -> Result<(), AppError>;

    /// Record a failed attempt on a `Pending` record.
    ///
    /// Returns the updated record, or `None` if the record was not pending
    /// (the claim was lost to another invocation).
    async fn mark_failed(
        &self,
        report_id: &str,
        failure: &FailureMark<'_>,
    ) -> Result<Option<ProcessingRecord>, AppError>;

    async fn get(&self, report_id: &str) -> Result<Option<ProcessingRecord>, AppError>;

    /// Delete records last updated before `cutoff`. Returns the number removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Release underlying connections on shutdown.
    async fn close(&self) {}
}

/// Whether a pending claim last touched at `last_attempt_at` may be taken over.
pub(crate) fn is_stale(
    last_attempt_at: DateTime<Utc>,
    now: DateTime<Utc>,
    liveness: Duration,
) -> bool {
    let liveness = chrono::Duration::from_std(liveness).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(last_attempt_at) >= liveness
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mark_exhaustion() {
        let mark = FailureMark {
            reason: "boom",
            max_attempts: 3,
            permanent: false,
        };
        assert!(!mark.exhausts(2));
        assert!(mark.exhausts(3));
        assert!(mark.exhausts(4));

        let permanent = FailureMark {
            permanent: true,
            ..mark
        };
        assert!(permanent.exhausts(1));
    }

    #[test]
    fn test_staleness_boundary() {
        let now = Utc::now();
        let liveness = Duration::from_secs(60);
        assert!(!is_stale(now - chrono::Duration::seconds(59), now, liveness));
        assert!(is_stale(now - chrono::Duration::seconds(60), now, liveness));
        assert!(is_stale(now, now, Duration::ZERO));
    }
}
