//! In-memory record store for tests and single-replica development.
//!
//! Claims are atomic within the process only. Running more than one worker
//! replica against this store reopens the cross-replica duplicate window.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use labpush_common::error::AppError;
use labpush_common::types::{ProcessingRecord, ProcessingStatus};

use super::{ClaimOutcome, FailureMark, RecordStore, is_stale};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, ProcessingRecord>>,
}

fn poison_err<T>(_: PoisonError<T>) -> AppError {
    AppError::Internal("record store lock poisoned".to_string())
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ProcessingRecord>>, AppError> {
        self.records.lock().map_err(poison_err)
    }

    /// Number of tracked records (for tests and monitoring).
    pub fn len(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.lock()?.is_empty())
    }

    /// Insert or replace a record verbatim, bypassing the claim protocol.
    pub fn insert(&self, record: ProcessingRecord) -> Result<(), AppError> {
        self.lock()?.insert(record.report_id.clone(), record);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn try_claim(
        &self,
        report_id: &str,
        liveness: Duration,
    ) -> Result<ClaimOutcome, AppError> {
        let now = Utc::now();
        let mut records = self.lock()?;

        let Some(record) = records.get_mut(report_id) else {
            records.insert(
                report_id.to_string(),
                ProcessingRecord::first_claim(report_id, now),
            );
            return Ok(ClaimOutcome::FirstAttempt { attempt: 1 });
        };

        let reclaimable = match record.status {
            ProcessingStatus::Succeeded | ProcessingStatus::PermanentlyFailed => {
                return Ok(ClaimOutcome::AlreadyHandled {
                    status: record.status,
                });
            }
            ProcessingStatus::Failed => true,
            ProcessingStatus::Pending => is_stale(record.last_attempt_at, now, liveness),
        };

        if !reclaimable {
            return Ok(ClaimOutcome::InFlight);
        }

        record.status = ProcessingStatus::Pending;
        record.attempts += 1;
        record.last_attempt_at = now;
        record.updated_at = now;

        Ok(ClaimOutcome::FirstAttempt {
            attempt: record.attempts,
        })
    }

    async fn mark_succeeded(&self, report_id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let mut records = self.lock()?;
        let record = records
            .entry(report_id.to_string())
            .or_insert_with(|| ProcessingRecord::first_claim(report_id, now));
        record.status = ProcessingStatus::Succeeded;
        record.last_error = None;
        record.updated_at = now;
        Ok(())
    }

    async fn mark_failed(
        &self,
        report_id: &str,
        failure: &FailureMark<'_>,
    ) -> Result<Option<ProcessingRecord>, AppError> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(report_id) else {
            return Ok(None);
        };
        if record.status != ProcessingStatus::Pending {
            return Ok(None);
        }

        record.status = if failure.exhausts(record.attempts) {
            ProcessingStatus::PermanentlyFailed
        } else {
            ProcessingStatus::Failed
        };
        record.last_error = Some(failure.reason.to_string());
        record.updated_at = Utc::now();

        Ok(Some(record.clone()))
    }

    async fn get(&self, report_id: &str) -> Result<Option<ProcessingRecord>, AppError> {
        Ok(self.lock()?.get(report_id).cloned())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, record| record.updated_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const LIVENESS: Duration = Duration::from_secs(60);

    fn fail(max_attempts: u32) -> FailureMark<'static> {
        FailureMark {
            reason: "smtp 503",
            max_attempts,
            permanent: false,
        }
    }

    #[tokio::test]
    async fn test_first_claim_creates_pending_record() {
        let store = MemoryRecordStore::new();
        let outcome = store.try_claim("R1", LIVENESS).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::FirstAttempt { attempt: 1 });

        let record = store.get("R1").await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Pending);
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn test_live_pending_claim_is_in_flight() {
        let store = MemoryRecordStore::new();
        store.try_claim("R1", LIVENESS).await.unwrap();
        let outcome = store.try_claim("R1", LIVENESS).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::InFlight);
        // In-flight answers do not count as attempts.
        assert_eq!(store.get("R1").await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_stale_pending_claim_is_reclaimed() {
        let store = MemoryRecordStore::new();
        store.try_claim("R1", LIVENESS).await.unwrap();
        let outcome = store.try_claim("R1", Duration::ZERO).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::FirstAttempt { attempt: 2 });
    }

    #[tokio::test]
    async fn test_succeeded_is_already_handled() {
        let store = MemoryRecordStore::new();
        store.try_claim("R1", LIVENESS).await.unwrap();
        store.mark_succeeded("R1").await.unwrap();

        let outcome = store.try_claim("R1", Duration::ZERO).await.unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::AlreadyHandled {
                status: ProcessingStatus::Succeeded
            }
        );
    }

    #[tokio::test]
    async fn test_failed_record_is_reclaimable_until_exhausted() {
        let store = MemoryRecordStore::new();

        for attempt in 1..=2 {
            let outcome = store.try_claim("R2", LIVENESS).await.unwrap();
            assert_eq!(outcome, ClaimOutcome::FirstAttempt { attempt });
            let record = store.mark_failed("R2", &fail(3)).await.unwrap().unwrap();
            assert_eq!(record.status, ProcessingStatus::Failed);
            assert_eq!(record.last_error.as_deref(), Some("smtp 503"));
        }

        assert_eq!(
            store.try_claim("R2", LIVENESS).await.unwrap(),
            ClaimOutcome::FirstAttempt { attempt: 3 }
        );
        let record = store.mark_failed("R2", &fail(3)).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::PermanentlyFailed);

        assert_eq!(
            store.try_claim("R2", LIVENESS).await.unwrap(),
            ClaimOutcome::AlreadyHandled {
                status: ProcessingStatus::PermanentlyFailed
            }
        );
    }

    #[tokio::test]
    async fn test_mark_failed_requires_pending() {
        let store = MemoryRecordStore::new();
        assert!(store.mark_failed("missing", &fail(5)).await.unwrap().is_none());

        store.try_claim("R3", LIVENESS).await.unwrap();
        store.mark_succeeded("R3").await.unwrap();
        assert!(store.mark_failed("R3", &fail(5)).await.unwrap().is_none());
        assert_eq!(
            store.get("R3").await.unwrap().unwrap().status,
            ProcessingStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_concurrent_claims_yield_single_owner() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_claim("R1", LIVENESS).await.unwrap()
            }));
        }

        let mut owners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ClaimOutcome::FirstAttempt { .. } => owners += 1,
                ClaimOutcome::InFlight => {}
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn test_purge_before_cutoff() {
        let store = MemoryRecordStore::new();
        let mut old = ProcessingRecord::first_claim("OLD", Utc::now() - chrono::Duration::days(30));
        old.status = ProcessingStatus::Succeeded;
        store.insert(old).unwrap();
        store.try_claim("NEW", LIVENESS).await.unwrap();

        let removed = store
            .purge_before(Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("OLD").await.unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_poisoned_lock_is_reported_not_hidden() {
        let store = Arc::new(MemoryRecordStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.records.lock().unwrap();
            panic!("writer died while holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(AppError::Internal(_))));
        assert!(store.is_empty().is_err());
    }
}
