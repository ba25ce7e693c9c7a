//! PostgreSQL record store.
//!
//! The claim is a single `INSERT … ON CONFLICT DO UPDATE … WHERE` statement:
//! the primary key on `report_id` serializes concurrent inserts, and the
//! conditional update only fires for re-claimable rows (`failed`, or `pending`
//! past the liveness threshold). A returned row means the caller owns the
//! claim; no row means someone else does or the report is finished.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use labpush_common::error::AppError;
use labpush_common::types::{ProcessingRecord, ProcessingStatus};

use super::{ClaimOutcome, FailureMark, RecordStore};

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Count records in a given status (for monitoring and tests).
    pub async fn count_by_status(&self, status: ProcessingStatus) -> Result<i64, AppError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM processing_records WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn try_claim(
        &self,
        report_id: &str,
        liveness: Duration,
    ) -> Result<ClaimOutcome, AppError> {
        let claimed: Option<ProcessingRecord> = sqlx::query_as(
            r#"
            INSERT INTO processing_records (report_id, status, attempts, last_attempt_at, created_at, updated_at)
            VALUES ($1, 'pending', 1, NOW(), NOW(), NOW())
            ON CONFLICT (report_id) DO UPDATE
            SET status = 'pending',
                attempts = processing_records.attempts + 1,
                last_attempt_at = NOW(),
                updated_at = NOW()
            WHERE processing_records.status = 'failed'
               OR (processing_records.status = 'pending'
                   AND processing_records.last_attempt_at <= NOW() - make_interval(secs => $2))
            RETURNING *
            "#,
        )
        .bind(report_id)
        .bind(liveness.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = claimed {
            return Ok(ClaimOutcome::FirstAttempt {
                attempt: record.attempts,
            });
        }

        // Lost the claim. Classify what is there now; anything that is not
        // terminal is treated as someone else's live attempt.
        let outcome = match self.get(report_id).await? {
            Some(record) if record.status.is_terminal() => ClaimOutcome::AlreadyHandled {
                status: record.status,
            },
            _ => ClaimOutcome::InFlight,
        };

        Ok(outcome)
    }

    async fn mark_succeeded(&self, report_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO processing_records (report_id, status, attempts, last_attempt_at, created_at, updated_at)
            VALUES ($1, 'succeeded', 1, NOW(), NOW(), NOW())
            ON CONFLICT (report_id) DO UPDATE
            SET status = 'succeeded', last_error = NULL, updated_at = NOW()
            "#,
        )
        .bind(report_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        report_id: &str,
        failure: &FailureMark<'_>,
    ) -> Result<Option<ProcessingRecord>, AppError> {
        let max_attempts = i32::try_from(failure.max_attempts).unwrap_or(i32::MAX);

        let record: Option<ProcessingRecord> = sqlx::query_as(
            r#"
            UPDATE processing_records
            SET status = CASE
                    WHEN $3 OR attempts >= $2 THEN 'permanently_failed'
                    ELSE 'failed'
                END,
                last_error = $4,
                updated_at = NOW()
            WHERE report_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(report_id)
        .bind(max_attempts)
        .bind(failure.permanent)
        .bind(failure.reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, report_id: &str) -> Result<Option<ProcessingRecord>, AppError> {
        let record: Option<ProcessingRecord> =
            sqlx::query_as("SELECT * FROM processing_records WHERE report_id = $1")
                .bind(report_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM processing_records WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}
