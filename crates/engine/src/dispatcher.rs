//! Notification dispatcher.
//!
//! Performs exactly one bounded send for a claimed report and records the
//! result. It never retries: a failed attempt is left `Failed` for the next
//! redelivery to claim, or moved to `PermanentlyFailed` when attempts run out
//! or the channel says retrying is pointless.

use std::sync::Arc;
use std::time::Duration;

use labpush_common::channel::NotificationChannel;
use labpush_common::error::ChannelError;
use labpush_common::types::{ChannelKind, LabReport, ProcessingStatus};

use crate::error::ProcessingError;
use crate::store::{FailureMark, RecordStore};

/// Result of a single bounded send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failure { reason: String, permanent: bool },
}

impl From<Result<(), ChannelError>> for DispatchOutcome {
    fn from(result: Result<(), ChannelError>) -> Self {
        match result {
            Ok(()) => DispatchOutcome::Success,
            Err(e) => DispatchOutcome::Failure {
                permanent: e.is_permanent(),
                reason: e.to_string(),
            },
        }
    }
}

/// A report that was delivered (or already had been).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Delivered { report_id: String, attempts: i32 },
    Duplicate {
        report_id: String,
        status: ProcessingStatus,
    },
}

impl Processed {
    pub fn label(&self) -> &'static str {
        match self {
            Processed::Delivered { .. } => "delivered",
            Processed::Duplicate { .. } => "duplicate",
        }
    }

    pub fn report_id(&self) -> &str {
        match self {
            Processed::Delivered { report_id, .. } | Processed::Duplicate { report_id, .. } => {
                report_id
            }
        }
    }
}

pub struct NotificationDispatcher {
    channel: Arc<dyn NotificationChannel>,
    store: Arc<dyn RecordStore>,
    timeout: Duration,
    max_attempts: u32,
}

impl NotificationDispatcher {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        store: Arc<dyn RecordStore>,
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            channel,
            store,
            timeout,
            max_attempts,
        }
    }

    pub fn channel_kind(&self) -> ChannelKind {
        self.channel.kind()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Send once, bounded by the dispatch timeout.
    pub async fn send(&self, report: &LabReport) -> DispatchOutcome {
        match tokio::time::timeout(self.timeout, self.channel.send(report)).await {
            Ok(result) => result.into(),
            Err(_) => DispatchOutcome::from(Err::<(), _>(ChannelError::Timeout(
                self.timeout.as_millis() as u64,
            ))),
        }
    }

    /// Dispatch a report claimed on attempt number `attempt` and record the result.
    pub async fn dispatch(
        &self,
        report: &LabReport,
        attempt: i32,
    ) -> Result<Processed, ProcessingError> {
        let started = std::time::Instant::now();
        let outcome = self.send(report).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            DispatchOutcome::Success => {
                tracing::info!(
                    report_id = %report.id,
                    channel = self.channel.name(),
                    attempt,
                    elapsed_ms,
                    "Notification sent"
                );
                // The side effect already happened. Failing to record it must
                // not turn into a redelivery, which would send again.
                if let Err(e) = self.store.mark_succeeded(&report.id).await {
                    tracing::error!(
                        report_id = %report.id,
                        error = %e,
                        "Sent notification but could not record success"
                    );
                }
                Ok(Processed::Delivered {
                    report_id: report.id.clone(),
                    attempts: attempt,
                })
            }
            DispatchOutcome::Failure { reason, permanent } => {
                tracing::warn!(
                    report_id = %report.id,
                    channel = self.channel.name(),
                    attempt,
                    elapsed_ms,
                    permanent,
                    reason = %reason,
                    "Notification send failed"
                );
                self.record_failure(&report.id, &reason, permanent).await
            }
        }
    }

    /// Abandon a claimed report without sending.
    pub async fn abandon(&self, report_id: &str, reason: &str) -> Result<Processed, ProcessingError> {
        self.record_failure(report_id, reason, true).await
    }

    async fn record_failure(
        &self,
        report_id: &str,
        reason: &str,
        permanent: bool,
    ) -> Result<Processed, ProcessingError> {
        let mark = FailureMark {
            reason,
            max_attempts: self.max_attempts,
            permanent,
        };

        let Some(record) = self.store.mark_failed(report_id, &mark).await? else {
            // Claim lost (stale takeover); whoever holds it now decides.
            return Err(ProcessingError::ConcurrentInFlight {
                report_id: report_id.to_string(),
            });
        };

        if record.status == ProcessingStatus::PermanentlyFailed {
            Err(ProcessingError::PermanentDispatchFailure {
                report_id: report_id.to_string(),
                attempts: record.attempts,
                reason: reason.to_string(),
            })
        } else {
            Err(ProcessingError::DispatchFailure {
                report_id: report_id.to_string(),
                attempts: record.attempts,
                reason: reason.to_string(),
            })
        }
    }
}
