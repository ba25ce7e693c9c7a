//! Push notification worker: decode → claim → dispatch → decide.
//!
//! One worker is built per process and shared by every push invocation. All
//! collaborators (record store, channel, alert sink) are injected here.

use std::sync::Arc;
use std::time::Duration;

use labpush_common::channel::{AlertSink, NotificationChannel};
use labpush_common::types::{ChannelKind, ExhaustionAlert};

use crate::dispatcher::{NotificationDispatcher, Processed};
use crate::envelope::decode_push;
use crate::error::ProcessingError;
use crate::guard::IdempotencyGuard;
use crate::policy::AckDecision;
use crate::store::{ClaimOutcome, RecordStore};

/// Tunables for a worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub max_attempts: u32,
    pub dispatch_timeout: Duration,
    pub claim_liveness: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            dispatch_timeout: Duration::from_secs(10),
            claim_liveness: Duration::from_secs(60),
        }
    }
}

/// What happened to one push, and what to tell the bus.
#[derive(Debug)]
pub struct PushReport {
    pub decision: AckDecision,
    pub result: Result<Processed, ProcessingError>,
}

impl PushReport {
    pub fn label(&self) -> &'static str {
        match &self.result {
            Ok(processed) => processed.label(),
            Err(e) => e.label(),
        }
    }

    pub fn report_id(&self) -> Option<&str> {
        match &self.result {
            Ok(processed) => Some(processed.report_id()),
            Err(e) => e.report_id(),
        }
    }
}

pub struct PushWorker {
    guard: IdempotencyGuard,
    dispatcher: NotificationDispatcher,
    alerts: Arc<dyn AlertSink>,
    settings: WorkerSettings,
}

impl PushWorker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn NotificationChannel>,
        alerts: Arc<dyn AlertSink>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            guard: IdempotencyGuard::new(store.clone(), settings.claim_liveness),
            dispatcher: NotificationDispatcher::new(
                channel,
                store,
                settings.dispatch_timeout,
                settings.max_attempts,
            ),
            alerts,
            settings,
        }
    }

    pub fn channel_kind(&self) -> ChannelKind {
        self.dispatcher.channel_kind()
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Process one push request body end to end.
    pub async fn handle(&self, body: &[u8]) -> PushReport {
        let result = self.process(body).await;
        let decision = AckDecision::for_result(&result);

        match &result {
            Ok(processed) => {
                tracing::debug!(
                    report_id = processed.report_id(),
                    outcome = processed.label(),
                    "Push acknowledged"
                );
            }
            Err(e @ (ProcessingError::MalformedEnvelope(_) | ProcessingError::MalformedPayload(_))) => {
                tracing::warn!(
                    outcome = e.label(),
                    error = %e,
                    "Rejected malformed push, acknowledging to stop redelivery"
                );
            }
            Err(e @ ProcessingError::PermanentDispatchFailure {
                report_id,
                attempts,
                reason,
            }) => {
                tracing::error!(
                    report_id = %report_id,
                    attempts,
                    error = %e,
                    "Delivery abandoned, acknowledging and raising alert"
                );
                let alert = ExhaustionAlert::new(report_id, self.channel_kind(), *attempts, reason);
                self.raise_alert(&alert).await;
            }
            Err(e) => {
                tracing::info!(
                    report_id = e.report_id(),
                    outcome = e.label(),
                    error = %e,
                    "Push not processed, requesting redelivery"
                );
            }
        }

        PushReport { decision, result }
    }

    /// Deliver an exhaustion alert, bounded by the dispatch timeout.
    async fn raise_alert(&self, alert: &ExhaustionAlert) {
        let limit = self.settings.dispatch_timeout;
        match tokio::time::timeout(limit, self.alerts.exhausted(alert)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(
                    report_id = %alert.report_id,
                    alert_id = %alert.alert_id,
                    error = %e,
                    "Failed to deliver exhaustion alert"
                );
            }
            Err(_) => {
                tracing::error!(
                    report_id = %alert.report_id,
                    alert_id = %alert.alert_id,
                    timeout_ms = limit.as_millis() as u64,
                    "Exhaustion alert timed out"
                );
            }
        }
    }

    async fn process(&self, body: &[u8]) -> Result<Processed, ProcessingError> {
        let push = decode_push(body)?;
        let report = push.report;

        tracing::debug!(
            report_id = %report.id,
            message_id = push.message_id.as_deref(),
            subscription = push.subscription.as_deref(),
            "Decoded push"
        );

        match self.guard.claim(&report.id).await? {
            ClaimOutcome::FirstAttempt { attempt }
                if i64::from(attempt) > i64::from(self.settings.max_attempts) =>
            {
                // Earlier claims died mid-send without recording a result.
                let reason = format!(
                    "claimed {} times without a recorded result (max {})",
                    attempt, self.settings.max_attempts
                );
                self.dispatcher.abandon(&report.id, &reason).await
            }
            ClaimOutcome::FirstAttempt { attempt } => {
                self.dispatcher.dispatch(&report, attempt).await
            }
            ClaimOutcome::AlreadyHandled { status } => Ok(Processed::Duplicate {
                report_id: report.id,
                status,
            }),
            ClaimOutcome::InFlight => Err(ProcessingError::ConcurrentInFlight {
                report_id: report.id,
            }),
        }
    }
}
