use thiserror::Error;

use labpush_common::error::AppError;

use crate::envelope::DecodeError;

/// Why a push did not end in a fresh, successful delivery.
///
/// Permanent variants are acknowledged to the bus; transient ones ask it to
/// redeliver. See [`crate::policy::AckDecision`].
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Another invocation holds a live claim on this report.
    #[error("Report {report_id} is already being processed")]
    ConcurrentInFlight { report_id: String },

    /// The send failed and the report may be retried on redelivery.
    #[error("Dispatch of report {report_id} failed (attempt {attempts}): {reason}")]
    DispatchFailure {
        report_id: String,
        attempts: i32,
        reason: String,
    },

    /// Delivery abandoned; the report is now `PermanentlyFailed`.
    #[error("Dispatch of report {report_id} abandoned after {attempts} attempt(s): {reason}")]
    PermanentDispatchFailure {
        report_id: String,
        attempts: i32,
        reason: String,
    },

    /// The record store could not be reached or answered with an error.
    #[error("Record store unavailable: {0}")]
    Store(#[from] AppError),
}

impl ProcessingError {
    /// Whether the bus should redeliver the message.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessingError::ConcurrentInFlight { .. }
                | ProcessingError::DispatchFailure { .. }
                | ProcessingError::Store(_)
        )
    }

    /// Stable label for logs and response bodies.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingError::MalformedEnvelope(_) => "malformed_envelope",
            ProcessingError::MalformedPayload(_) => "malformed_payload",
            ProcessingError::ConcurrentInFlight { .. } => "in_flight",
            ProcessingError::DispatchFailure { .. } => "dispatch_failed",
            ProcessingError::PermanentDispatchFailure { .. } => "dispatch_abandoned",
            ProcessingError::Store(_) => "store_unavailable",
        }
    }

    pub fn report_id(&self) -> Option<&str> {
        match self {
            ProcessingError::ConcurrentInFlight { report_id }
            | ProcessingError::DispatchFailure { report_id, .. }
            | ProcessingError::PermanentDispatchFailure { report_id, .. } => Some(report_id),
            _ => None,
        }
    }
}

impl From<DecodeError> for ProcessingError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MalformedEnvelope(msg) => ProcessingError::MalformedEnvelope(msg),
            DecodeError::MalformedPayload(msg) => ProcessingError::MalformedPayload(msg),
        }
    }
}
