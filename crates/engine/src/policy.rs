//! Retry/acknowledgement policy.
//!
//! | Outcome                                   | Decision    |
//! |-------------------------------------------|-------------|
//! | malformed envelope / payload              | Acknowledge |
//! | duplicate (`Succeeded`/`PermanentlyFailed`) | Acknowledge |
//! | concurrent in-flight claim                | Retry       |
//! | delivered                                 | Acknowledge |
//! | dispatch failure, attempts < max          | Retry       |
//! | dispatch abandoned                        | Acknowledge |
//! | record store unavailable                  | Retry       |
//!
//! Backoff between retries belongs to the bus; this only picks a side.

use crate::dispatcher::Processed;
use crate::error::ProcessingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Tell the bus the message is done; it will not be redelivered.
    Acknowledge,
    /// Tell the bus to redeliver with its backoff.
    Retry,
}

impl AckDecision {
    pub fn for_result(result: &Result<Processed, ProcessingError>) -> Self {
        match result {
            Ok(_) => AckDecision::Acknowledge,
            Err(e) if e.is_retryable() => AckDecision::Retry,
            Err(_) => AckDecision::Acknowledge,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, AckDecision::Acknowledge)
    }
}

#[cfg(test)]
mod tests {
    use labpush_common::error::AppError;
    use labpush_common::types::ProcessingStatus;

    use super::*;

    fn decide(result: Result<Processed, ProcessingError>) -> AckDecision {
        AckDecision::for_result(&result)
    }

    #[test]
    fn test_acknowledged_outcomes() {
        assert!(decide(Err(ProcessingError::MalformedEnvelope("bad base64".into()))).is_ack());
        assert!(decide(Err(ProcessingError::MalformedPayload("no id".into()))).is_ack());
        assert!(
            decide(Ok(Processed::Duplicate {
                report_id: "R1".into(),
                status: ProcessingStatus::Succeeded,
            }))
            .is_ack()
        );
        assert!(
            decide(Ok(Processed::Delivered {
                report_id: "R1".into(),
                attempts: 1,
            }))
            .is_ack()
        );
        assert!(
            decide(Err(ProcessingError::PermanentDispatchFailure {
                report_id: "R2".into(),
                attempts: 5,
                reason: "smtp 503".into(),
            }))
            .is_ack()
        );
    }

    #[test]
    fn test_retried_outcomes() {
        assert_eq!(
            decide(Err(ProcessingError::ConcurrentInFlight {
                report_id: "R1".into()
            })),
            AckDecision::Retry
        );
        assert_eq!(
            decide(Err(ProcessingError::DispatchFailure {
                report_id: "R2".into(),
                attempts: 4,
                reason: "smtp 503".into(),
            })),
            AckDecision::Retry
        );
        assert_eq!(
            decide(Err(ProcessingError::Store(AppError::Internal(
                "pool timed out".into()
            )))),
            AckDecision::Retry
        );
    }
}
