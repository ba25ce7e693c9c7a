//! Seams between the delivery engine and the outside world.
//!
//! The engine only knows these traits. Concrete email/SMS transports and
//! alert destinations live in `labpush-notifier`.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::{ChannelKind, ExhaustionAlert, LabReport};

/// An opaque, fallible notification transport.
///
/// Implementations perform exactly one send per call and never retry
/// internally; redelivery is driven by the message bus.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which channel this transport delivers on.
    fn kind(&self) -> ChannelKind;

    /// Human-readable transport name for logs (e.g., "resend").
    fn name(&self) -> &'static str;

    async fn send(&self, report: &LabReport) -> Result<(), ChannelError>;
}

/// Side channel for operator-facing alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Raise an alert for a report whose delivery was abandoned.
    async fn exhausted(&self, alert: &ExhaustionAlert) -> anyhow::Result<()>;
}

/// Alert sink that only writes a structured error log line.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn exhausted(&self, alert: &ExhaustionAlert) -> anyhow::Result<()> {
        tracing::error!(
            target: "labpush::alert",
            alert_id = %alert.alert_id,
            report_id = %alert.report_id,
            channel = %alert.channel,
            attempts = alert.attempts,
            reason = %alert.reason,
            "Delivery abandoned, manual follow-up required"
        );
        Ok(())
    }
}
