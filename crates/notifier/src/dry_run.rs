//! Log-only channel used when provider credentials are not configured.

use async_trait::async_trait;

use labpush_common::channel::NotificationChannel;
use labpush_common::error::ChannelError;
use labpush_common::types::{ChannelKind, LabReport};

use crate::render::{render_email, render_sms};

pub struct DryRunChannel {
    kind: ChannelKind,
}

impl DryRunChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for DryRunChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send(&self, report: &LabReport) -> Result<(), ChannelError> {
        match self.kind {
            ChannelKind::Email => {
                let to = report
                    .email
                    .as_deref()
                    .ok_or(ChannelError::MissingRecipient("email"))?;
                let payload = render_email(report);
                tracing::info!(
                    report_id = %report.id,
                    to,
                    subject = %payload.subject,
                    "[dry-run] Would send email"
                );
            }
            ChannelKind::Sms => {
                let to = report
                    .phone
                    .as_deref()
                    .ok_or(ChannelError::MissingRecipient("phone"))?;
                tracing::info!(
                    report_id = %report.id,
                    to,
                    body = %render_sms(report),
                    "[dry-run] Would send SMS"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_report(value: serde_json::Value) -> LabReport {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_dry_run_requires_recipient() {
        let email = DryRunChannel::new(ChannelKind::Email);
        let sms = DryRunChannel::new(ChannelKind::Sms);
        let report = make_report(serde_json::json!({"id": "R1", "email": "a@example.com"}));

        assert!(email.send(&report).await.is_ok());
        assert_eq!(
            sms.send(&report).await,
            Err(ChannelError::MissingRecipient("phone"))
        );
    }
}
