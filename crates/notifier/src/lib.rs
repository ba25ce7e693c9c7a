//! Concrete notification transports and alert sinks.
//!
//! The engine sees these only through the `NotificationChannel` and
//! `AlertSink` traits; `build_channel` and `build_alert_sink` pick the
//! implementation from configuration.

use std::sync::Arc;

use labpush_common::channel::{AlertSink, LogAlertSink, NotificationChannel};
use labpush_common::config::AppConfig;
use labpush_common::types::ChannelKind;

pub mod alert;
pub mod dry_run;
pub mod email;
pub mod http;
pub mod render;
pub mod sms;

pub use alert::WebhookAlertSink;
pub use dry_run::DryRunChannel;
pub use email::EmailChannel;
pub use sms::SmsChannel;

/// Build the delivery channel selected by `NOTIFY_CHANNEL`.
///
/// Missing provider credentials fall back to a dry-run channel that only logs.
pub fn build_channel(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationChannel>> {
    match config.notify_channel {
        ChannelKind::Email => match (&config.resend_api_key, &config.email_from) {
            (Some(api_key), Some(from)) => {
                tracing::info!(from = %from, "Email delivery via Resend");
                Ok(Arc::new(EmailChannel::new(api_key.clone(), from.clone())?))
            }
            _ => {
                tracing::warn!(
                    "RESEND_API_KEY or EMAIL_FROM not set, emails will be logged but not sent"
                );
                Ok(Arc::new(DryRunChannel::new(ChannelKind::Email)))
            }
        },
        ChannelKind::Sms => match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.sms_from,
        ) {
            (Some(sid), Some(token), Some(from)) => {
                tracing::info!(from = %from, "SMS delivery via Twilio");
                Ok(Arc::new(SmsChannel::new(
                    sid.clone(),
                    token.clone(),
                    from.clone(),
                )?))
            }
            _ => {
                tracing::warn!(
                    "Twilio credentials or SMS_FROM not set, SMS will be logged but not sent"
                );
                Ok(Arc::new(DryRunChannel::new(ChannelKind::Sms)))
            }
        },
    }
}

/// Build the alert sink: a webhook when `ALERT_WEBHOOK_URL` is set, else log only.
pub fn build_alert_sink(config: &AppConfig) -> anyhow::Result<Arc<dyn AlertSink>> {
    match &config.alert_webhook_url {
        Some(url) => Ok(Arc::new(WebhookAlertSink::new(url.clone())?)),
        None => Ok(Arc::new(LogAlertSink)),
    }
}
