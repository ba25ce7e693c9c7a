//! Operator alerting for abandoned deliveries.

use std::time::Duration;

use async_trait::async_trait;

use labpush_common::channel::{AlertSink, LogAlertSink};
use labpush_common::types::ExhaustionAlert;

use crate::http::build_client;

/// Upper bound on one webhook call, response included.
const DEFAULT_ALERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Logs the alert, then POSTs it as JSON to an operator webhook.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookAlertSink {
    pub fn new(url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            url,
            timeout: DEFAULT_ALERT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn exhausted(&self, alert: &ExhaustionAlert) -> anyhow::Result<()> {
        // The log line is the record of last resort if the webhook is down.
        LogAlertSink.exhausted(alert).await?;

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(alert)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("alert webhook returned {}", status);
        }

        tracing::debug!(alert_id = %alert.alert_id, "Alert webhook delivered");
        Ok(())
    }
}
