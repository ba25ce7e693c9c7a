//! Email delivery through the Resend HTTP API.

use async_trait::async_trait;
use serde::Serialize;

use labpush_common::channel::NotificationChannel;
use labpush_common::error::ChannelError;
use labpush_common::types::{ChannelKind, LabReport};

use crate::http::{build_client, check_response, transport_error};
use crate::render::render_email;

const DEFAULT_BASE_URL: &str = "https://api.resend.com";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct EmailChannel {
    client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

impl EmailChannel {
    pub fn new(api_key: String, from: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            from,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the channel at a different API host (tests, regional endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, report: &LabReport) -> Result<(), ChannelError> {
        let to = report
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(ChannelError::MissingRecipient("email"))?;

        let payload = render_email(report);
        let request = SendEmailRequest {
            from: &self.from,
            to: [to],
            subject: &payload.subject,
            text: &payload.body,
        };

        // Resend deduplicates on this key too, which covers a send that
        // completed after our timeout fired.
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &report.id)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        check_response(response).await
    }
}
