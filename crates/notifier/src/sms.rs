//! SMS delivery through the Twilio Messages API.

use async_trait::async_trait;

use labpush_common::channel::NotificationChannel;
use labpush_common::error::ChannelError;
use labpush_common::types::{ChannelKind, LabReport};

use crate::http::{build_client, check_response, transport_error};
use crate::render::render_sms;

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

pub struct SmsChannel {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
    base_url: String,
}

impl SmsChannel {
    pub fn new(account_sid: String, auth_token: String, from: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            account_sid,
            auth_token,
            from,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, report: &LabReport) -> Result<(), ChannelError> {
        let to = report
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ChannelError::MissingRecipient("phone"))?;

        let body = render_sms(report);
        let form = [("To", to), ("From", self.from.as_str()), ("Body", body.as_str())];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        check_response(response).await
    }
}
