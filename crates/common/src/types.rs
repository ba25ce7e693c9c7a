use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification channel a worker instance delivers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Sms => write!(f, "sms"),
        }
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            other => Err(format!("unknown notification channel '{}'", other)),
        }
    }
}

/// A lab report decoded from a push message.
///
/// Only `id` is required. Everything the publisher sends beyond the known
/// fields is kept in `extra` so channels can render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabReport {
    /// Unique report identifier, also the idempotency key.
    pub id: String,
    /// Patient reference (the publisher may send this as `patient`)
    #[serde(default, alias = "patient", alias = "patient_ref")]
    pub patient_ref: Option<String>,
    /// Recipient address for the email channel
    #[serde(default)]
    pub email: Option<String>,
    /// Recipient number for the SMS channel (E.164)
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "test_name")]
    pub test_name: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, alias = "collected_at")]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle state of a [`ProcessingRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Claimed by a worker; a send may be in progress.
    Pending,
    Succeeded,
    /// Last attempt failed; a redelivery may claim it again.
    Failed,
    /// Terminal. Attempts exhausted or the channel rejected the report outright.
    PermanentlyFailed,
}

impl ProcessingStatus {
    /// Whether the record has reached a state that never dispatches again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Succeeded | ProcessingStatus::PermanentlyFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Succeeded => "succeeded",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::PermanentlyFailed => "permanently_failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "succeeded" => Ok(ProcessingStatus::Succeeded),
            "failed" => Ok(ProcessingStatus::Failed),
            "permanently_failed" => Ok(ProcessingStatus::PermanentlyFailed),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

/// Per-report delivery bookkeeping, one row per distinct report id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessingRecord {
    pub report_id: String,
    pub status: ProcessingStatus,
    /// Number of claimed delivery attempts. Never decreases.
    pub attempts: i32,
    pub last_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    /// A freshly claimed record for a report seen for the first time.
    pub fn first_claim(report_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            report_id: report_id.to_string(),
            status: ProcessingStatus::Pending,
            attempts: 1,
            last_attempt_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Rendered, channel-ready notification content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Short title, used as the email subject
    pub subject: String,
    /// Message body
    pub body: String,
}

/// Raised once per report when delivery is given up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhaustionAlert {
    pub alert_id: Uuid,
    pub report_id: String,
    pub channel: ChannelKind,
    pub attempts: i32,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
}

impl ExhaustionAlert {
    pub fn new(report_id: &str, channel: ChannelKind, attempts: i32, reason: &str) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            report_id: report_id.to_string(),
            channel,
            attempts,
            reason: reason.to_string(),
            raised_at: Utc::now(),
        }
    }
}
