//! Push envelope decoding.
//!
//! The bus POSTs a JSON push request whose `message.data` field carries the
//! base64-encoded report JSON:
//!
//! ```json
//! {
//!   "message": { "data": "eyJpZCI6IlIxIn0=", "messageId": "123", "publishTime": "..." },
//!   "subscription": "projects/p/subscriptions/lab-reports-email"
//! }
//! ```
//!
//! Decoding is pure. Its failures are permanent: retrying the same bytes can
//! never produce a different result.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use labpush_common::types::LabReport;

/// Outer push request as delivered by the bus.
#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
    pub message: ReportEnvelope,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// The bus-side message wrapping one report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<DateTime<Utc>>,
    /// Base64-encoded report JSON
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The push request itself is unusable (bad JSON, no data, bad base64).
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope decoded but its content is not a usable report.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// A report together with the bus metadata it arrived with.
#[derive(Debug, Clone)]
pub struct DecodedPush {
    pub report: LabReport,
    pub message_id: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub subscription: Option<String>,
}

/// Decode a raw push request body into a report.
pub fn decode_push(body: &[u8]) -> Result<DecodedPush, DecodeError> {
    let request: PushRequest = serde_json::from_slice(body)
        .map_err(|e| DecodeError::MalformedEnvelope(format!("invalid push request: {}", e)))?;

    let report = decode_envelope(&request.message)?;

    Ok(DecodedPush {
        report,
        message_id: request.message.message_id,
        publish_time: request.message.publish_time,
        subscription: request.subscription,
    })
}

/// Decode the base64 `data` of an envelope into a report.
pub fn decode_envelope(envelope: &ReportEnvelope) -> Result<LabReport, DecodeError> {
    let data = envelope
        .data
        .as_deref()
        .ok_or_else(|| DecodeError::MalformedEnvelope("message has no data".to_string()))?;

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DecodeError::MalformedEnvelope(format!("data is not valid base64: {}", e)))?;

    decode_report(&bytes)
}

/// Parse decoded payload bytes into a report with a non-empty `id`.
pub fn decode_report(bytes: &[u8]) -> Result<LabReport, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::MalformedPayload(format!("payload is not JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::MalformedPayload("payload is not a JSON object".to_string()))?;

    match object.get("id") {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => {}
        Some(serde_json::Value::String(_)) => {
            return Err(DecodeError::MalformedPayload("id is empty".to_string()));
        }
        Some(_) => {
            return Err(DecodeError::MalformedPayload("id must be a string".to_string()));
        }
        None => {
            return Err(DecodeError::MalformedPayload("missing required field id".to_string()));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| DecodeError::MalformedPayload(format!("invalid report fields: {}", e)))
}
