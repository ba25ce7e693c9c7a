//! Push delivery endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use labpush_engine::{AckDecision, ProcessingError, PushReport};

use crate::middleware::auth::VerifiedPush;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/push", post(receive_push))
}

/// Response body for a push delivery. The bus only looks at the status code.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub status: &'static str,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&PushReport> for PushResponse {
    fn from(report: &PushReport) -> Self {
        Self {
            status: match report.decision {
                AckDecision::Acknowledge => "acknowledged",
                AckDecision::Retry => "retry",
            },
            outcome: report.label(),
            report_id: report.report_id().map(str::to_string),
            detail: report.result.as_ref().err().map(|e| e.to_string()),
        }
    }
}

/// POST /push - Process one push delivery.
///
/// 200 acknowledges the message; 503 asks the bus to redeliver it.
async fn receive_push(
    State(state): State<AppState>,
    _verified: VerifiedPush,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<PushResponse>) {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            // Redelivery would bring back the same bytes, so this is final.
            return respond(&oversized(state.config.max_body_bytes));
        }
        Err(rejection) => {
            tracing::info!(error = %rejection, "Could not read push body, requesting redelivery");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(PushResponse {
                    status: "retry",
                    outcome: "body_unreadable",
                    report_id: None,
                    detail: Some(rejection.body_text()),
                }),
            );
        }
    };

    let worker = state.worker.clone();

    // Detached so a dropped connection cannot cancel a send half way.
    let task = tokio::spawn(async move { worker.handle(&body).await });

    match task.await {
        Ok(report) => respond(&report),
        Err(e) => {
            tracing::error!(error = %e, "Push processing task failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(PushResponse {
                    status: "retry",
                    outcome: "internal_error",
                    report_id: None,
                    detail: Some("processing task failed".to_string()),
                }),
            )
        }
    }
}

fn respond(report: &PushReport) -> (StatusCode, Json<PushResponse>) {
    let status = match report.decision {
        AckDecision::Acknowledge => StatusCode::OK,
        AckDecision::Retry => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(PushResponse::from(report)))
}

/// Report for a body over the size limit, acknowledged like any malformed push.
fn oversized(limit: usize) -> PushReport {
    let result = Err(ProcessingError::MalformedEnvelope(format!(
        "push body exceeds {} bytes",
        limit
    )));
    let report = PushReport {
        decision: AckDecision::for_result(&result),
        result,
    };
    tracing::warn!(
        outcome = report.label(),
        max_body_bytes = limit,
        "Rejected oversized push, acknowledging to stop redelivery"
    );
    report
}
