use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Infrastructure and API error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Redis(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

/// Failure reported by a notification channel's send operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The report carries no recipient for this channel.
    #[error("Report has no {0} recipient")]
    MissingRecipient(&'static str),

    /// The provider answered with a non-success status.
    #[error("Provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Connection, TLS, or other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Send timed out after {0} ms")]
    Timeout(u64),

    #[error("Channel misconfigured: {0}")]
    Config(String),
}

impl ChannelError {
    /// Whether retrying the same report can never succeed.
    ///
    /// Provider 4xx answers are final except request timeout (408) and
    /// rate limiting (429).
    pub fn is_permanent(&self) -> bool {
        match self {
            ChannelError::MissingRecipient(_) => true,
            ChannelError::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            ChannelError::Transport(_) | ChannelError::Timeout(_) | ChannelError::Config(_) => {
                false
            }
        }
    }
}
