//! Push endpoint verification.
//!
//! Push subscriptions are configured with an endpoint URL such as
//! `https://worker.example.com/push?token=<secret>`. When
//! `PUSH_VERIFICATION_TOKEN` is set, requests without the matching token are
//! rejected with 401 so the bus keeps the message and surfaces the error.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use labpush_common::error::AppError;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Marker extractor: present only on requests that passed verification.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedPush;

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl FromRequestParts<AppState> for VerifiedPush {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let expected = state.config.push_verification_token.clone();
        let provided = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token);

        async move {
            let Some(expected) = expected else {
                return Ok(VerifiedPush);
            };

            match provided {
                Some(token) if tokens_match(&expected, &token) => Ok(VerifiedPush),
                Some(_) => Err(AppError::Auth("Invalid push verification token".to_string())),
                None => Err(AppError::Auth(
                    "Missing push verification token. Use '?token=<token>'".to_string(),
                )),
            }
        }
    }
}
