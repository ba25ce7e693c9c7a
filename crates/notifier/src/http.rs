//! Shared HTTP plumbing for provider calls.

use std::time::Duration;

use labpush_common::error::ChannelError;

/// Longest provider error body kept in a `ChannelError`.
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client used for provider calls.
///
/// There is no overall request timeout here; the dispatcher bounds each send.
pub fn build_client() -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("labpush/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub(crate) fn transport_error(err: reqwest::Error) -> ChannelError {
    if err.is_builder() {
        // Bad base URL or header value; no request was sent.
        return ChannelError::Config(err.to_string());
    }
    ChannelError::Transport(err.to_string())
}

/// Map a provider response to success or a classified `ChannelError`.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    Err(ChannelError::Rejected {
        status: status.as_u16(),
        body,
    })
}
