//! HTTP retry helper for model provider calls.
//!
//! HTTP-based providers should use [`send_with_retry`] instead of calling
//! `reqwest::RequestBuilder::send()` directly. Transient failures
//! (timeouts, connection resets, HTTP 429, HTTP 5xx, truncated bodies) are
//! retried according to the client's [`RetryPolicy`].
//!
//! # Usage
//!
//! ```ignore
//! let (status, body) =
//!     retry::send_with_retry(&config.retry, || client.post(&url).json(&payload)).await?;
//! ```

use std::time::Duration;

use crate::AiError;
use crate::config::{BackoffMode, RetryPolicy};

/// Maximum length of the response body preview included in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends an HTTP request, retrying transient failures, and returns the
/// final status code with the response body.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// # Retry behaviour
///
/// Up to `policy.max_attempts` attempts in total. Connection errors,
/// timeouts, body read failures, HTTP 429, and HTTP 5xx are retried after
/// [`RetryPolicy::delay_for`]. In [`BackoffMode::Adaptive`] a
/// `Retry-After` header on a 429/5xx response extends the wait.
///
/// Any other status (success or 4xx) is returned to the caller, which is
/// responsible for turning provider error bodies into messages.
///
/// # Errors
///
/// Returns [`AiError::RetriesExhausted`] once every attempt has failed
/// transiently, or [`AiError::Http`] for a non-transient request error.
#[allow(clippy::future_not_send)]
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<(reqwest::StatusCode, String), AiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let (message, hint) = match build_request().send().await {
            Err(e) if is_transient(&e) => (format!("transient error: {e}"), None),
            Err(e) => return Err(AiError::Http(e)),
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    let hint = retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    (format!("HTTP {status}: {}", preview(&body)), hint)
                } else {
                    match response.text().await {
                        Ok(body) => return Ok((status, body)),
                        Err(e) => (format!("response body read failed: {e}"), None),
                    }
                }
            }
        };

        if attempt >= max_attempts {
            log::error!("Model request failed after {attempt} attempt(s): {message}");
            return Err(AiError::RetriesExhausted {
                attempts: attempt,
                message,
            });
        }

        let mut delay = policy.delay_for(attempt);
        if policy.mode == BackoffMode::Adaptive
            && let Some(hint) = hint
        {
            delay = delay.max(hint.min(policy.max_backoff));
        }

        log::warn!("  {message}; retry {attempt}/{} in {delay:?}...", max_attempts - 1);
        tokio::time::sleep(delay).await;
    }
}

/// Parses a `Retry-After` header given in whole seconds.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

/// Truncates a response body for error messages.
pub(crate) fn preview(body: &str) -> String {
    if body.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
