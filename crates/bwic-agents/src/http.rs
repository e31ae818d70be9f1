use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, Response, StatusCode};

use crate::error::AgentError;

/// Longest slice of an error body carried into an error message.
const MAX_BODY_CHARS: usize = 300;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AgentError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AgentError::Fatal(format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level failure. Everything short of a malformed request is
/// worth another attempt.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error, timeout: Duration) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(timeout)
    } else if err.is_builder() {
        AgentError::Fatal(format!("{provider} request could not be built: {err}"))
    } else {
        AgentError::Transient(format!("{provider} request failed: {err}"))
    }
}

/// Turn a non-success response into an error, keeping any retry hint.
pub(crate) async fn status_error(provider: &str, response: Response) -> AgentError {
    let status = response.status();
    let header_hint = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let hint = header_hint.or_else(|| retry_delay_from_body(&body));
    classify_status(provider, status, &body, hint)
}

pub(crate) fn classify_status(
    provider: &str,
    status: StatusCode,
    body: &str,
    retry_after_secs: Option<u64>,
) -> AgentError {
    let mut message = format!("{provider} returned HTTP {}", status.as_u16());
    let excerpt = excerpt(body);
    if !excerpt.is_empty() {
        message.push_str(": ");
        message.push_str(&excerpt);
    }
    if let Some(secs) = retry_after_secs {
        message.push_str(&format!(" (retry in {secs}s)"));
    }

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        AgentError::Transient(message)
    } else {
        // 400/401/403/404 and anything else unexpected: retrying will not help.
        AgentError::Fatal(message)
    }
}

/// Gemini puts its back-off hint in the body: `"retryDelay": "17s"`.
fn retry_delay_from_body(body: &str) -> Option<u64> {
    static RETRY_DELAY: OnceLock<Regex> = OnceLock::new();
    let re = RETRY_DELAY.get_or_init(|| {
        Regex::new(r#"(?i)"retryDelay"\s*:\s*"(\d+)(?:\.\d+)?s""#).expect("valid regex")
    });
    re.captures(body)?.get(1)?.as_str().parse().ok()
}

fn excerpt(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX_BODY_CHARS {
        let cut: String = flat.chars().take(MAX_BODY_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
