use reqwest::StatusCode;
use serde::Deserialize;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::time::Duration;

use crate::completion::CompletionError;

fn error_chain_has(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has(err, ErrorKind::TimedOut, "timed out")
}

/// Maps a failure to reach the provider into a recoverable completion error.
pub(crate) fn transport_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> CompletionError {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return CompletionError::other(format!(
            "Request timed out after {timeout_secs}s while calling '{api_url}'. \
             Increase MODEL_TIMEOUT_SECS or try again."
        ));
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return CompletionError::other(format!(
                "Connection refused by model API at '{api_url}'. \
                 Check ANTHROPIC_BASE_URL."
            ));
        }

        return CompletionError::other(format!(
            "Failed to connect to model API at '{api_url}'. \
             Check ANTHROPIC_BASE_URL and network connectivity."
        ));
    }

    CompletionError::other(format!("Failed to call model API at '{api_url}': {err}"))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

fn provider_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

/// Classifies a non-success provider response.
pub(crate) fn status_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> CompletionError {
    let message = provider_message(body);
    match status {
        StatusCode::UNAUTHORIZED => CompletionError::AuthenticationFailed(message),
        StatusCode::TOO_MANY_REQUESTS => CompletionError::rate_limited(message, retry_after),
        _ => CompletionError::other(format!(
            "Model request failed with status {status}: {message}"
        )),
    }
}

pub(crate) fn parse_retry_after(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
