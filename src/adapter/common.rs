//! Shared helpers for engine-family adapters: HTTP status classification
//! and base-url joining, grounded on the remote-provider plumbing's
//! status-mapping convention.

use reqwest::Response;

use crate::error::{OrchestratorError, Result};

/// Maps an HTTP response status onto the crate's error taxonomy.
/// - 2xx: `Ok(())`.
/// - 4xx: [`OrchestratorError::ClientError`] — terminal, not a breaker
///   failure.
/// - 5xx and anything else unexpected: [`OrchestratorError::Unavailable`]
///   — retryable, counts as a breaker failure.
pub async fn check_http_status(engine: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        Err(OrchestratorError::ClientError(format!(
            "{engine} rejected request ({status}): {body}"
        )))
    } else {
        Err(OrchestratorError::Unavailable(format!(
            "{engine} returned {status}: {body}"
        )))
    }
}

/// Classifies a `reqwest::Error` that occurred before a response was even
/// received (connection refused, DNS failure, request-level timeout).
pub fn classify_transport_error(engine: &str, err: &reqwest::Error) -> OrchestratorError {
    if err.is_timeout() {
        OrchestratorError::Timeout
    } else {
        OrchestratorError::Unavailable(format!("{engine} transport error: {err}"))
    }
}

/// Joins a base url and a path without producing a double slash.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_trailing_and_leading_slashes() {
        assert_eq!(join_url("http://h:1/", "/v1/x"), "http://h:1/v1/x");
        assert_eq!(join_url("http://h:1", "v1/x"), "http://h:1/v1/x");
    }
}
