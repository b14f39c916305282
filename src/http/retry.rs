//! Retry policy and status classification for build-service requests.

use reqwest::StatusCode;

/// Maximum number of attempts for idempotent requests.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Failures that will not go away by asking again.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NonRetryableError {
    /// Too many requests (HTTP 429)
    #[error("Rate limit exceeded: {0}. Try again later.")]
    RateLimitExceeded(String),
    /// Authentication failed (HTTP 401)
    #[error("Authentication failed: {0}. Check OBS_USER and OBS_PASSWORD.")]
    AuthenticationFailed(String),
    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Forbidden access (HTTP 403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),
    /// Other client errors that won't succeed on retry
    #[error("Request error (HTTP {0}): {1}")]
    ClientError(u16, String),
}

impl NonRetryableError {
    /// HTTP status code the error was classified from.
    pub fn status(&self) -> u16 {
        match self {
            NonRetryableError::RateLimitExceeded(_) => 429,
            NonRetryableError::AuthenticationFailed(_) => 401,
            NonRetryableError::NotFound(_) => 404,
            NonRetryableError::Forbidden(_) => 403,
            NonRetryableError::ClientError(code, _) => *code,
        }
    }
}

/// Classifies a failed response status.
/// Returns Ok(()) if the failure is worth retrying, Err with the reason if not.
pub fn classify_status(status: StatusCode, summary: &str) -> Result<(), NonRetryableError> {
    let summary = summary.to_string();
    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(summary)),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(summary)),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(summary)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(summary)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(s.as_u16(), summary)),
        // 5xx server errors are retryable
        _ => Ok(()),
    }
}

/// Builds the error for a failed response.
/// Client errors become a [`NonRetryableError`], everything else stays retryable.
pub fn status_error(status: StatusCode, url: &str, summary: &str) -> anyhow::Error {
    match classify_status(status, summary) {
        Ok(()) => anyhow::anyhow!("HTTP {} from {}: {}", status.as_u16(), url, summary),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}

/// Returns the HTTP status of a non-retryable failure, if that is what `e` is.
pub fn non_retryable_status(e: &anyhow::Error) -> Option<u16> {
    e.downcast_ref::<NonRetryableError>()
        .map(NonRetryableError::status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_retryable_error_display() {
        let err = NonRetryableError::AuthenticationFailed("bad credentials".to_string());
        assert!(err.to_string().contains("Authentication"));
        assert!(err.to_string().contains("OBS_USER"));

        let err = NonRetryableError::NotFound("unknown_project".to_string());
        assert!(err.to_string().contains("Not found"));

        let err = NonRetryableError::Forbidden("modify_project".to_string());
        assert!(err.to_string().contains("forbidden"));

        let err = NonRetryableError::ClientError(400, "validation failed".to_string());
        assert_eq!(err.to_string(), "Request error (HTTP 400): validation failed");

        let err = NonRetryableError::RateLimitExceeded("slow down".to_string());
        assert_eq!(err.to_string(), "Rate limit exceeded: slow down. Try again later.");
    }

    #[test]
    fn test_non_retryable_error_in_anyhow_chain() {
        let err = anyhow::Error::new(NonRetryableError::Forbidden("x".to_string()))
            .context("PUT http://obs/source/P/_meta");
        assert_eq!(non_retryable_status(&err), Some(403));

        let source: &dyn std::error::Error = &NonRetryableError::NotFound("x".to_string());
        assert!(source.source().is_none());
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "x"),
            Err(NonRetryableError::NotFound("x".to_string()))
        );
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "x"),
            Err(NonRetryableError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "x"),
            Err(NonRetryableError::Forbidden(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "x"),
            Err(NonRetryableError::RateLimitExceeded(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "x"),
            Err(NonRetryableError::ClientError(400, _))
        ));
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "x").is_ok());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "x").is_ok());
    }

    #[test]
    fn test_status_error_keeps_server_errors_retryable() {
        let err = status_error(StatusCode::BAD_GATEWAY, "http://obs/source", "upstream");
        assert_eq!(non_retryable_status(&err), None);
        assert!(err.to_string().contains("502"));

        let err = status_error(StatusCode::NOT_FOUND, "http://obs/source/X/_meta", "gone");
        assert_eq!(non_retryable_status(&err), Some(404));
    }
}
