use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Upstream failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<UpstreamError>,
    },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl UpstreamError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            404 => UpstreamError::NotFound(truncated),
            429 => UpstreamError::RateLimited,
            500..=599 => UpstreamError::Server(truncated),
            _ => UpstreamError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_decode() {
            UpstreamError::InvalidResponse(e.to_string())
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert_eq!(
            UpstreamError::from_status(StatusCode::NOT_FOUND, "missing"),
            UpstreamError::NotFound("missing".to_string())
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            UpstreamError::RateLimited
        );
        assert!(matches!(
            UpstreamError::from_status(StatusCode::BAD_GATEWAY, "down"),
            UpstreamError::Server(_)
        ));
        assert!(matches!(
            UpstreamError::from_status(StatusCode::FORBIDDEN, "no"),
            UpstreamError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match UpstreamError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            UpstreamError::Server(msg) => {
                assert!(msg.len() < 600);
                assert!(msg.contains("2000 total bytes"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_display_includes_last_error() {
        let err = UpstreamError::Exhausted {
            attempts: 4,
            last: Box::new(UpstreamError::Timeout),
        };
        assert_eq!(err.to_string(), "Upstream failed after 4 attempts: Request timed out");
    }
}
