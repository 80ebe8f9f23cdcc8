//! Classification of HTTP failures into user-facing messages.

use reqwest::StatusCode;

/// An HTTP response that cannot yield the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpStatusError {
    /// HTTP 401
    AuthenticationFailed,
    /// HTTP 403 (or 429) mentioning a rate limit
    RateLimitExceeded,
    /// HTTP 403
    Forbidden,
    /// HTTP 404
    NotFound,
    /// Other 4xx
    ClientError(u16),
    /// 5xx
    ServerError(u16),
}

impl std::fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpStatusError::AuthenticationFailed => write!(
                f,
                "Authentication failed (HTTP 401). Check your GITHUB_TOKEN."
            ),
            HttpStatusError::RateLimitExceeded => write!(
                f,
                "Rate limit exceeded. Try again later or set GITHUB_TOKEN environment variable."
            ),
            HttpStatusError::Forbidden => {
                write!(f, "Access forbidden (HTTP 403). You may need authentication.")
            }
            HttpStatusError::NotFound => write!(f, "Not found (HTTP 404)"),
            HttpStatusError::ClientError(code) => write!(f, "Request error (HTTP {})", code),
            HttpStatusError::ServerError(code) => write!(f, "Server error (HTTP {})", code),
        }
    }
}

impl std::error::Error for HttpStatusError {}

/// Map a status code to a failure. `None` for success and redirects.
pub fn classify_status(status: StatusCode, body_hint: &str) -> Option<HttpStatusError> {
    let rate_limited = body_hint.to_ascii_lowercase().contains("rate limit");
    match status {
        StatusCode::UNAUTHORIZED => Some(HttpStatusError::AuthenticationFailed),
        StatusCode::FORBIDDEN if rate_limited => Some(HttpStatusError::RateLimitExceeded),
        StatusCode::FORBIDDEN => Some(HttpStatusError::Forbidden),
        StatusCode::TOO_MANY_REQUESTS => Some(HttpStatusError::RateLimitExceeded),
        StatusCode::NOT_FOUND => Some(HttpStatusError::NotFound),
        s if s.is_client_error() => Some(HttpStatusError::ClientError(s.as_u16())),
        s if s.is_server_error() => Some(HttpStatusError::ServerError(s.as_u16())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK, ""), None);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            Some(HttpStatusError::AuthenticationFailed)
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "API rate limit exceeded for 1.2.3.4"),
            Some(HttpStatusError::RateLimitExceeded)
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, ""),
            Some(HttpStatusError::Forbidden)
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Some(HttpStatusError::RateLimitExceeded)
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, ""),
            Some(HttpStatusError::NotFound)
        );
        assert_eq!(
            classify_status(StatusCode::GONE, ""),
            Some(HttpStatusError::ClientError(410))
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            Some(HttpStatusError::ServerError(502))
        );
    }

    #[test]
    fn test_display_mentions_token_where_it_helps() {
        assert!(
            HttpStatusError::AuthenticationFailed
                .to_string()
                .contains("GITHUB_TOKEN")
        );
        assert!(
            HttpStatusError::RateLimitExceeded
                .to_string()
                .contains("GITHUB_TOKEN")
        );
        assert_eq!(HttpStatusError::NotFound.to_string(), "Not found (HTTP 404)");
    }
}
