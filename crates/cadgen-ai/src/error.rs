//! Error types for cadgen-ai

use thiserror::Error;

/// Result type alias using cadgen-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a chat provider
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider answered with a non-success HTTP status
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    /// Provider reported an error inside the response stream
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid or missing API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Request was cancelled
    #[error("Request aborted")]
    Aborted,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Map an HTTP status and body message to an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            _ => Self::Status { status, message },
        }
    }

    /// The HTTP-equivalent status code, when the error carries one.
    ///
    /// In-stream errors are mapped by type: `rate_limit_error` is 429 and
    /// `overloaded_error` is 529.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::Api { error_type, .. } => {
                let et = error_type.to_lowercase();
                if et.contains("rate_limit") || et.contains("resource_exhausted") {
                    Some(429)
                } else if et.contains("overloaded") {
                    Some(529)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Check if this error is a rate-limit response
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_auth() {
        assert!(matches!(Error::from_status(401, "bad key"), Error::Auth(_)));
        assert!(matches!(Error::from_status(403, "forbidden"), Error::Auth(_)));
    }

    #[test]
    fn test_from_status_keeps_code() {
        let e = Error::from_status(429, "slow down");
        assert_eq!(e.status(), Some(429));
        assert!(e.is_rate_limited());
        assert_eq!(e.to_string(), "API error (429): slow down");
    }

    #[test]
    fn test_api_rate_limit_type_maps_to_429() {
        let e = Error::api("rate_limit_error", "You have exceeded the rate limit");
        assert_eq!(e.status(), Some(429));
    }

    #[test]
    fn test_api_overloaded_maps_to_529() {
        let e = Error::api("overloaded_error", "Overloaded");
        assert_eq!(e.status(), Some(529));
        assert!(!e.is_rate_limited());
    }

    #[test]
    fn test_other_errors_have_no_status() {
        assert_eq!(Error::InvalidApiKey.status(), None);
        assert_eq!(Error::Aborted.status(), None);
        assert_eq!(Error::api("invalid_request_error", "bad").status(), None);
    }
}
