//! Error types for the Plex client

use thiserror::Error;

/// Errors that can occur when interacting with the Plex server
#[derive(Error, Debug)]
pub enum PlexError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to serialize/deserialize JSON
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Plex API returned an error status
    #[error("Plex API error: {status} - {body}")]
    ApiError { status: u16, body: String },

    /// Requested entity does not exist on the server
    #[error("not found: {0}")]
    NotFound(String),

    /// Token was rejected by the server
    #[error("unauthorized: Plex rejected the token")]
    Unauthorized,

    /// Request timeout
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection refused (Plex not reachable)
    #[error("connection refused. Is Plex running at {0}?")]
    ConnectionRefused(String),

    /// Response did not match the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl PlexError {
    /// Check if this error is retryable (transient)
    ///
    /// Server errors (5xx), timeouts and connection failures may succeed on a
    /// later attempt; client errors (4xx) are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlexError::Timeout(_) | PlexError::ConnectionRefused(_) | PlexError::HttpError(_) => {
                true
            }
            PlexError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for Plex operations
pub type PlexResult<T> = Result<T, PlexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        let err = PlexError::ApiError {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert!(err.is_retryable());
        assert!(PlexError::Timeout(30).is_retryable());
        assert!(PlexError::ConnectionRefused("http://plex:32400".to_string()).is_retryable());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let err = PlexError::ApiError {
            status: 400,
            body: "bad request".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(!PlexError::Unauthorized.is_retryable());
        assert!(!PlexError::NotFound("collection 5".to_string()).is_retryable());
    }
}
