//! Comprehensive error handling for the Collectarr worker
//!
//! This module provides a unified error type hierarchy using thiserror
//! for background job processing, with specific variants for each job type.

use thiserror::Error;

use collectarr_plex_client::PlexError;

/// Main worker error type with comprehensive error variants
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== Job Processing Errors ==========
    /// Job data could not be parsed
    #[error("invalid job data: {0}")]
    InvalidJobData(String),

    /// Invalid job payload (missing or malformed fields)
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Job execution was cancelled (e.g., due to shutdown)
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// Job failed after maximum retry attempts
    #[error("operation '{operation}' failed after {attempts} attempts: {reason}")]
    MaxRetriesExceeded {
        operation: String,
        attempts: u32,
        reason: String,
    },

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database connection pool exhausted
    #[error("database connection unavailable")]
    DatabaseUnavailable,

    // ========== Redis/Queue Errors ==========
    /// Redis operation failed
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Queue operation failed
    #[error("queue error: {0}")]
    Queue(String),

    /// Failed to deserialize job from queue
    #[error("job deserialization failed: {0}")]
    JobDeserialization(#[from] serde_json::Error),

    // ========== HTTP/External Service Errors ==========
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// External service timeout
    #[error("external service timeout: {service}")]
    ServiceTimeout { service: String },

    /// External service returned error
    #[error("external service error from {service}: {message}")]
    ServiceError { service: String, message: String },

    // ========== Media Server Errors ==========
    /// Plex is not configured
    #[error("Plex integration not configured")]
    PlexNotConfigured,

    /// Plex API error
    #[error("Plex API error: {status_code} - {message}")]
    PlexApi { status_code: u16, message: String },

    /// Plex is unreachable
    #[error("Plex unreachable: {0}")]
    PlexUnreachable(String),

    /// Plex returned a response the worker cannot interpret
    #[error("malformed Plex response: {0}")]
    PlexMalformedResponse(String),

    // ========== Collection Resync Errors ==========
    /// The resync lock is held by another executor
    #[error("resync lock held until {until}")]
    LockHeld { until: String },

    /// Persisted working state could not be parsed
    #[error("corrupt resync state: {0}")]
    StateCorrupted(String),

    /// Finalization found items that have not completed
    #[error("pending items remain, first offender: {0}")]
    PendingItemsRemain(String),

    /// A rebuilt collection could not be found after creation
    #[error("collection '{name}' missing after recreation")]
    RecreatedCollectionMissing { name: String },

    /// A queue item disagrees with its library section
    #[error("queue item '{key}' does not match its section: {reason}")]
    QueueItemMismatch { key: String, reason: String },

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing required configuration
    #[error("missing required configuration: {0}")]
    MissingConfiguration(&'static str),

    // ========== Internal Errors ==========
    /// Internal worker error (catch-all for unexpected errors)
    #[error("internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_)
            | Self::DatabaseUnavailable
            | Self::Redis(_)
            | Self::Queue(_)
            | Self::Http(_)
            | Self::ServiceTimeout { .. }
            | Self::PlexUnreachable(_) => true,
            // Server-side failures may clear; client errors are permanent
            Self::PlexApi { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical errors that should alert operators
            Self::Configuration(_)
            | Self::MissingConfiguration(_)
            | Self::DatabaseUnavailable
            | Self::StateCorrupted(_)
            | Self::PendingItemsRemain(_)
            | Self::RecreatedCollectionMissing { .. }
            | Self::MaxRetriesExceeded { .. } => ErrorSeverity::Critical,

            // Errors that indicate service issues
            Self::Database(_)
            | Self::Redis(_)
            | Self::PlexApi { .. }
            | Self::PlexMalformedResponse(_)
            | Self::Internal(_) => ErrorSeverity::Error,

            // Warnings for expected failures
            Self::ServiceTimeout { .. }
            | Self::Http(_)
            | Self::PlexUnreachable(_)
            | Self::LockHeld { .. }
            | Self::Cancelled(_) => ErrorSeverity::Warning,

            // Info level for normal processing issues
            _ => ErrorSeverity::Info,
        }
    }

    /// Get the job type this error is related to, if applicable
    pub fn job_context(&self) -> Option<&'static str> {
        match self {
            Self::LockHeld { .. }
            | Self::StateCorrupted(_)
            | Self::PendingItemsRemain(_)
            | Self::RecreatedCollectionMissing { .. }
            | Self::QueueItemMismatch { .. } => Some("collection_resync"),
            Self::PlexNotConfigured
            | Self::PlexApi { .. }
            | Self::PlexUnreachable(_)
            | Self::PlexMalformedResponse(_) => Some("plex"),
            _ => None,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        let context = self.job_context().unwrap_or("general");
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Critical worker error"
                );
            }
            ErrorSeverity::Error => {
                tracing::error!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Worker error"
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Worker warning"
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Worker info"
                );
            }
        }
    }

    /// Create a service error
    pub fn service_error(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceError {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a retries-exceeded error
    pub fn retries_exceeded(
        operation: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::MaxRetriesExceeded {
            operation: operation.into(),
            attempts,
            reason: reason.into(),
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

// ========== Conversion Implementations ==========

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        // Try to downcast to WorkerError first
        match err.downcast::<WorkerError>() {
            Ok(worker_err) => worker_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<PlexError> for WorkerError {
    fn from(err: PlexError) -> Self {
        match &err {
            PlexError::ConnectionRefused(url) => {
                Self::PlexUnreachable(format!("connection refused to {}", url))
            }
            PlexError::Timeout(secs) => Self::ServiceTimeout {
                service: format!("Plex ({}s)", secs),
            },
            PlexError::Unauthorized => {
                Self::Configuration("Plex rejected the configured token".to_string())
            }
            PlexError::ApiError { status, body } => Self::PlexApi {
                status_code: *status,
                message: body.clone(),
            },
            PlexError::NotFound(what) => Self::NotFound(what.clone()),
            PlexError::JsonError(e) => Self::PlexMalformedResponse(e.to_string()),
            PlexError::InvalidResponse(msg) => Self::PlexMalformedResponse(msg.clone()),
            PlexError::HttpError(_) => Self::PlexUnreachable(err.to_string()),
        }
    }
}
