//! Unified error hierarchy for zpower
//!
//! Sparse or missing data is never an error in this crate: analysis functions
//! return `None` or an empty collection for that. The types here cover contract
//! violations in the rider payload, configuration problems and exhausted
//! retries in the acquisition layer.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all zpower operations
#[derive(Debug, Error)]
pub enum ZPowerError {
    /// Rider payload does not have the expected shape
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream data did not become available in time
    #[error("Retry exhausted after {attempts} attempts: {reason}")]
    RetryExhausted { attempts: u32, reason: String },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rider payload contract violations
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Document is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A field expected to hold a particular JSON type holds something else
    #[error("Field `{field}` must be {expected}")]
    UnexpectedShape { field: String, expected: String },

    /// Payload file does not exist
    #[error("Payload file not found: {path}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload file exists but could not be read
    #[error("Failed to read payload file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for zpower operations
pub type Result<T> = std::result::Result<T, ZPowerError>;

impl ZPowerError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZPowerError::Io(_)
                | ZPowerError::Payload(PayloadError::FileNotFound { .. })
                | ZPowerError::Payload(PayloadError::Read { .. })
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ZPowerError::Payload(PayloadError::FileNotFound { .. }) => ErrorSeverity::Warning,
            ZPowerError::RetryExhausted { .. } => ErrorSeverity::Warning,
            ZPowerError::Payload(_) => ErrorSeverity::Error,
            ZPowerError::Configuration(_) => ErrorSeverity::Error,
            ZPowerError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ZPowerError::Payload(PayloadError::FileNotFound { path, .. }) => {
                format!("Could not find rider data file: {}", path.display())
            }
            ZPowerError::Payload(PayloadError::Read { path, source }) => {
                format!("Could not read rider data file {}: {}", path.display(), source)
            }
            ZPowerError::Payload(PayloadError::InvalidJson(_)) => {
                "Rider data file is not valid JSON.".to_string()
            }
            ZPowerError::Payload(PayloadError::UnexpectedShape { field, .. }) => {
                format!("Rider data has an unexpected `{}` section.", field)
            }
            ZPowerError::RetryExhausted { attempts, .. } => {
                format!(
                    "Rider data was not available after {} attempts. Please refresh later.",
                    attempts
                )
            }
            _ => self.to_string(),
        }
    }
}

impl PayloadError {
    /// Classify a failed read of a payload file
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            PayloadError::FileNotFound { path, source }
        } else {
            PayloadError::Read { path, source }
        }
    }

    pub(crate) fn shape(field: impl Into<String>, expected: impl Into<String>) -> Self {
        PayloadError::UnexpectedShape {
            field: field.into(),
            expected: expected.into(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_error_severity() {
        let err = ZPowerError::Payload(PayloadError::from_io(
            "/riders/123.json",
            io::Error::from(io::ErrorKind::NotFound),
        ));
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = ZPowerError::Internal("test".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_error_retryable() {
        let err = ZPowerError::Payload(PayloadError::from_io(
            "rider.json",
            io::Error::from(io::ErrorKind::NotFound),
        ));
        assert!(err.is_retryable());

        let err = ZPowerError::Payload(PayloadError::shape("profile", "an array"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = ZPowerError::Payload(PayloadError::shape("events", "an array"));
        assert!(err.user_message().contains("`events`"));

        let err = ZPowerError::RetryExhausted {
            attempts: 3,
            reason: "stale".to_string(),
        };
        assert!(err.user_message().contains("3 attempts"));
    }

    #[test]
    fn test_read_errors_keep_their_source() {
        let denied = PayloadError::from_io(
            "/riders/locked.json",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(denied, PayloadError::Read { .. }));
        assert!(denied.source().is_some());

        let err = ZPowerError::Payload(denied);
        assert!(err.user_message().contains("Could not read"));
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }
}
