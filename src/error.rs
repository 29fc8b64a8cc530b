//! Error types for Solidafy Stage
//!
//! This module defines the error hierarchy for the staging core.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use std::fmt;
use thiserror::Error;

/// Remote storage operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Upload,
    Copy,
    Delete,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOperation::Upload => write!(f, "upload"),
            StorageOperation::Copy => write!(f, "copy"),
            StorageOperation::Delete => write!(f, "delete"),
        }
    }
}

/// The main error type for Solidafy Stage
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Schema & Encoding Errors
    // ============================================================================
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Encoding error{}: {message}", record_suffix(.record_index))]
    Encoding {
        record_index: Option<usize>,
        message: String,
    },

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Storage {operation} failed for key '{key}': {source}")]
    StorageTransfer {
        operation: StorageOperation,
        key: String,
        #[source]
        source: object_store::Error,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

fn record_suffix(index: &Option<usize>) -> String {
    index.map_or_else(String::new, |i| format!(" in record {i}"))
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an encoding error not tied to a record
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            record_index: None,
            message: message.into(),
        }
    }

    /// Create a storage transfer error
    pub fn storage(
        operation: StorageOperation,
        key: impl Into<String>,
        source: object_store::Error,
    ) -> Self {
        Self::StorageTransfer {
            operation,
            key: key.into(),
            source,
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Attach the index of the record being encoded
    #[must_use]
    pub fn at_record(self, index: usize) -> Self {
        match self {
            Self::Encoding { message, .. } => Self::Encoding {
                record_index: Some(index),
                message,
            },
            other => other,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StorageTransfer { source, .. } => is_retryable_store_error(source),
            _ => false,
        }
    }
}

/// Transient storage failures a caller may retry
fn is_retryable_store_error(error: &object_store::Error) -> bool {
    !matches!(
        error,
        object_store::Error::NotFound { .. }
            | object_store::Error::Precondition { .. }
            | object_store::Error::NotImplemented
            | object_store::Error::NotSupported { .. }
            | object_store::Error::InvalidPath { .. }
            | object_store::Error::UnknownConfigurationKey { .. }
            | object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. }
    )
}

/// Result type alias for Solidafy Stage
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> object_store::Error {
        object_store::Error::NotFound {
            path: "stage/users.csv".to_string(),
            source: "missing".into(),
        }
    }

    fn generic() -> object_store::Error {
        object_store::Error::Generic {
            store: "S3",
            source: "connection reset".into(),
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("bucket");
        assert_eq!(err.to_string(), "Missing required config field: bucket");

        let err = Error::schema("duplicate column");
        assert_eq!(err.to_string(), "Schema error: duplicate column");
    }

    #[test]
    fn test_encoding_error_record_index() {
        let err = Error::encoding("bad line");
        assert_eq!(err.to_string(), "Encoding error: bad line");

        let err = err.at_record(7);
        assert_eq!(err.to_string(), "Encoding error in record 7: bad line");
    }

    #[test]
    fn test_at_record_leaves_other_errors() {
        let err = Error::schema("x").at_record(3);
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn test_storage_error_carries_operation_and_key() {
        let err = Error::storage(StorageOperation::Upload, "users_1.csv", generic());
        let text = err.to_string();
        assert!(text.contains("upload"));
        assert!(text.contains("users_1.csv"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::storage(StorageOperation::Upload, "k", generic()).is_retryable());
        assert!(!Error::storage(StorageOperation::Copy, "k", not_found()).is_retryable());
        assert!(!Error::config("test").is_retryable());
        assert!(!Error::encoding("test").is_retryable());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
