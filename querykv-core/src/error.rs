//! Error types for QueryKV operations

use thiserror::Error;

/// Failures raised by a key-value store adapter.
///
/// These are always cache-layer failures: the interception layer recovers
/// from them locally and never surfaces them to the caller of a query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    pub fn serialization(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the cache layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryKvError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for store adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for QueryKV operations.
pub type QueryKvResult<T> = Result<T, QueryKvError>;

// =============================================================================
// TESTS
// =============================================================================
