//! Error types for the storage module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by an object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key does not exist.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The key cannot be mapped onto the backend.
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Filesystem operation failed.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Object body could not be (de)serialized.
    #[error("Serialization error for {key}: {message}")]
    Serialization { key: String, message: String },
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the operation may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
