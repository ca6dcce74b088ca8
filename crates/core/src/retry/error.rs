//! Errors returned by a single chunk attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Disk state captured when a worker runs out of space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmpDirState {
    /// Bytes in use on the worker's scratch volume.
    pub used_bytes: u64,
    /// Largest files present at the time of failure.
    pub largest_files: Vec<(String, u64)>,
}

/// Failure of one chunk attempt.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerError {
    /// Infrastructure noise: process crash, transport reset, target closed.
    #[error("flaky worker error: {message}")]
    Flaky { message: String },

    /// The invocation did not return within its per-attempt deadline.
    #[error("worker invocation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The worker rejected the chunk as malformed.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Worker and caller were built from incompatible releases.
    #[error("version mismatch: worker is {worker}, caller is {caller}")]
    VersionMismatch { worker: String, caller: String },

    /// The worker is misconfigured and no attempt can succeed.
    #[error("fatal configuration error: {message}")]
    Fatal { message: String },

    /// The chunk failed for a reason not otherwise classified.
    #[error("worker failed: {message}")]
    Failure {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },

    /// The worker's scratch disk filled up.
    #[error("worker ran out of disk space: {message}")]
    StorageExhaustion {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tmp_dir: Option<TmpDirState>,
    },

    /// The attempt was interrupted by job cancellation.
    #[error("worker invocation cancelled")]
    Cancelled,
}

impl WorkerError {
    /// Creates an unclassified failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            stack: None,
        }
    }

    /// Creates a flaky error.
    pub fn flaky(message: impl Into<String>) -> Self {
        Self::Flaky {
            message: message.into(),
        }
    }

    /// Builds an error from a free-form worker message, promoting
    /// out-of-space messages to `StorageExhaustion`.
    pub fn from_message(message: impl Into<String>, stack: Option<String>) -> Self {
        let message = message.into();
        let haystack = format!("{}\n{}", message, stack.as_deref().unwrap_or_default());
        if haystack.contains("ENOSPC") || haystack.contains("No space left on device") {
            return Self::StorageExhaustion {
                message,
                tmp_dir: None,
            };
        }
        Self::Failure { message, stack }
    }

    /// The stack trace reported by the worker, if any.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Failure { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message_detects_disk_full() {
        let err = WorkerError::from_message("write failed", Some("Error: ENOSPC at fs.write".into()));
        assert!(matches!(err, WorkerError::StorageExhaustion { .. }));

        let err = WorkerError::from_message("No space left on device", None);
        assert!(matches!(err, WorkerError::StorageExhaustion { .. }));
    }

    #[test]
    fn test_from_message_plain_failure() {
        let err = WorkerError::from_message("frame 12 threw", Some("at render".into()));
        assert_eq!(err.stack(), Some("at render"));
        assert_eq!(err.to_string(), "worker failed: frame 12 threw");
    }

    #[test]
    fn test_error_serialization_is_tagged() {
        let err = WorkerError::VersionMismatch {
            worker: "1.2.0".to_string(),
            caller: "1.3.0".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "version_mismatch");
        let parsed: WorkerError = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, err);
    }
}
