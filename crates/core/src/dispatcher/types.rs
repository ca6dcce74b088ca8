//! Dispatcher result and error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{ChunkResult, RetryRecord};
use crate::retry::{ErrorClass, TmpDirState, WorkerError};

/// Successful dispatch of every chunk.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// One successful result per chunk, in chunk-index order.
    pub results: Vec<ChunkResult>,
    /// Chunks that needed at least one retry, in chunk-index order.
    pub retries: Vec<RetryRecord>,
}

/// Dispatch did not produce a full result set.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A chunk failed with no retry left. Siblings were cancelled and
    /// completed results discarded.
    #[error("chunk {chunk_index} aborted after attempt {attempt}: {source}")]
    ChunkAborted {
        chunk_index: usize,
        attempt: u32,
        #[source]
        source: WorkerError,
        retries: Vec<RetryRecord>,
    },

    /// The job's cancellation signal fired.
    #[error("dispatch cancelled")]
    Cancelled { retries: Vec<RetryRecord> },
}

impl DispatchError {
    /// Retry history gathered before dispatch stopped.
    pub fn retries(&self) -> &[RetryRecord] {
        match self {
            Self::ChunkAborted { retries, .. } | Self::Cancelled { retries } => retries,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Diagnostic object persisted for every failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub job_id: String,
    pub chunk_index: usize,
    pub attempt: u32,
    pub class: ErrorClass,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmp_dir: Option<TmpDirState>,
    pub will_retry: bool,
    pub worker: String,
    pub timestamp: DateTime<Utc>,
}
