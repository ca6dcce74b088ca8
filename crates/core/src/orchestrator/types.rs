//! Types for the render orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cleanup::CleanupError;
use crate::combiner::CombineError;
use crate::cost::{CostError, CostEstimate, ExpensiveChunk};
use crate::dispatcher::{DispatchError, ErrorReport};
use crate::job::{DeleteAfter, RetryRecord, ValidationError};
use crate::planner::PlanError;
use crate::progress::ProgressSnapshot;
use crate::retry::WorkerError;
use crate::storage::StorageError;

/// Job-level failure.
#[derive(Debug, Error)]
pub enum JobError {
    /// The request was rejected before any dispatch.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// No chunk plan fits the request.
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    /// A chunk ran out of retries.
    #[error("chunk {chunk_index} failed after {attempt} attempts: {source}")]
    ChunkFailed {
        chunk_index: usize,
        attempt: u32,
        #[source]
        source: WorkerError,
        retries: Vec<RetryRecord>,
    },

    /// The job's cancellation signal fired.
    #[error("render cancelled")]
    Cancelled { retries: Vec<RetryRecord> },

    #[error("combine failed: {0}")]
    Combine(#[from] CombineError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cost estimation failed: {0}")]
    Cost(#[from] CostError),
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Retry history gathered before the job stopped.
    pub fn retries(&self) -> &[RetryRecord] {
        match self {
            Self::ChunkFailed { retries, .. } | Self::Cancelled { retries } => retries,
            _ => &[],
        }
    }

    /// Stack trace of the originating worker error, if any.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::ChunkFailed { source, .. } => source.stack(),
            _ => None,
        }
    }

    /// Label used for the job outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Plan(_) => "invalid",
            Self::Cancelled { .. } => "cancelled",
            _ => "failed",
        }
    }
}

impl From<DispatchError> for JobError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ChunkAborted {
                chunk_index,
                attempt,
                source,
                retries,
            } => Self::ChunkFailed {
                chunk_index,
                attempt,
                source,
                retries,
            },
            DispatchError::Cancelled { retries } => Self::Cancelled { retries },
        }
    }
}

impl From<CleanupError> for JobError {
    fn from(err: CleanupError) -> Self {
        match err {
            CleanupError::Storage(e) => Self::Storage(e),
        }
    }
}

/// Post-render data persisted next to the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub job_id: String,
    pub cost: CostEstimate,
    pub output_key: String,
    pub output_size: u64,
    /// Bytes of every job object before cleanup.
    pub render_size: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub time_to_finish_ms: u64,
    /// Span from the first chunk start to the last chunk end.
    pub time_to_render_chunks_ms: u64,
    pub time_to_combine_ms: u64,
    pub time_to_cleanup_ms: u64,
    pub estimated_billing_duration_ms: u64,
    pub retries: Vec<RetryRecord>,
    pub errors: Vec<ErrorReport>,
    pub most_expensive_chunks: Vec<ExpensiveChunk>,
    pub files_cleaned_up: usize,
    pub delete_after: Option<DeleteAfter>,
}

/// Successful render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub job_id: String,
    pub summary: RenderSummary,
    /// Progress after the last event of the job.
    pub progress: ProgressSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_conversion() {
        let err: JobError = DispatchError::ChunkAborted {
            chunk_index: 2,
            attempt: 2,
            source: WorkerError::Failure {
                message: "boom".into(),
                stack: Some("at frame 80".into()),
            },
            retries: vec![RetryRecord::new(2)],
        }
        .into();

        assert!(matches!(err, JobError::ChunkFailed { chunk_index: 2, .. }));
        assert_eq!(err.retries().len(), 1);
        assert_eq!(err.stack(), Some("at frame 80"));
        assert_eq!(err.outcome(), "failed");
        assert_eq!(
            err.to_string(),
            "chunk 2 failed after 2 attempts: worker failed: boom"
        );
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let err: JobError = DispatchError::Cancelled { retries: vec![] }.into();
        assert!(err.is_cancelled());
        assert_eq!(err.outcome(), "cancelled");
        assert!(!JobError::Combine(CombineError::NoStreams).is_cancelled());
    }
}
