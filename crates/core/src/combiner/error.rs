//! Error types for the combiner module.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that abort a combine.
#[derive(Debug, Error)]
pub enum CombineError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// The job produced neither audio nor video segments.
    #[error("Nothing to combine: no audio or video segments")]
    NoStreams,

    /// A chunk is missing the segment of a stream other chunks produced.
    #[error("Chunk {chunk_index} has no {stream} segment")]
    MissingSegment { chunk_index: usize, stream: String },

    /// An ffmpeg run failed.
    #[error("Mux failed: {reason}")]
    MuxFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// An ffmpeg run timed out.
    #[error("Mux timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The muxer reported success but wrote nothing.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// Segment download failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error during combine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CombineError {
    /// Creates a new mux failed error with stderr output.
    pub fn mux_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::MuxFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}
