use serde::{Deserialize, Serialize};

use crate::retry::ErrorClass;

/// A state transition reported by a worker or pipeline stage.
///
/// Frame and file counters are cumulative, not deltas, so duplicated or
/// reordered delivery never inflates the totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    Planned {
        total_chunks: usize,
        total_frames: u64,
    },
    Invoked {
        chunk_index: usize,
        attempt: u32,
    },
    Rendering {
        chunk_index: usize,
        frames_rendered: u64,
    },
    ChunkDone {
        chunk_index: usize,
        frames_rendered: u64,
    },
    ChunkRetrying {
        chunk_index: usize,
        attempt: u32,
        class: ErrorClass,
    },
    ChunkFailed {
        chunk_index: usize,
        attempt: u32,
        message: String,
    },
    RenderDone {
        elapsed_ms: u64,
    },
    Combining {
        total_frames: u64,
    },
    Encoding {
        frames_encoded: u64,
    },
    CombineDone {
        elapsed_ms: u64,
    },
    CleanupStarted {
        min_files_to_delete: u64,
    },
    CleanupProgress {
        files_deleted: u64,
    },
    CleanupDone {
        files_deleted: u64,
        elapsed_ms: u64,
    },
    CleanupSkipped,
    Download {
        bytes: u64,
        total_bytes: Option<u64>,
    },
    DownloadDone {
        elapsed_ms: u64,
    },
}

impl ProgressEvent {
    /// Chunk the event refers to, if any.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::Invoked { chunk_index, .. }
            | Self::Rendering { chunk_index, .. }
            | Self::ChunkDone { chunk_index, .. }
            | Self::ChunkRetrying { chunk_index, .. }
            | Self::ChunkFailed { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }
}
