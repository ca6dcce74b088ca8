//! Testing utilities and mock implementations.
//!
//! Mocks of every external collaborator, so a whole render can run in
//! process without workers, ffmpeg or a real bucket.
//!
//! # Example
//!
//! ```rust,ignore
//! use chunkrender_core::storage::InMemoryObjectStore;
//! use chunkrender_core::testing::{MockMuxer, MockWorker};
//!
//! let store = Arc::new(InMemoryObjectStore::new());
//! let worker = MockWorker::new(store.clone())
//!     .fail_chunk(1, WorkerError::flaky("Target closed"));
//! let muxer = MockMuxer::new();
//! ```

mod collecting_sink;
mod mock_muxer;
mod mock_worker;

pub use collecting_sink::CollectingSink;
pub use mock_muxer::MockMuxer;
pub use mock_worker::MockWorker;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use chrono::Utc;

    use crate::job::keys::{chunk_key, job_prefix};
    use crate::job::{
        ArtifactRefs, AudioCodec, ChunkResult, ChunkStatus, Codec, JobType, Privacy,
        RenderMetadata, StreamKind,
    };
    use crate::worker::JobContext;

    /// Release string used by fixtures on both sides of the worker call.
    pub const TEST_VERSION: &str = "1.0.0-test";

    /// Metadata of a video job with the given codecs.
    pub fn render_metadata(
        job_id: &str,
        codec: Codec,
        audio_codec: Option<AudioCodec>,
        total_frames: u64,
        frames_per_chunk: u64,
    ) -> RenderMetadata {
        let total_chunks = total_frames.div_ceil(frames_per_chunk) as usize;
        RenderMetadata {
            job_id: job_id.to_string(),
            job_type: JobType::Video,
            total_frames,
            frames_per_chunk,
            total_chunks,
            fps: 30,
            codec: Some(codec),
            audio_codec,
            audio_bitrate: None,
            estimated_total_invocations: total_chunks + 1,
            estimated_render_invocations: total_chunks,
            created_at: Utc::now(),
            delete_after: None,
            privacy: Privacy::Private,
            out_name: None,
            memory_size_mb: 2048,
            region: "us-east-1".to_string(),
            version: TEST_VERSION.to_string(),
        }
    }

    /// Metadata of a silent H.264 job.
    pub fn video_metadata(job_id: &str, total_frames: u64, frames_per_chunk: u64) -> RenderMetadata {
        render_metadata(job_id, Codec::H264, None, total_frames, frames_per_chunk)
    }

    /// Context for invoking workers on `metadata`.
    pub fn job_context(metadata: RenderMetadata) -> JobContext {
        JobContext::new(Arc::new(metadata), TEST_VERSION)
    }

    /// Segment keys a chunk of `metadata` writes.
    pub fn artifact_refs(metadata: &RenderMetadata, chunk_index: usize) -> ArtifactRefs {
        let prefix = job_prefix(&metadata.job_id, metadata.delete_after);
        ArtifactRefs {
            video: metadata
                .has_video()
                .then(|| chunk_key(&prefix, chunk_index, StreamKind::Video)),
            audio: metadata
                .has_audio()
                .then(|| chunk_key(&prefix, chunk_index, StreamKind::Audio)),
        }
    }

    /// A successful first-attempt result for one chunk.
    pub fn chunk_result(
        metadata: &RenderMetadata,
        chunk_index: usize,
        frames_rendered: u64,
    ) -> ChunkResult {
        let now = Utc::now();
        ChunkResult {
            chunk_index,
            attempt: 1,
            status: ChunkStatus::Success,
            frames_rendered,
            started_at: now,
            ended_at: now,
            artifacts: artifact_refs(metadata, chunk_index),
            error: None,
        }
    }
}
