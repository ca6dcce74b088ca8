//! Render job data model.
//!
//! - `types`: job descriptors, chunk units and per-attempt outcomes
//! - `keys`: object key layout shared by coordinator and workers
//! - `validate`: request checks run before any dispatch

pub mod keys;
mod types;
mod validate;

pub use keys::StreamKind;
pub use types::{
    ArtifactRefs, AudioCodec, ChunkJob, ChunkResult, ChunkStatus, ChunkTiming, Codec, DeleteAfter,
    FailureRecord, FrameRange, JobType, Privacy, RenderMetadata, RenderRequest, RetryRecord,
};
pub use validate::{validate_request, ValidationError};
