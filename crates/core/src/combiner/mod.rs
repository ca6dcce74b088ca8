//! Recombination of per-chunk segments into the final output.
//!
//! Audio and video are concatenated independently in chunk-index order,
//! then muxed when both exist. Streams marked seamless skip the concat step
//! and reach the muxer as a single virtual input.

mod combiner;
mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use combiner::ArtifactCombiner;
pub use config::CombinerConfig;
pub use error::CombineError;
pub use ffmpeg::FfmpegMuxer;
pub use traits::MediaMuxer;
pub use types::{
    CombineContext, CombinePart, CombineResult, CombineSpec, ConcatRequest, MuxProgress,
    MuxRequest, StreamInput, StreamSegments,
};
