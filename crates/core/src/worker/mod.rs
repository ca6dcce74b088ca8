//! Render worker contract.
//!
//! A worker renders one chunk's frame range, writes the resulting segments
//! to the job's storage prefix and reports a [`ChunkResult`]. Invocations
//! must be idempotent: repeating a chunk overwrites the same keys.
//!
//! [`ChunkResult`]: crate::job::ChunkResult

mod config;
mod http;
mod traits;

pub use config::WorkerConfig;
pub use http::{HttpRenderWorker, WorkerErrorBody, WorkerRequest};
pub use traits::{JobContext, RenderWorker};
