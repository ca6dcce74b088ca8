//! Trait definitions for the worker module.

use std::sync::Arc;

use async_trait::async_trait;

use crate::job::{keys, ChunkJob, ChunkResult, RenderMetadata};
use crate::progress::ProgressHandle;
use crate::retry::WorkerError;

/// Read-only job state shared with every chunk invocation.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub metadata: Arc<RenderMetadata>,
    /// Release of the caller; workers reject a mismatching release.
    pub caller_version: String,
}

impl JobContext {
    pub fn new(metadata: Arc<RenderMetadata>, caller_version: impl Into<String>) -> Self {
        Self {
            metadata,
            caller_version: caller_version.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.metadata.job_id
    }

    /// Storage prefix holding every object of the job.
    pub fn prefix(&self) -> String {
        keys::job_prefix(&self.metadata.job_id, self.metadata.delete_after)
    }
}

/// Renders one chunk.
#[async_trait]
pub trait RenderWorker: Send + Sync {
    /// Returns the name of this worker implementation.
    fn name(&self) -> &str;

    /// Renders `job` and returns its result.
    ///
    /// Intermediate frame counts may be reported through `progress`. The
    /// future may be dropped at any await point when the job is cancelled.
    async fn invoke(
        &self,
        job: &ChunkJob,
        ctx: &JobContext,
        progress: ProgressHandle,
    ) -> Result<ChunkResult, WorkerError>;
}
