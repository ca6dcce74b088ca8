//! Orchestrator configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cleanup::CleanupConfig;
use crate::combiner::CombinerConfig;
use crate::cost::PricingConfig;
use crate::dispatcher::DispatcherConfig;
use crate::planner::PlannerConfig;

/// Configuration of the job driver itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Local directory the combined output is written to before upload.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Capacity of each job's progress channel.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("chunkrender-output")
}

fn default_progress_buffer() -> usize {
    1024
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            progress_buffer: default_progress_buffer(),
        }
    }
}

/// Every component setting a render needs.
#[derive(Debug, Clone, Default)]
pub struct RenderSettings {
    pub orchestrator: OrchestratorConfig,
    pub planner: PlannerConfig,
    pub dispatcher: DispatcherConfig,
    pub pricing: PricingConfig,
    pub combiner: CombinerConfig,
    pub cleanup: CleanupConfig,
}

impl RenderSettings {
    /// Places every local scratch directory under `root`.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.orchestrator.output_dir = root.join("output");
        self.combiner.temp_dir = root.join("combine");
        self
    }

    /// Sets the dispatcher retry delay.
    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.dispatcher.retry_delay_ms = delay_ms;
        self
    }
}
