//! Configuration for cost estimation.

use serde::{Deserialize, Serialize};

/// Pricing inputs fixed for the whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Pricing region of the workers.
    #[serde(default = "default_region")]
    pub region: String,

    /// Memory of each worker in MB.
    #[serde(default = "default_memory_size_mb")]
    pub memory_size_mb: u32,

    /// Ephemeral disk of each worker in MB.
    #[serde(default = "default_disk_size_mb")]
    pub disk_size_mb: u32,

    /// Fixed overhead added to every invocation's billed duration.
    #[serde(default = "default_overhead_ms")]
    pub overhead_ms: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_memory_size_mb() -> u32 {
    2048
}

fn default_disk_size_mb() -> u32 {
    10240
}

fn default_overhead_ms() -> u64 {
    100
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            memory_size_mb: default_memory_size_mb(),
            disk_size_mb: default_disk_size_mb(),
            overhead_ms: default_overhead_ms(),
        }
    }
}

impl PricingConfig {
    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets the worker memory size.
    pub fn with_memory_size_mb(mut self, memory_size_mb: u32) -> Self {
        self.memory_size_mb = memory_size_mb;
        self
    }
}
