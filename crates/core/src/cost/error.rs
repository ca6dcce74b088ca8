//! Error types for cost estimation.

use thiserror::Error;

/// Errors that can occur while estimating cost.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CostError {
    /// No price is known for the region.
    #[error("No pricing for region: {region}")]
    UnknownRegion { region: String },

    /// Memory size outside the billable range.
    #[error("Memory size {memory_mb} MB outside 128..=10240")]
    InvalidMemory { memory_mb: u32 },

    /// Disk size outside the billable range.
    #[error("Disk size {disk_mb} MB outside 512..=10240")]
    InvalidDisk { disk_mb: u32 },
}
