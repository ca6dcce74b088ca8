//! End-to-end render driver.
//!
//! One call to [`RenderOrchestrator::render`] takes a request through
//! validation, planning, dispatch, cost estimation, recombination and
//! cleanup, and leaves a post-render summary next to the output.

mod config;
mod runner;
mod types;

pub use config::{OrchestratorConfig, RenderSettings};
pub use runner::RenderOrchestrator;
pub use types::{JobError, RenderOutcome, RenderSummary};
