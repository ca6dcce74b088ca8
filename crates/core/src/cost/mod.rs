//! Billed-duration cost estimation.
//!
//! Each parallel invocation is billed on its own: the billed duration of a
//! job is the sum of per-chunk durations plus a fixed per-invocation
//! overhead, never the wall-clock span.

mod config;
mod error;
mod estimator;
mod pricing;

pub use config::PricingConfig;
pub use error::CostError;
pub use estimator::{
    chunk_render_span_ms, most_expensive_chunks, timings_from_keys, CostEstimate, CostEstimator,
    ExpensiveChunk, MOST_EXPENSIVE_CHUNKS,
};
pub use pricing::{LambdaPricing, PricingTable, RegionPrice};
