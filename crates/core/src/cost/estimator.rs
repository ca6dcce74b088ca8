//! Cost estimate of a finished job.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::job::keys::parse_timing_key;
use crate::job::{ChunkTiming, FrameRange};

use super::config::PricingConfig;
use super::error::CostError;
use super::pricing::{LambdaPricing, PricingTable};

/// Number of chunks reported by [`most_expensive_chunks`] in summaries.
pub const MOST_EXPENSIVE_CHUNKS: usize = 5;

const DISCLAIMER: &str =
    "Estimated cost for worker invocations only. Does not include storage and data transfer.";

/// Estimated cost of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub billed_duration_ms: u64,
    pub currency: String,
    pub amount: f64,
    pub display: String,
    pub disclaimer: String,
}

/// A chunk ranked by render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensiveChunk {
    pub chunk_index: usize,
    pub frame_range: FrameRange,
    pub time_in_ms: u64,
}

/// Turns chunk timings into a price.
pub struct CostEstimator {
    pricing: Arc<dyn PricingTable>,
    config: PricingConfig,
}

impl CostEstimator {
    pub fn new(pricing: Arc<dyn PricingTable>, config: PricingConfig) -> Self {
        Self { pricing, config }
    }

    /// Estimator backed by the built-in price list.
    pub fn lambda(config: PricingConfig) -> Self {
        Self::new(Arc::new(LambdaPricing::new()), config)
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Sum of per-chunk durations, each plus the invocation overhead.
    ///
    /// A job that reported no timing is billed as one zero-length
    /// invocation.
    pub fn billed_duration_ms(&self, timings: &[ChunkTiming]) -> u64 {
        if timings.is_empty() {
            return self.config.overhead_ms;
        }
        timings
            .iter()
            .map(|t| t.duration_ms().saturating_add(self.config.overhead_ms))
            .fold(0u64, u64::saturating_add)
    }

    /// Estimates the cost of `timings` billed across `invocations` calls.
    pub fn estimate(
        &self,
        timings: &[ChunkTiming],
        invocations: usize,
    ) -> Result<CostEstimate, CostError> {
        let billed_duration_ms = self.billed_duration_ms(timings);
        let compute = self.pricing.lookup(
            &self.config.region,
            self.config.memory_size_mb,
            billed_duration_ms,
            self.config.disk_size_mb,
        )?;
        let requests = self.pricing.request_price(&self.config.region)? * invocations as f64;
        let amount = round_cost(compute + requests);

        Ok(CostEstimate {
            billed_duration_ms,
            currency: self.pricing.currency().to_string(),
            amount,
            display: format!("${:.5}", amount),
            disclaimer: DISCLAIMER.to_string(),
        })
    }

    /// Estimates from a storage listing alone.
    pub fn estimate_from_keys(
        &self,
        keys: &[String],
        invocations: usize,
    ) -> Result<CostEstimate, CostError> {
        self.estimate(&timings_from_keys(keys), invocations)
    }
}

fn round_cost(amount: f64) -> f64 {
    (amount * 100_000.0).round() / 100_000.0
}

/// Recovers timing markers from object keys, skipping foreign keys.
pub fn timings_from_keys(keys: &[String]) -> Vec<ChunkTiming> {
    let mut timings: Vec<ChunkTiming> = keys.iter().filter_map(|k| parse_timing_key(k)).collect();
    timings.sort_by_key(|t| (t.chunk_index, t.attempt));
    timings
}

/// Wall-clock span from the first chunk start to the last chunk end.
pub fn chunk_render_span_ms(timings: &[ChunkTiming]) -> Option<u64> {
    let start = timings.iter().map(|t| t.start_ms).min()?;
    let end = timings.iter().map(|t| t.end_ms).max()?;
    Some(end.saturating_sub(start).max(0) as u64)
}

/// The `n` slowest chunks, slowest first. Only the latest attempt of each
/// chunk counts.
pub fn most_expensive_chunks(
    timings: &[ChunkTiming],
    frames_per_chunk: u64,
    total_frames: u64,
    n: usize,
) -> Vec<ExpensiveChunk> {
    let mut latest: BTreeMap<usize, &ChunkTiming> = BTreeMap::new();
    for timing in timings {
        let entry = latest.entry(timing.chunk_index).or_insert(timing);
        if timing.attempt > entry.attempt {
            *entry = timing;
        }
    }

    let mut chunks: Vec<ExpensiveChunk> = latest
        .into_values()
        .map(|t| {
            let start = t.chunk_index as u64 * frames_per_chunk;
            ExpensiveChunk {
                chunk_index: t.chunk_index,
                frame_range: FrameRange::new(start, (start + frames_per_chunk).min(total_frames)),
                time_in_ms: t.duration_ms(),
            }
        })
        .collect();
    chunks.sort_by(|a, b| {
        b.time_in_ms
            .cmp(&a.time_in_ms)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    chunks.truncate(n);
    chunks
}
