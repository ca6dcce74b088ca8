//! Chunk planning.
//!
//! Splits a job's frames into contiguous, non-overlapping chunks that
//! partition `[0, total_frames)`. The chunk count never exceeds the
//! platform's concurrent-invocation ceiling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{ChunkJob, FrameRange, JobType};

/// Planner defaults applied when a request leaves them open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Target chunk count when the request sets neither concurrency nor
    /// frames per chunk.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Frame multiple every chunk boundary must fall on.
    #[serde(default)]
    pub alignment: Option<u64>,
}

fn default_concurrency() -> usize {
    32
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            alignment: None,
        }
    }
}

/// Errors produced while planning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

impl PlanError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRange(reason.into())
    }
}

/// Input to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub job_id: String,
    pub job_type: JobType,
    pub total_frames: u64,
    /// Target number of parallel workers.
    pub concurrency: usize,
    /// Explicit chunk size; computed from `concurrency` when absent.
    pub frames_per_chunk: Option<u64>,
    /// Chunk boundaries must fall on multiples of this (GOP or seamless
    /// audio frame boundary).
    pub alignment: Option<u64>,
    /// Platform-imposed ceiling on concurrent invocations.
    pub max_chunks: usize,
    /// Frame rendered by a still job.
    pub still_frame: u64,
}

/// Ordered chunk list plus the chunk size that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub frames_per_chunk: u64,
    pub jobs: Vec<ChunkJob>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Plans the chunks of a job.
pub fn plan_chunks(request: &PlanRequest) -> Result<ChunkPlan, PlanError> {
    if request.job_type == JobType::Still {
        let end = request
            .still_frame
            .checked_add(1)
            .ok_or_else(|| PlanError::invalid("still frame is out of range"))?;
        return Ok(ChunkPlan {
            frames_per_chunk: 1,
            jobs: vec![ChunkJob {
                job_id: request.job_id.clone(),
                chunk_index: 0,
                frame_range: FrameRange::new(request.still_frame, end),
                attempt: 1,
            }],
        });
    }

    let total = request.total_frames;
    if total == 0 {
        return Err(PlanError::invalid("total frame count must be positive"));
    }
    if request.max_chunks == 0 {
        return Err(PlanError::invalid("invocation ceiling must be positive"));
    }
    if request.alignment == Some(0) {
        return Err(PlanError::invalid("alignment must be positive"));
    }

    let frames_per_chunk = match request.frames_per_chunk {
        Some(0) => return Err(PlanError::invalid("frames per chunk must be positive")),
        Some(fpc) => {
            if let Some(align) = request.alignment {
                if fpc % align != 0 && fpc < total {
                    return Err(PlanError::invalid(format!(
                        "frames per chunk {} splits a {}-frame boundary",
                        fpc, align
                    )));
                }
            }
            fpc
        }
        None => {
            if request.concurrency == 0 {
                return Err(PlanError::invalid("concurrency must be positive"));
            }
            let concurrency = request.concurrency.min(request.max_chunks) as u64;
            let fpc = total.div_ceil(concurrency);
            match request.alignment {
                Some(align) => fpc.div_ceil(align) * align,
                None => fpc,
            }
        }
    };

    let chunk_count = total.div_ceil(frames_per_chunk);
    if chunk_count > request.max_chunks as u64 {
        return Err(PlanError::invalid(format!(
            "{} chunks of {} frames exceed the ceiling of {} invocations",
            chunk_count, frames_per_chunk, request.max_chunks
        )));
    }

    let jobs = (0..chunk_count)
        .map(|index| {
            let start = index * frames_per_chunk;
            let end = (start + frames_per_chunk).min(total);
            ChunkJob {
                job_id: request.job_id.clone(),
                chunk_index: index as usize,
                frame_range: FrameRange::new(start, end),
                attempt: 1,
            }
        })
        .collect();

    Ok(ChunkPlan {
        frames_per_chunk,
        jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(total_frames: u64, concurrency: usize) -> PlanRequest {
        PlanRequest {
            job_id: "job-1".to_string(),
            job_type: JobType::Video,
            total_frames,
            concurrency,
            frames_per_chunk: None,
            alignment: None,
            max_chunks: 200,
            still_frame: 0,
        }
    }

    fn assert_partition(plan: &ChunkPlan, total: u64) {
        let mut next = 0;
        for (i, job) in plan.jobs.iter().enumerate() {
            assert_eq!(job.chunk_index, i);
            assert_eq!(job.frame_range.start, next);
            assert!(job.frame_range.end > job.frame_range.start);
            next = job.frame_range.end;
        }
        assert_eq!(next, total);
    }

    #[test]
    fn test_explicit_frames_per_chunk() {
        let mut request = video(100, 3);
        request.frames_per_chunk = Some(34);
        let plan = plan_chunks(&request).unwrap();
        let ranges: Vec<_> = plan
            .jobs
            .iter()
            .map(|j| (j.frame_range.start, j.frame_range.end))
            .collect();
        assert_eq!(ranges, vec![(0, 34), (34, 68), (68, 100)]);
        assert!(plan.jobs.iter().all(|j| j.attempt == 1));
    }

    #[test]
    fn test_partition_property() {
        for total in [1u64, 2, 7, 99, 100, 101, 1000, 4321] {
            for concurrency in [1usize, 2, 3, 7, 16, 150, 500] {
                let plan = plan_chunks(&video(total, concurrency)).unwrap();
                assert_partition(&plan, total);
                assert!(plan.len() <= 200);
            }
        }
    }

    #[test]
    fn test_zero_frames_rejected() {
        assert!(matches!(
            plan_chunks(&video(0, 4)),
            Err(PlanError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_ceiling_exceeded() {
        let mut request = video(1000, 4);
        request.frames_per_chunk = Some(1);
        request.max_chunks = 10;
        assert!(matches!(
            plan_chunks(&request),
            Err(PlanError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_alignment_rounds_auto_chunk_size() {
        let mut request = video(1000, 3);
        request.alignment = Some(48);
        let plan = plan_chunks(&request).unwrap();
        assert_eq!(plan.frames_per_chunk % 48, 0);
        assert_partition(&plan, 1000);
    }

    #[test]
    fn test_alignment_rejects_splitting_chunk_size() {
        let mut request = video(1000, 3);
        request.alignment = Some(48);
        request.frames_per_chunk = Some(50);
        assert!(plan_chunks(&request).is_err());
    }

    #[test]
    fn test_still_is_single_chunk() {
        let mut request = video(0, 8);
        request.job_type = JobType::Still;
        request.still_frame = 42;
        let plan = plan_chunks(&request).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.jobs[0].frame_range, FrameRange::new(42, 43));
    }

    #[test]
    fn test_still_frame_at_upper_bound_rejected() {
        let mut request = video(0, 8);
        request.job_type = JobType::Still;
        request.still_frame = u64::MAX;
        assert!(matches!(
            plan_chunks(&request),
            Err(PlanError::InvalidRange(_))
        ));
    }
}
