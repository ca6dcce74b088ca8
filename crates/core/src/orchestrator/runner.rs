//! Render orchestrator implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cleanup::CleanupCoordinator;
use crate::combiner::{ArtifactCombiner, CombineError, MediaMuxer};
use crate::cost::{
    chunk_render_span_ms, most_expensive_chunks, timings_from_keys, CostEstimator, PricingTable,
    MOST_EXPENSIVE_CHUNKS,
};
use crate::dispatcher::{DispatchOutcome, Dispatcher, ErrorReport};
use crate::job::{keys, validate_request, JobType, RenderMetadata, RenderRequest};
use crate::metrics::{ACTIVE_JOBS, JOBS_TOTAL};
use crate::planner::{plan_chunks, ChunkPlan, PlanRequest};
use crate::progress::{create_progress_channel, ProgressEvent, ProgressHandle, ProgressSink};
use crate::storage::{get_json, put_json, ObjectStore};
use crate::worker::{JobContext, RenderWorker};

use super::config::RenderSettings;
use super::types::{JobError, RenderOutcome, RenderSummary};

/// Drives render jobs from request to uploaded output.
///
/// Holds no per-job state; any number of renders may run concurrently on
/// one orchestrator.
pub struct RenderOrchestrator {
    settings: RenderSettings,
    worker: Arc<dyn RenderWorker>,
    store: Arc<dyn ObjectStore>,
    combiner: ArtifactCombiner,
    cost: CostEstimator,
    cleanup: CleanupCoordinator,
    version: String,
}

/// Keeps the active-jobs gauge honest when a render future is dropped.
struct ActiveJob;

impl ActiveJob {
    fn start() -> Self {
        ACTIVE_JOBS.inc();
        Self
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        ACTIVE_JOBS.dec();
    }
}

impl RenderOrchestrator {
    pub fn new(
        settings: RenderSettings,
        worker: Arc<dyn RenderWorker>,
        muxer: Arc<dyn MediaMuxer>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let combiner = ArtifactCombiner::new(muxer, Arc::clone(&store), settings.combiner.clone());
        let cost = CostEstimator::lambda(settings.pricing.clone());
        let cleanup = CleanupCoordinator::new(Arc::clone(&store), settings.cleanup.clone());
        Self {
            settings,
            worker,
            store,
            combiner,
            cost,
            cleanup,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Replaces the built-in price list.
    pub fn with_pricing(mut self, pricing: Arc<dyn PricingTable>) -> Self {
        self.cost = CostEstimator::new(pricing, self.settings.pricing.clone());
        self
    }

    /// Sets the release reported to workers when a request names none.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Fresh job id.
    pub fn new_job_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Renders `request` under a fresh job id.
    pub async fn render(
        &self,
        request: RenderRequest,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RenderOutcome, JobError> {
        self.render_job(Self::new_job_id(), request, sink, cancel)
            .await
    }

    /// Renders `request` under a caller-chosen job id.
    pub async fn render_job(
        &self,
        job_id: String,
        request: RenderRequest,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RenderOutcome, JobError> {
        let _active = ActiveJob::start();
        let result = self.run(&job_id, request, sink, cancel).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        JOBS_TOTAL.with_label_values(&[outcome]).inc();

        match &result {
            Ok(outcome) => info!(
                job_id = %job_id,
                output = %outcome.summary.output_key,
                cost = %outcome.summary.cost.display,
                "Render finished in {}ms",
                outcome.summary.time_to_finish_ms
            ),
            Err(e) if e.is_cancelled() => warn!(job_id = %job_id, "Render cancelled"),
            Err(e) => error!(job_id = %job_id, error = %e, "Render failed"),
        }
        result
    }

    async fn run(
        &self,
        job_id: &str,
        request: RenderRequest,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RenderOutcome, JobError> {
        let started = Instant::now();
        let start_time = Utc::now();

        validate_request(&request)?;

        let plan = plan_chunks(&PlanRequest {
            job_id: job_id.to_string(),
            job_type: request.job_type,
            total_frames: request.total_frames,
            concurrency: request
                .concurrency
                .unwrap_or(self.settings.planner.default_concurrency),
            frames_per_chunk: request.frames_per_chunk,
            alignment: self.settings.planner.alignment,
            max_chunks: self.settings.dispatcher.max_concurrent_invocations,
            still_frame: request.still_frame,
        })?;

        let (progress, aggregator) =
            create_progress_channel(sink, self.settings.orchestrator.progress_buffer);
        let aggregator = tokio::spawn(aggregator.run());

        let metadata = Arc::new(self.metadata(job_id, &request, &plan, start_time));
        let prefix = keys::job_prefix(job_id, metadata.delete_after);
        progress
            .emit(ProgressEvent::Planned {
                total_chunks: plan.len(),
                total_frames: metadata.total_frames,
            })
            .await;
        info!(
            job_id = %job_id,
            chunks = plan.len(),
            frames_per_chunk = plan.frames_per_chunk,
            "Planned render"
        );

        put_json(
            self.store.as_ref(),
            &keys::metadata_key(&prefix),
            metadata.as_ref(),
        )
        .await?;

        let caller_version = request
            .version
            .clone()
            .unwrap_or_else(|| self.version.clone());
        let ctx = JobContext::new(Arc::clone(&metadata), caller_version);

        let mut dispatcher_config = self.settings.dispatcher.clone();
        if let Some(max_retries) = request.max_retries {
            dispatcher_config.max_retries = max_retries;
        }
        let dispatcher = Dispatcher::new(
            dispatcher_config,
            Arc::clone(&self.worker),
            Arc::clone(&self.store),
        );

        let dispatched = dispatcher
            .dispatch(plan.jobs, &ctx, progress.clone(), cancel.clone())
            .await;
        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(e) => {
                self.cleanup_after_failure(&prefix, request.skip_cleanup, &progress)
                    .await;
                return Err(e.into());
            }
        };
        progress
            .emit(ProgressEvent::RenderDone {
                elapsed_ms: started.elapsed().as_millis() as u64,
            })
            .await;

        let summary = match self
            .complete(&metadata, &prefix, &request, outcome, &progress, &cancel, started)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                self.cleanup_after_failure(&prefix, request.skip_cleanup, &progress)
                    .await;
                return Err(e);
            }
        };

        drop(progress);
        let state = aggregator.await.unwrap_or_default();

        Ok(RenderOutcome {
            job_id: job_id.to_string(),
            summary,
            progress: state.snapshot(),
        })
    }

    fn metadata(
        &self,
        job_id: &str,
        request: &RenderRequest,
        plan: &ChunkPlan,
        created_at: DateTime<Utc>,
    ) -> RenderMetadata {
        let total_frames = match request.job_type {
            JobType::Still => 1,
            JobType::Video => request.total_frames,
        };
        RenderMetadata {
            job_id: job_id.to_string(),
            job_type: request.job_type,
            total_frames,
            frames_per_chunk: plan.frames_per_chunk,
            total_chunks: plan.len(),
            fps: request.fps,
            codec: request.codec,
            audio_codec: request.resolved_audio_codec(),
            audio_bitrate: request.audio_bitrate.clone(),
            estimated_total_invocations: plan.len(),
            estimated_render_invocations: plan.len(),
            created_at,
            delete_after: request.delete_after,
            privacy: request.privacy,
            out_name: request.out_name.clone(),
            memory_size_mb: self.settings.pricing.memory_size_mb,
            region: self.settings.pricing.region.clone(),
            version: self.version.clone(),
        }
    }

    /// Everything after a successful dispatch: cost, combine, upload,
    /// cleanup and the persisted summary.
    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        metadata: &RenderMetadata,
        prefix: &str,
        request: &RenderRequest,
        outcome: DispatchOutcome,
        progress: &ProgressHandle,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<RenderSummary, JobError> {
        let listing = self.store.list(prefix).await?;
        let render_size = listing.iter().map(|o| o.size).sum();
        let timing_prefix = keys::timings_prefix(prefix);
        let timing_keys: Vec<String> = listing
            .into_iter()
            .filter(|o| o.key.starts_with(&timing_prefix))
            .map(|o| o.key)
            .collect();
        let timings = timings_from_keys(&timing_keys);
        let cost = self
            .cost
            .estimate(&timings, metadata.estimated_total_invocations)?;
        debug!(job_id = %metadata.job_id, cost = %cost.display, "Estimated cost");

        let output_key = keys::output_key(
            prefix,
            metadata.out_name.as_deref(),
            metadata.output_extension(),
        );
        let combine_started = Instant::now();
        let local_dir = self.local_output_dir(&metadata.job_id);
        let produced = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobError::Cancelled {
                retries: outcome.retries.clone(),
            }),
            size = self.produce_output(metadata, &outcome, &output_key, &local_dir, progress) => size,
        };
        // Both arms land here; a dropped combine leaves its output behind.
        remove_local_output(&local_dir).await;
        let output_size = produced?;
        let time_to_combine_ms = combine_started.elapsed().as_millis() as u64;

        let cleanup = self
            .cleanup
            .run(prefix, request.skip_cleanup, progress)
            .await?;
        let errors = self.error_reports(prefix).await?;

        let most_expensive = match metadata.job_type {
            JobType::Still => Vec::new(),
            JobType::Video => most_expensive_chunks(
                &timings,
                metadata.frames_per_chunk,
                metadata.total_frames,
                MOST_EXPENSIVE_CHUNKS,
            ),
        };

        let summary = RenderSummary {
            job_id: metadata.job_id.clone(),
            estimated_billing_duration_ms: cost.billed_duration_ms,
            cost,
            output_key,
            output_size,
            render_size,
            start_time: metadata.created_at,
            end_time: Utc::now(),
            time_to_finish_ms: started.elapsed().as_millis() as u64,
            time_to_render_chunks_ms: chunk_render_span_ms(&timings).unwrap_or(0),
            time_to_combine_ms,
            time_to_cleanup_ms: cleanup.elapsed_ms,
            retries: outcome.retries,
            errors,
            most_expensive_chunks: most_expensive,
            files_cleaned_up: cleanup.files_deleted,
            delete_after: metadata.delete_after,
        };
        put_json(self.store.as_ref(), &keys::summary_key(prefix), &summary).await?;

        Ok(summary)
    }

    /// Writes the final output object and returns its size.
    async fn produce_output(
        &self,
        metadata: &RenderMetadata,
        outcome: &DispatchOutcome,
        output_key: &str,
        local_dir: &Path,
        progress: &ProgressHandle,
    ) -> Result<u64, JobError> {
        if metadata.job_type == JobType::Still {
            return self.copy_still(outcome, output_key, progress).await;
        }

        let local = local_dir.join(format!("out.{}", metadata.output_extension()));
        let combined = self
            .combiner
            .combine_chunks(&outcome.results, metadata, local, progress.clone())
            .await;
        let uploaded = match combined {
            Ok(result) => self
                .store
                .upload_from(output_key, &result.output_path)
                .await
                .map_err(JobError::from),
            Err(e) => Err(e.into()),
        };
        Ok(uploaded?.size)
    }

    /// A still renders to a single image that already is the output.
    async fn copy_still(
        &self,
        outcome: &DispatchOutcome,
        output_key: &str,
        progress: &ProgressHandle,
    ) -> Result<u64, JobError> {
        let started = Instant::now();
        progress
            .emit(ProgressEvent::Combining { total_frames: 1 })
            .await;
        let image = outcome
            .results
            .first()
            .and_then(|r| r.artifacts.video.as_ref())
            .ok_or_else(|| CombineError::MissingSegment {
                chunk_index: 0,
                stream: "video".to_string(),
            })?;
        let bytes = self.store.get(image).await?;
        let info = self.store.put(output_key, bytes).await?;
        progress
            .emit(ProgressEvent::CombineDone {
                elapsed_ms: started.elapsed().as_millis() as u64,
            })
            .await;
        Ok(info.size)
    }

    fn local_output_dir(&self, job_id: &str) -> PathBuf {
        self.settings.orchestrator.output_dir.join(job_id)
    }

    /// Error reports persisted by the dispatcher. Unreadable reports are
    /// skipped.
    async fn error_reports(&self, prefix: &str) -> Result<Vec<ErrorReport>, JobError> {
        let mut reports = Vec::new();
        for object in self.store.list(&keys::errors_prefix(prefix)).await? {
            match get_json::<ErrorReport>(self.store.as_ref(), &object.key).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(key = %object.key, error = %e, "Skipping unreadable error report"),
            }
        }
        Ok(reports)
    }

    /// Best-effort cleanup after a failed or cancelled job.
    async fn cleanup_after_failure(
        &self,
        prefix: &str,
        skip_requested: bool,
        progress: &ProgressHandle,
    ) {
        if let Err(e) = self.cleanup.run(prefix, skip_requested, progress).await {
            warn!(prefix = %prefix, error = %e, "Cleanup after failed render failed");
        }
    }
}

/// Removes the job's local output directory, if any.
async fn remove_local_output(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), error = %e, "Failed to remove local output");
        }
    }
}
