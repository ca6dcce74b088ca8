//! Dispatcher implementation.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::{keys, ChunkJob, ChunkResult, FailureRecord, RetryRecord};
use crate::metrics;
use crate::progress::{ProgressEvent, ProgressHandle};
use crate::retry::{classify, AttemptState, ErrorClass, RetryPolicy, WorkerError};
use crate::storage::{put_json, ObjectStore};
use crate::worker::{JobContext, RenderWorker};

use super::config::DispatcherConfig;
use super::types::{DispatchError, DispatchOutcome, ErrorReport};

/// Fans chunk jobs out to a render worker.
pub struct Dispatcher {
    config: DispatcherConfig,
    worker: Arc<dyn RenderWorker>,
    store: Arc<dyn ObjectStore>,
}

/// Final state of one chunk task.
struct ChunkOutcome {
    chunk_index: usize,
    attempt: u32,
    record: RetryRecord,
    result: Result<ChunkResult, WorkerError>,
}

impl ChunkOutcome {
    fn new(job: &ChunkJob, record: RetryRecord, result: Result<ChunkResult, WorkerError>) -> Self {
        Self {
            chunk_index: job.chunk_index,
            attempt: job.attempt,
            record,
            result,
        }
    }
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        worker: Arc<dyn RenderWorker>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            worker,
            store,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs every chunk to success or aborts the whole set.
    ///
    /// On success the outcome holds exactly one result per job, ordered by
    /// chunk index. When any chunk runs out of retries, or `cancel` fires,
    /// in-flight siblings are interrupted and every completed result is
    /// dropped.
    pub async fn dispatch(
        &self,
        jobs: Vec<ChunkJob>,
        ctx: &JobContext,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let total = jobs.len();
        let limit = self.config.effective_concurrency();
        let siblings = cancel.child_token();

        info!(
            job_id = %ctx.job_id(),
            chunks = total,
            concurrency = limit,
            worker = self.worker.name(),
            "Dispatching chunks"
        );

        let runner = ChunkRunner {
            config: self.config.clone(),
            policy: RetryPolicy::new(self.config.max_retries),
            worker: Arc::clone(&self.worker),
            store: Arc::clone(&self.store),
            ctx: ctx.clone(),
            progress,
            cancel: siblings.clone(),
        };

        let mut queue = jobs.into_iter();
        let mut in_flight: JoinSet<ChunkOutcome> = JoinSet::new();
        let mut results: BTreeMap<usize, ChunkResult> = BTreeMap::new();
        let mut retries: BTreeMap<usize, RetryRecord> = BTreeMap::new();

        loop {
            while in_flight.len() < limit && !siblings.is_cancelled() {
                let Some(job) = queue.next() else {
                    break;
                };
                let runner = runner.clone();
                in_flight.spawn(async move {
                    let placeholder = job.clone();
                    match AssertUnwindSafe(runner.run(job)).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(_) => ChunkOutcome::new(
                            &placeholder,
                            RetryRecord::new(placeholder.chunk_index),
                            Err(WorkerError::Fatal {
                                message: "chunk task panicked".to_string(),
                            }),
                        ),
                    }
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    siblings.cancel();
                    drain(&mut in_flight, &mut retries).await;
                    warn!(job_id = %ctx.job_id(), "Dispatch cancelled");
                    return Err(DispatchError::Cancelled {
                        retries: retries.into_values().collect(),
                    });
                }
                joined = in_flight.join_next() => joined,
            };

            let outcome = match joined {
                Some(Ok(outcome)) => outcome,
                Some(Err(join_err)) => {
                    // Tasks are never aborted and panics are caught inside,
                    // so this only happens on runtime shutdown.
                    warn!(job_id = %ctx.job_id(), error = %join_err, "Chunk task lost");
                    drain(&mut in_flight, &mut retries).await;
                    return Err(DispatchError::Cancelled {
                        retries: retries.into_values().collect(),
                    });
                }
                None => break,
            };

            if outcome.record.has_failures() {
                retries.insert(outcome.chunk_index, outcome.record);
            }

            match outcome.result {
                Ok(result) => {
                    results.insert(outcome.chunk_index, result);
                }
                Err(WorkerError::Cancelled) => {
                    siblings.cancel();
                    drain(&mut in_flight, &mut retries).await;
                    return Err(DispatchError::Cancelled {
                        retries: retries.into_values().collect(),
                    });
                }
                Err(source) => {
                    error!(
                        job_id = %ctx.job_id(),
                        chunk = outcome.chunk_index,
                        attempt = outcome.attempt,
                        error = %source,
                        "Chunk aborted, cancelling remaining chunks"
                    );
                    siblings.cancel();
                    drain(&mut in_flight, &mut retries).await;
                    return Err(DispatchError::ChunkAborted {
                        chunk_index: outcome.chunk_index,
                        attempt: outcome.attempt,
                        source,
                        retries: retries.into_values().collect(),
                    });
                }
            }
        }

        if cancel.is_cancelled() || results.len() < total {
            return Err(DispatchError::Cancelled {
                retries: retries.into_values().collect(),
            });
        }

        info!(
            job_id = %ctx.job_id(),
            chunks = total,
            retried_chunks = retries.len(),
            "All chunks rendered"
        );

        Ok(DispatchOutcome {
            results: results.into_values().collect(),
            retries: retries.into_values().collect(),
        })
    }
}

/// Waits for interrupted tasks so their retry history is not lost.
async fn drain(in_flight: &mut JoinSet<ChunkOutcome>, retries: &mut BTreeMap<usize, RetryRecord>) {
    while let Some(joined) = in_flight.join_next().await {
        if let Ok(outcome) = joined {
            if outcome.record.has_failures() {
                retries.insert(outcome.chunk_index, outcome.record);
            }
        }
    }
}

/// Per-task copy of everything a chunk needs.
#[derive(Clone)]
struct ChunkRunner {
    config: DispatcherConfig,
    policy: RetryPolicy,
    worker: Arc<dyn RenderWorker>,
    store: Arc<dyn ObjectStore>,
    ctx: JobContext,
    progress: ProgressHandle,
    cancel: CancellationToken,
}

impl ChunkRunner {
    /// Retry loop for one chunk. Attempt state is explicit and bounded by
    /// the policy.
    async fn run(self, job: ChunkJob) -> ChunkOutcome {
        let chunk_index = job.chunk_index;
        let mut record = RetryRecord::new(chunk_index);
        let mut state = AttemptState::default();
        let mut current = job;

        loop {
            if self.cancel.is_cancelled() {
                return ChunkOutcome::new(&current, record, Err(WorkerError::Cancelled));
            }

            record.attempts = current.attempt;
            self.progress
                .emit(ProgressEvent::Invoked {
                    chunk_index,
                    attempt: current.attempt,
                })
                .await;

            let started = Instant::now();
            match self.invoke_once(&current).await {
                Ok(result) => {
                    metrics::CHUNK_INVOCATIONS
                        .with_label_values(&["success"])
                        .inc();
                    metrics::CHUNK_RENDER_DURATION
                        .with_label_values(&[])
                        .observe(started.elapsed().as_secs_f64());
                    self.write_timing(&result).await;
                    self.progress
                        .emit(ProgressEvent::ChunkDone {
                            chunk_index,
                            frames_rendered: result.frames_rendered,
                        })
                        .await;
                    debug!(
                        job_id = %current.job_id,
                        chunk = chunk_index,
                        attempt = current.attempt,
                        "Chunk done"
                    );
                    return ChunkOutcome::new(&current, record, Ok(result));
                }
                Err(WorkerError::Cancelled) => {
                    metrics::CHUNK_INVOCATIONS
                        .with_label_values(&["cancelled"])
                        .inc();
                    return ChunkOutcome::new(&current, record, Err(WorkerError::Cancelled));
                }
                Err(err) => {
                    metrics::CHUNK_INVOCATIONS
                        .with_label_values(&["failed"])
                        .inc();

                    let decision = self.policy.decide(&err, &state);
                    let class = classify(&err);
                    record.failures.push(FailureRecord {
                        attempt: current.attempt,
                        class,
                        message: err.to_string(),
                        will_retry: decision.is_retry(),
                    });
                    self.write_error_report(&current, &err, class, decision.is_retry())
                        .await;

                    if !decision.is_retry() {
                        warn!(
                            job_id = %current.job_id,
                            chunk = chunk_index,
                            attempt = current.attempt,
                            class = class.as_str(),
                            error = %err,
                            "Chunk failed, no retry left"
                        );
                        self.progress
                            .emit(ProgressEvent::ChunkFailed {
                                chunk_index,
                                attempt: current.attempt,
                                message: err.to_string(),
                            })
                            .await;
                        return ChunkOutcome::new(&current, record, Err(err));
                    }

                    state.record(decision);
                    metrics::CHUNK_RETRIES
                        .with_label_values(&[class.as_str()])
                        .inc();
                    warn!(
                        job_id = %current.job_id,
                        chunk = chunk_index,
                        attempt = current.attempt,
                        class = class.as_str(),
                        error = %err,
                        "Retrying chunk"
                    );
                    self.progress
                        .emit(ProgressEvent::ChunkRetrying {
                            chunk_index,
                            attempt: current.attempt,
                            class,
                        })
                        .await;

                    if self.config.retry_delay_ms > 0 {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {}
                            _ = tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)) => {}
                        }
                    }
                    current = current.next_attempt();
                }
            }
        }
    }

    /// One invocation under the per-attempt deadline.
    async fn invoke_once(&self, job: &ChunkJob) -> Result<ChunkResult, WorkerError> {
        let timeout_ms = self.config.invocation_timeout_ms;
        let invocation = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.worker.invoke(job, &self.ctx, self.progress.clone()),
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(WorkerError::Cancelled),
            res = invocation => match res {
                Ok(result) => result?,
                Err(_) => return Err(WorkerError::Timeout { timeout_ms }),
            },
        };

        if result.chunk_index != job.chunk_index {
            return Err(WorkerError::failure(format!(
                "worker answered for chunk {} instead of {}",
                result.chunk_index, job.chunk_index
            )));
        }
        if !result.is_success() {
            let message = result
                .error
                .unwrap_or_else(|| "worker reported a failed chunk".to_string());
            return Err(WorkerError::from_message(message, None));
        }
        Ok(result)
    }

    /// Records the attempt's timing under a key that encodes it, so cost
    /// can be recomputed from a listing alone.
    async fn write_timing(&self, result: &ChunkResult) {
        let timing = result.timing();
        let key = keys::timing_key(&self.ctx.prefix(), &timing);
        if let Err(e) = put_json(self.store.as_ref(), &key, &timing).await {
            warn!(key = %key, error = %e, "Failed to write timing marker");
        }
    }

    async fn write_error_report(
        &self,
        job: &ChunkJob,
        err: &WorkerError,
        class: ErrorClass,
        will_retry: bool,
    ) {
        if !self.config.write_error_reports {
            return;
        }
        let tmp_dir = match err {
            WorkerError::StorageExhaustion { tmp_dir, .. } => tmp_dir.clone(),
            _ => None,
        };
        let report = ErrorReport {
            job_id: job.job_id.clone(),
            chunk_index: job.chunk_index,
            attempt: job.attempt,
            class,
            message: err.to_string(),
            stack: err.stack().map(String::from),
            tmp_dir,
            will_retry,
            worker: self.worker.name().to_string(),
            timestamp: Utc::now(),
        };
        let key = keys::error_key(&self.ctx.prefix(), job.chunk_index, job.attempt);
        if let Err(e) = put_json(self.store.as_ref(), &key, &report).await {
            warn!(key = %key, error = %e, "Failed to write error report");
        }
    }
}
