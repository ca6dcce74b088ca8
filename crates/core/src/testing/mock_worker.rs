//! Mock render worker for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::job::keys::chunk_key;
use crate::job::{ArtifactRefs, ChunkJob, ChunkResult, ChunkStatus, StreamKind};
use crate::progress::{ProgressEvent, ProgressHandle};
use crate::retry::WorkerError;
use crate::storage::ObjectStore;
use crate::worker::{JobContext, RenderWorker};

/// Scripted outcome of one attempt.
#[derive(Debug, Clone)]
enum Scripted {
    Fail(WorkerError),
    /// Writes a partial segment, then never returns.
    Hang,
}

/// Mock implementation of the RenderWorker trait.
///
/// Succeeds by default, writing one deterministic segment per stream to the
/// store. Outcomes can be scripted per chunk; scripts are consumed one per
/// attempt, in the order they were added.
///
/// # Example
///
/// ```rust,ignore
/// let worker = MockWorker::new(store.clone())
///     .with_delay(Duration::from_millis(10))
///     .fail_chunk(1, WorkerError::flaky("Target closed"))
///     .hang_chunk(2);
/// ```
pub struct MockWorker {
    store: Arc<dyn ObjectStore>,
    delay: Duration,
    chunk_delays: HashMap<usize, Duration>,
    scripts: Mutex<HashMap<usize, VecDeque<Scripted>>>,
    invocations: Mutex<Vec<ChunkJob>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

impl MockWorker {
    /// Create a new mock worker writing segments to `store`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            delay: Duration::ZERO,
            chunk_delays: HashMap::new(),
            scripts: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay applied to every attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay applied to every attempt of one chunk.
    pub fn with_chunk_delay(mut self, chunk_index: usize, delay: Duration) -> Self {
        self.chunk_delays.insert(chunk_index, delay);
        self
    }

    /// Queues a failure for the next unscripted attempt of a chunk.
    pub fn fail_chunk(self, chunk_index: usize, error: WorkerError) -> Self {
        self.script(chunk_index, Scripted::Fail(error))
    }

    /// Queues an attempt that never completes.
    pub fn hang_chunk(self, chunk_index: usize) -> Self {
        self.script(chunk_index, Scripted::Hang)
    }

    fn script(self, chunk_index: usize, outcome: Scripted) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(chunk_index).or_default().push_back(outcome);
        }
        self
    }

    /// Every invocation received, in call order.
    pub fn invocations(&self) -> Vec<ChunkJob> {
        self.invocations
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    /// Number of invocations received.
    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Highest number of attempts that were running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_script(&self, chunk_index: usize) -> Option<Scripted> {
        self.scripts
            .lock()
            .ok()
            .and_then(|mut s| s.get_mut(&chunk_index).and_then(VecDeque::pop_front))
    }

    async fn write_segments(
        &self,
        job: &ChunkJob,
        ctx: &JobContext,
    ) -> Result<ArtifactRefs, WorkerError> {
        let prefix = ctx.prefix();
        let mut refs = ArtifactRefs::default();
        for (stream, wanted) in [
            (StreamKind::Video, ctx.metadata.has_video()),
            (StreamKind::Audio, ctx.metadata.has_audio()),
        ] {
            if !wanted {
                continue;
            }
            let key = chunk_key(&prefix, job.chunk_index, stream);
            let body = format!(
                "[{} {}-{}]",
                stream.as_str(),
                job.frame_range.start,
                job.frame_range.end
            );
            self.store
                .put(&key, body.into_bytes())
                .await
                .map_err(|e| WorkerError::failure(e.to_string()))?;
            match stream {
                StreamKind::Video => refs.video = Some(key),
                StreamKind::Audio => refs.audio = Some(key),
            }
        }
        Ok(refs)
    }
}

/// Decrements the in-flight counter when an attempt ends or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderWorker for MockWorker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        job: &ChunkJob,
        ctx: &JobContext,
        progress: ProgressHandle,
    ) -> Result<ChunkResult, WorkerError> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(job.clone());
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        let started_at = Utc::now();
        let delay = self
            .chunk_delays
            .get(&job.chunk_index)
            .copied()
            .unwrap_or(self.delay);

        match self.next_script(job.chunk_index) {
            Some(Scripted::Hang) => {
                let key = chunk_key(&ctx.prefix(), job.chunk_index, StreamKind::Video);
                let _ = self.store.put(&key, b"partial".to_vec()).await;
                std::future::pending::<Result<ChunkResult, WorkerError>>().await
            }
            Some(Scripted::Fail(error)) => {
                tokio::time::sleep(delay).await;
                Err(error)
            }
            None => {
                tokio::time::sleep(delay).await;
                progress
                    .emit(ProgressEvent::Rendering {
                        chunk_index: job.chunk_index,
                        frames_rendered: job.frame_range.len(),
                    })
                    .await;
                let artifacts = self.write_segments(job, ctx).await?;
                Ok(ChunkResult {
                    chunk_index: job.chunk_index,
                    attempt: job.attempt,
                    status: ChunkStatus::Success,
                    frames_rendered: job.frame_range.len(),
                    started_at,
                    ended_at: Utc::now(),
                    artifacts,
                    error: None,
                })
            }
        }
    }
}
