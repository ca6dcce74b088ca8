use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use chunkrender_core::{
    Config, JobError, ProgressSnapshot, RenderOrchestrator, RenderRequest, RenderSummary,
    RetryRecord, WatchProgressSink,
};

/// Lifecycle of a submitted render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Failure details kept for a finished render.
#[derive(Debug, Clone, Serialize)]
pub struct RenderFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub retries: Vec<RetryRecord>,
}

impl From<&JobError> for RenderFailure {
    fn from(err: &JobError) -> Self {
        Self {
            message: err.to_string(),
            stack: err.stack().map(str::to_string),
            retries: err.retries().to_vec(),
        }
    }
}

/// One render tracked by the server.
pub struct RenderEntry {
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RenderStatus,
    pub progress: watch::Receiver<ProgressSnapshot>,
    pub summary: Option<RenderSummary>,
    pub failure: Option<RenderFailure>,
    pub cancel: CancellationToken,
}

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<RenderOrchestrator>,
    renders: RwLock<HashMap<String, RenderEntry>>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<RenderOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            renders: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<RenderOrchestrator> {
        &self.orchestrator
    }

    pub fn renders(&self) -> &RwLock<HashMap<String, RenderEntry>> {
        &self.renders
    }

    /// Registers a render and runs it in the background. Returns its id.
    pub async fn submit(self: &Arc<Self>, request: RenderRequest) -> String {
        let job_id = RenderOrchestrator::new_job_id();
        let cancel = self.shutdown.child_token();
        let (sink, progress) = WatchProgressSink::new();

        self.renders.write().await.insert(
            job_id.clone(),
            RenderEntry {
                created_at: Utc::now(),
                finished_at: None,
                status: RenderStatus::Running,
                progress,
                summary: None,
                failure: None,
                cancel: cancel.clone(),
            },
        );

        let state = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            let result = state
                .orchestrator
                .render_job(id.clone(), request, Arc::new(sink), cancel)
                .await;
            state.finish(&id, result.map(|outcome| outcome.summary)).await;
        });

        job_id
    }

    async fn finish(&self, job_id: &str, result: Result<RenderSummary, JobError>) {
        let mut renders = self.renders.write().await;
        let Some(entry) = renders.get_mut(job_id) else {
            return;
        };
        entry.finished_at = Some(Utc::now());
        match result {
            Ok(summary) => {
                entry.status = RenderStatus::Succeeded;
                entry.summary = Some(summary);
            }
            Err(e) => {
                entry.status = if e.is_cancelled() {
                    RenderStatus::Cancelled
                } else {
                    RenderStatus::Failed
                };
                entry.failure = Some(RenderFailure::from(&e));
            }
        }
        evict_finished(&mut renders, self.config.server.max_finished_renders);
    }

    /// Requests cancellation of a running render.
    ///
    /// Returns the current status, or `None` for an unknown id.
    pub async fn cancel(&self, job_id: &str) -> Option<RenderStatus> {
        let renders = self.renders.read().await;
        let entry = renders.get(job_id)?;
        if !entry.status.is_terminal() {
            entry.cancel.cancel();
        }
        Some(entry.status)
    }

    /// Cancels every running render.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Number of renders per status.
    pub async fn status_counts(&self) -> HashMap<RenderStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.renders.read().await.values() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Drops the oldest finished renders beyond `keep`. Running renders stay.
fn evict_finished(renders: &mut HashMap<String, RenderEntry>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = renders
        .iter()
        .filter_map(|(id, entry)| entry.finished_at.map(|at| (at, id.clone())))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        renders.remove(&id);
    }
    debug!(evicted = excess, "Evicted finished renders");
}
