//! Progress sinks.
//!
//! Sinks receive every snapshot; debouncing is their own business.

use tokio::sync::watch;
use tracing::debug;

use super::state::ProgressSnapshot;

/// Receiver of job progress snapshots.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Writes stage labels to the log at debug level.
pub struct LogProgressSink {
    job_id: String,
}

impl LogProgressSink {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl ProgressSink for LogProgressSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        debug!(job_id = %self.job_id, progress = %snapshot.labels().join(" | "), "Progress");
    }
}

/// Publishes the latest snapshot on a watch channel.
pub struct WatchProgressSink {
    tx: watch::Sender<ProgressSnapshot>,
}

impl WatchProgressSink {
    pub fn new() -> (Self, watch::Receiver<ProgressSnapshot>) {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgressSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.tx.send_replace(snapshot.clone());
    }
}
