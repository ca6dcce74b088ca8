//! Progress sink that records every snapshot.

use std::sync::Mutex;

use crate::progress::{ProgressSink, ProgressSnapshot};

/// Records snapshots for later assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots received so far, in delivery order.
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// The latest snapshot, if any.
    pub fn last(&self) -> Option<ProgressSnapshot> {
        self.snapshots.lock().ok().and_then(|s| s.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressSink for CollectingSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot.clone());
        }
    }
}
