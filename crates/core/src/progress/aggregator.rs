use std::sync::Arc;

use tokio::sync::mpsc;

use super::events::ProgressEvent;
use super::sink::ProgressSink;
use super::state::ProgressState;

/// Handle for emitting progress events.
///
/// Cheaply cloneable; every worker task holds its own copy. Producers only
/// send and never read state back.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressHandle {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Sends an event, waiting for channel capacity.
    ///
    /// A closed channel is logged, never surfaced to the caller.
    pub async fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.send(event).await {
            tracing::warn!("Failed to emit progress event: {}", e);
        }
    }

    /// Sends an event without waiting. Returns false if it was dropped.
    pub fn try_emit(&self, event: ProgressEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Dropped progress event: {}", e);
                false
            }
        }
    }
}

/// Single consumer of a job's progress events.
pub struct ProgressAggregator {
    rx: mpsc::Receiver<ProgressEvent>,
    sink: Arc<dyn ProgressSink>,
    state: ProgressState,
}

impl ProgressAggregator {
    pub fn new(rx: mpsc::Receiver<ProgressEvent>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            rx,
            sink,
            state: ProgressState::new(),
        }
    }

    /// Consumes events until every handle is dropped, then returns the final
    /// state. Spawn with `tokio::spawn(aggregator.run())`.
    pub async fn run(mut self) -> ProgressState {
        while let Some(event) = self.rx.recv().await {
            self.state = self.state.apply(&event);
            self.sink.on_progress(&self.state.snapshot());
        }
        self.state
    }
}

/// Creates a connected handle and aggregator.
pub fn create_progress_channel(
    sink: Arc<dyn ProgressSink>,
    buffer_size: usize,
) -> (ProgressHandle, ProgressAggregator) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ProgressHandle::new(tx), ProgressAggregator::new(rx, sink))
}
