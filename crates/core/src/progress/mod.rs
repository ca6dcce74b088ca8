//! Job progress.
//!
//! Workers and pipeline stages only send [`ProgressEvent`]s through a
//! [`ProgressHandle`]. A single [`ProgressAggregator`] task folds them into a
//! [`ProgressState`] and pushes every resulting [`ProgressSnapshot`] to a
//! [`ProgressSink`].

mod aggregator;
mod events;
mod sink;
mod state;

pub use aggregator::{create_progress_channel, ProgressAggregator, ProgressHandle};
pub use events::ProgressEvent;
pub use sink::{LogProgressSink, ProgressSink, WatchProgressSink};
pub use state::{ProgressSnapshot, ProgressState, Stage, StageProgress};
