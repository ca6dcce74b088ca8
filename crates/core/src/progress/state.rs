//! Pure progress reduction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::events::ProgressEvent;

/// Progress of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub done: u64,
    /// Unknown totals render as raw counts instead of a percentage.
    pub total: Option<u64>,
    pub finished_in_ms: Option<u64>,
    pub skipped: bool,
}

/// Presentation order of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Invocation,
    Render,
    Encode,
    Cleanup,
    Download,
}

impl Stage {
    fn verbs(&self) -> (&'static str, &'static str) {
        match self {
            Self::Invocation => ("Invoking workers", "Invoked workers"),
            Self::Render => ("Rendering frames", "Rendered frames"),
            Self::Encode => ("Combining chunks", "Combined chunks"),
            Self::Cleanup => ("Cleaning up artifacts", "Cleaned up artifacts"),
            Self::Download => ("Downloading output", "Downloaded output"),
        }
    }
}

impl StageProgress {
    fn known(done: u64, total: Option<u64>) -> Self {
        Self {
            done,
            total,
            ..Self::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_in_ms.is_some() || self.skipped
    }

    /// Completion in `[0, 1]`. Unknown totals count as not started.
    pub fn fraction(&self) -> f64 {
        if self.is_finished() {
            return 1.0;
        }
        match self.total {
            Some(total) if total > 0 => (self.done as f64 / total as f64).min(1.0),
            _ => 0.0,
        }
    }

    /// Human-facing line, e.g. `(2/4) Rendering frames 45% (45/100)`.
    pub fn label(&self, stage: Stage, step: usize, steps: usize) -> String {
        let (active, finished) = stage.verbs();
        let prefix = format!("({}/{})", step, steps);
        if self.skipped {
            return format!("{} {}: skipped", prefix, active);
        }
        if let Some(ms) = self.finished_in_ms {
            return format!("{} {} in {}ms", prefix, finished, ms);
        }
        match self.total {
            Some(total) if total > 0 => format!(
                "{} {} {}% ({}/{})",
                prefix,
                active,
                (self.fraction() * 100.0).floor() as u64,
                self.done,
                total
            ),
            _ if self.done == 0 => format!("{} {} 0%", prefix, active),
            _ => format!("{} {} {}", prefix, active, self.done),
        }
    }
}

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub invocation: StageProgress,
    pub render: StageProgress,
    pub encode: StageProgress,
    pub cleanup: StageProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<StageProgress>,
    pub chunks_done: usize,
    pub total_chunks: Option<usize>,
    pub retries: u32,
    pub failed_chunks: usize,
}

impl ProgressSnapshot {
    /// One label per stage, in presentation order.
    pub fn labels(&self) -> Vec<String> {
        let steps = if self.download.is_some() { 5 } else { 4 };
        let mut invocation = self.invocation.label(Stage::Invocation, 1, steps);
        if self.retries > 0 {
            invocation.push_str(&format!(" (+{} retries)", self.retries));
        }
        let mut labels = vec![
            invocation,
            self.render.label(Stage::Render, 2, steps),
            self.encode.label(Stage::Encode, 3, steps),
            self.cleanup.label(Stage::Cleanup, 4, steps),
        ];
        if let Some(ref download) = self.download {
            labels.push(download.label(Stage::Download, 5, steps));
        }
        labels
    }
}

/// Accumulated progress of one job.
///
/// Per-chunk counters keep their maximum, so a retry that restarts a chunk
/// never moves any stage backwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    total_chunks: Option<usize>,
    total_frames: Option<u64>,
    invoked: BTreeSet<usize>,
    rendered: BTreeMap<usize, u64>,
    completed: BTreeSet<usize>,
    failed: BTreeSet<usize>,
    retries: u32,
    render_done_in: Option<u64>,
    encode: StageProgress,
    cleanup: StageProgress,
    download: Option<StageProgress>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the state.
    pub fn apply(mut self, event: &ProgressEvent) -> Self {
        match event {
            ProgressEvent::Planned {
                total_chunks,
                total_frames,
            } => {
                self.total_chunks.get_or_insert(*total_chunks);
                self.total_frames.get_or_insert(*total_frames);
            }
            ProgressEvent::Invoked { chunk_index, .. } => {
                self.invoked.insert(*chunk_index);
            }
            ProgressEvent::Rendering {
                chunk_index,
                frames_rendered,
            } => {
                self.bump_rendered(*chunk_index, *frames_rendered);
            }
            ProgressEvent::ChunkDone {
                chunk_index,
                frames_rendered,
            } => {
                self.invoked.insert(*chunk_index);
                self.bump_rendered(*chunk_index, *frames_rendered);
                self.completed.insert(*chunk_index);
            }
            ProgressEvent::ChunkRetrying { .. } => {
                self.retries += 1;
            }
            ProgressEvent::ChunkFailed { chunk_index, .. } => {
                self.failed.insert(*chunk_index);
            }
            ProgressEvent::RenderDone { elapsed_ms } => {
                self.render_done_in.get_or_insert(*elapsed_ms);
            }
            ProgressEvent::Combining { total_frames } => {
                self.encode.total = Some(self.encode.total.unwrap_or(0).max(*total_frames));
            }
            ProgressEvent::Encoding { frames_encoded } => {
                self.encode.done = self.encode.done.max(*frames_encoded);
            }
            ProgressEvent::CombineDone { elapsed_ms } => {
                self.encode.finished_in_ms.get_or_insert(*elapsed_ms);
                if let Some(total) = self.encode.total {
                    self.encode.done = self.encode.done.max(total);
                }
            }
            ProgressEvent::CleanupStarted {
                min_files_to_delete,
            } => {
                self.cleanup.total =
                    Some(self.cleanup.total.unwrap_or(0).max(*min_files_to_delete));
            }
            ProgressEvent::CleanupProgress { files_deleted } => {
                self.cleanup.done = self.cleanup.done.max(*files_deleted);
            }
            ProgressEvent::CleanupDone {
                files_deleted,
                elapsed_ms,
            } => {
                self.cleanup.done = self.cleanup.done.max(*files_deleted);
                self.cleanup.finished_in_ms.get_or_insert(*elapsed_ms);
            }
            ProgressEvent::CleanupSkipped => {
                self.cleanup.skipped = true;
            }
            ProgressEvent::Download { bytes, total_bytes } => {
                let download = self.download.get_or_insert_with(StageProgress::default);
                download.done = download.done.max(*bytes);
                if download.total.is_none() {
                    download.total = *total_bytes;
                }
            }
            ProgressEvent::DownloadDone { elapsed_ms } => {
                let download = self.download.get_or_insert_with(StageProgress::default);
                download.finished_in_ms.get_or_insert(*elapsed_ms);
            }
        }
        self
    }

    fn bump_rendered(&mut self, chunk_index: usize, frames: u64) {
        let entry = self.rendered.entry(chunk_index).or_insert(0);
        *entry = (*entry).max(frames);
    }

    /// Total frames rendered across chunks.
    pub fn frames_rendered(&self) -> u64 {
        let sum: u64 = self.rendered.values().sum();
        match self.total_frames {
            Some(total) => sum.min(total),
            None => sum,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Derives the snapshot. Cheap enough to run on every event.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let total_chunks = self.total_chunks.map(|c| c as u64);
        let mut invocation = StageProgress::known(self.invoked.len() as u64, total_chunks);
        let mut render = StageProgress::known(self.frames_rendered(), self.total_frames);
        if let Some(ms) = self.render_done_in {
            invocation.finished_in_ms = Some(ms);
            render.finished_in_ms = Some(ms);
        }

        ProgressSnapshot {
            invocation,
            render,
            encode: self.encode.clone(),
            cleanup: self.cleanup.clone(),
            download: self.download.clone(),
            chunks_done: self.completed.len(),
            total_chunks: self.total_chunks,
            retries: self.retries,
            failed_chunks: self.failed.len(),
        }
    }
}
