//! Mock muxer for testing.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::combiner::{
    CombineError, ConcatRequest, MediaMuxer, MuxProgress, MuxRequest, StreamInput,
};

/// Mock implementation of the MediaMuxer trait.
///
/// Concatenation and muxing are plain byte concatenation in input order, so
/// outputs are deterministic and easy to assert on. Either step can be made
/// to fail, or to stall forever once its output is on disk.
#[derive(Debug, Default)]
pub struct MockMuxer {
    concat_error: Mutex<Option<String>>,
    mux_error: Mutex<Option<String>>,
    hang_after_output: AtomicBool,
    stalled: Notify,
    concat_calls: AtomicUsize,
    mux_calls: AtomicUsize,
}

impl MockMuxer {
    /// Create a new mock muxer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every concat call fails with `reason`.
    pub fn fail_concat(self, reason: impl Into<String>) -> Self {
        if let Ok(mut error) = self.concat_error.lock() {
            *error = Some(reason.into());
        }
        self
    }

    /// Every mux call fails with `reason`.
    pub fn fail_mux(self, reason: impl Into<String>) -> Self {
        if let Ok(mut error) = self.mux_error.lock() {
            *error = Some(reason.into());
        }
        self
    }

    /// Every call writes its output and then never returns.
    pub fn hang_after_output(self) -> Self {
        self.hang_after_output.store(true, Ordering::SeqCst);
        self
    }

    /// Resolves once a call has written its output and stalled.
    pub async fn stalled(&self) {
        self.stalled.notified().await;
    }

    pub fn concat_calls(&self) -> usize {
        self.concat_calls.load(Ordering::SeqCst)
    }

    pub fn mux_calls(&self) -> usize {
        self.mux_calls.load(Ordering::SeqCst)
    }

    fn scripted_error(slot: &Mutex<Option<String>>) -> Option<CombineError> {
        slot.lock()
            .ok()
            .and_then(|e| e.clone())
            .map(|reason| CombineError::mux_failed(reason, None))
    }

    async fn append(out: &mut Vec<u8>, path: &Path) -> Result<(), CombineError> {
        out.extend(tokio::fs::read(path).await?);
        Ok(())
    }

    async fn write(&self, output: &Path, bytes: Vec<u8>) -> Result<(), CombineError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, bytes).await?;
        if self.hang_after_output.load(Ordering::SeqCst) {
            self.stalled.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl MediaMuxer for MockMuxer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn concat(
        &self,
        request: ConcatRequest,
        progress: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError> {
        self.concat_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = Self::scripted_error(&self.concat_error) {
            return Err(error);
        }

        let mut bytes = Vec::new();
        for (i, segment) in request.segments.iter().enumerate() {
            Self::append(&mut bytes, segment).await?;
            let frames = request.total_frames * (i as u64 + 1) / request.segments.len() as u64;
            let _ = progress.try_send(MuxProgress { frames });
        }
        self.write(&request.output, bytes).await
    }

    async fn mux(
        &self,
        request: MuxRequest,
        progress: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError> {
        self.mux_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = Self::scripted_error(&self.mux_error) {
            return Err(error);
        }

        let mut bytes = Vec::new();
        for input in [&request.video, &request.audio].into_iter().flatten() {
            match input {
                StreamInput::File(path) => Self::append(&mut bytes, path).await?,
                StreamInput::Seamless(paths) => {
                    for path in paths {
                        Self::append(&mut bytes, path).await?;
                    }
                }
            }
        }
        let _ = progress.try_send(MuxProgress {
            frames: request.total_frames,
        });
        self.write(&request.output, bytes).await
    }

    async fn validate(&self) -> Result<(), CombineError> {
        Ok(())
    }
}
