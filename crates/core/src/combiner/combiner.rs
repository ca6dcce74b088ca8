//! Segment download, concatenation and mux for one job.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::job::{ChunkResult, RenderMetadata, StreamKind};
use crate::metrics::COMBINE_DURATION;
use crate::progress::{ProgressEvent, ProgressHandle};
use crate::storage::ObjectStore;

use super::config::CombinerConfig;
use super::error::CombineError;
use super::traits::MediaMuxer;
use super::types::{
    segment_keys, CombineContext, CombinePart, CombineResult, CombineSpec, ConcatRequest,
    MuxProgress, MuxRequest, StreamInput, StreamSegments,
};

/// Recombines per-chunk segments into the final output file.
pub struct ArtifactCombiner {
    muxer: Arc<dyn MediaMuxer>,
    store: Arc<dyn ObjectStore>,
    config: CombinerConfig,
}

impl ArtifactCombiner {
    pub fn new(
        muxer: Arc<dyn MediaMuxer>,
        store: Arc<dyn ObjectStore>,
        config: CombinerConfig,
    ) -> Self {
        Self {
            muxer,
            store,
            config,
        }
    }

    pub fn muxer(&self) -> &Arc<dyn MediaMuxer> {
        &self.muxer
    }

    /// Combines segments that are already on local disk.
    ///
    /// Intermediates go to a fresh work directory that is removed on every
    /// exit path.
    pub async fn combine(
        &self,
        spec: &CombineSpec,
        ctx: &CombineContext,
        progress: ProgressHandle,
    ) -> Result<CombineResult, CombineError> {
        let started = Instant::now();
        let work_dir = self.work_dir(&ctx.job_id);
        let result = in_work_dir(&work_dir, self.combine_in(spec, ctx, &work_dir, &progress)).await;
        self.finish(result, started, ctx, &progress).await
    }

    /// Downloads the segments named by `results` and combines them.
    ///
    /// `results` must be in chunk-index order.
    pub async fn combine_chunks(
        &self,
        results: &[ChunkResult],
        metadata: &RenderMetadata,
        output_path: PathBuf,
        progress: ProgressHandle,
    ) -> Result<CombineResult, CombineError> {
        let started = Instant::now();
        let ctx = CombineContext::for_job(metadata, output_path);
        let work_dir = self.work_dir(&ctx.job_id);
        let result = in_work_dir(&work_dir, async {
            let spec = self.stage_segments(results, metadata, &work_dir).await?;
            self.combine_in(&spec, &ctx, &work_dir, &progress).await
        })
        .await;
        self.finish(result, started, &ctx, &progress).await
    }

    fn work_dir(&self, job_id: &str) -> PathBuf {
        self.config
            .temp_dir
            .join(format!("{}-{}", job_id, uuid::Uuid::new_v4().simple()))
    }

    /// Downloads every segment into `work_dir` and builds the spec.
    async fn stage_segments(
        &self,
        results: &[ChunkResult],
        metadata: &RenderMetadata,
        work_dir: &Path,
    ) -> Result<CombineSpec, CombineError> {
        let video_seamless = metadata
            .codec
            .map(|c| c.supports_seamless_video())
            .unwrap_or(false);
        let video_ext = if video_seamless {
            "ts"
        } else {
            metadata.output_extension()
        };
        let audio_seamless = metadata
            .audio_codec
            .map(|c| c.supports_seamless())
            .unwrap_or(false);
        let audio_ext = metadata.audio_codec.map(|c| c.extension()).unwrap_or("aac");

        let video = match segment_keys(results, StreamKind::Video)? {
            Some(keys) => Some(StreamSegments::new(
                self.download(&keys, StreamKind::Video, video_ext, work_dir)
                    .await?,
                video_seamless,
            )),
            None => None,
        };
        let audio = match segment_keys(results, StreamKind::Audio)? {
            Some(keys) => Some(StreamSegments::new(
                self.download(&keys, StreamKind::Audio, audio_ext, work_dir)
                    .await?,
                audio_seamless,
            )),
            None => None,
        };

        CombineSpec::from_streams(video, audio)
    }

    async fn download(
        &self,
        keys: &[String],
        stream: StreamKind,
        extension: &str,
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>, CombineError> {
        let segments_dir = work_dir.join("segments");
        let downloads = keys.iter().enumerate().map(|(index, key)| {
            let path = segments_dir.join(format!("{}-{:08}.{}", stream.as_str(), index, extension));
            async move {
                self.store.download_to(key, &path).await?;
                Ok::<PathBuf, CombineError>(path)
            }
        });
        let paths = try_join_all(downloads).await?;
        debug!("Downloaded {} {} segments", paths.len(), stream.as_str());
        Ok(paths)
    }

    async fn combine_in(
        &self,
        spec: &CombineSpec,
        ctx: &CombineContext,
        work_dir: &Path,
        progress: &ProgressHandle,
    ) -> Result<usize, CombineError> {
        if let Some(parent) = ctx.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let single_stream = !matches!(spec, CombineSpec::Both { .. });
        let video_concat = spec.video().filter(|s| !s.seamless);
        let audio_concat = spec.audio().filter(|s| !s.seamless);
        // A lone concatenated stream is already the final output.
        let needs_mux = !single_stream || (video_concat.is_none() && audio_concat.is_none());

        let parts = video_concat.is_some() as u64 + audio_concat.is_some() as u64 + needs_mux as u64;
        let tracker = WeightedProgress::new(progress.clone(), ctx.total_frames);
        progress
            .emit(ProgressEvent::Combining {
                total_frames: ctx.total_frames * parts,
            })
            .await;

        let concat_target = |name: &str, extension: &str| {
            if single_stream {
                ctx.output_path.clone()
            } else {
                work_dir.join(format!("{}.{}", name, extension))
            }
        };

        let video_input = async {
            match spec.video() {
                None => Ok::<_, CombineError>(None),
                Some(s) if s.seamless => Ok(Some(StreamInput::Seamless(s.segments.clone()))),
                Some(s) => {
                    let output = concat_target("video", &ctx.video_extension);
                    let request = ConcatRequest {
                        segments: s.segments.clone(),
                        list_file: work_dir.join("video-list.txt"),
                        output: output.clone(),
                        total_frames: ctx.total_frames,
                        fps: ctx.fps,
                    };
                    tracker
                        .run(CombinePart::VideoConcat, |tx| {
                            self.muxer.concat(request, tx)
                        })
                        .await?;
                    Ok(Some(StreamInput::File(output)))
                }
            }
        };
        let audio_input = async {
            match spec.audio() {
                None => Ok::<_, CombineError>(None),
                Some(s) if s.seamless => Ok(Some(StreamInput::Seamless(s.segments.clone()))),
                Some(s) => {
                    let output = concat_target("audio", &ctx.audio_extension);
                    let request = ConcatRequest {
                        segments: s.segments.clone(),
                        list_file: work_dir.join("audio-list.txt"),
                        output: output.clone(),
                        total_frames: ctx.total_frames,
                        fps: ctx.fps,
                    };
                    tracker
                        .run(CombinePart::AudioConcat, |tx| {
                            self.muxer.concat(request, tx)
                        })
                        .await?;
                    Ok(Some(StreamInput::File(output)))
                }
            }
        };

        let (video, audio) = tokio::try_join!(video_input, audio_input)?;

        if needs_mux {
            let request = MuxRequest {
                video,
                audio,
                output: ctx.output_path.clone(),
                total_frames: ctx.total_frames,
                fps: ctx.fps,
            };
            tracker
                .run(CombinePart::Mux, |tx| self.muxer.mux(request, tx))
                .await?;
        }

        Ok(spec.segment_count())
    }

    async fn finish(
        &self,
        result: Result<usize, CombineError>,
        started: Instant,
        ctx: &CombineContext,
        progress: &ProgressHandle,
    ) -> Result<CombineResult, CombineError> {
        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(segments_combined) => tokio::fs::metadata(&ctx.output_path)
                .await
                .map_err(|_| CombineError::OutputMissing {
                    path: ctx.output_path.clone(),
                })
                .map(|meta| CombineResult {
                    output_path: ctx.output_path.clone(),
                    output_size: meta.len(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    segments_combined,
                }),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(result) => {
                COMBINE_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed.as_secs_f64());
                progress
                    .emit(ProgressEvent::CombineDone {
                        elapsed_ms: result.elapsed_ms,
                    })
                    .await;
                info!(
                    job_id = %ctx.job_id,
                    "Combined {} segments into {} ({} bytes) in {}ms",
                    result.segments_combined,
                    result.output_path.display(),
                    result.output_size,
                    result.elapsed_ms
                );
            }
            Err(e) => {
                COMBINE_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed.as_secs_f64());
                warn!(job_id = %ctx.job_id, error = %e, "Combine failed");
            }
        }
        outcome
    }
}

/// Runs `fut` inside `dir`, removing the directory afterwards.
async fn in_work_dir<T, F>(dir: &Path, fut: F) -> Result<T, CombineError>
where
    F: Future<Output = Result<T, CombineError>>,
{
    let mut guard = WorkDirGuard::new(dir.to_path_buf());
    let result = match tokio::fs::create_dir_all(dir).await {
        Ok(()) => fut.await,
        Err(e) => Err(CombineError::Io(e)),
    };
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), error = %e, "Failed to remove combine work dir");
        }
    }
    guard.disarm();
    result
}

/// Removes the work directory if the combine future is dropped mid-flight.
struct WorkDirGuard {
    path: PathBuf,
    armed: bool,
}

impl WorkDirGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WorkDirGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Folds per-part muxer progress into one weighted frame count.
struct WeightedProgress {
    handle: ProgressHandle,
    weight: u64,
    parts: [AtomicU64; 3],
}

impl WeightedProgress {
    fn new(handle: ProgressHandle, weight: u64) -> Self {
        Self {
            handle,
            weight,
            parts: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    fn update(&self, part: CombinePart, frames: u64) {
        self.parts[part.index()].fetch_max(frames.min(self.weight), Ordering::Relaxed);
        let frames_encoded = self.parts.iter().map(|p| p.load(Ordering::Relaxed)).sum();
        self.handle
            .try_emit(ProgressEvent::Encoding { frames_encoded });
    }

    /// Drives one muxer call while relaying its progress.
    async fn run<F, Fut>(&self, part: CombinePart, op: F) -> Result<(), CombineError>
    where
        F: FnOnce(mpsc::Sender<MuxProgress>) -> Fut,
        Fut: Future<Output = Result<(), CombineError>>,
    {
        let (tx, mut rx) = mpsc::channel::<MuxProgress>(32);
        let relay = async {
            while let Some(p) = rx.recv().await {
                self.update(part, p.frames);
            }
        };
        let (result, ()) = tokio::join!(op(tx), relay);
        if result.is_ok() {
            self.update(part, self.weight);
        }
        result
    }
}
