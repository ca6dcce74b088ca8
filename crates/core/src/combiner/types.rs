//! Types for the combiner module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::job::{ChunkResult, RenderMetadata, StreamKind};

use super::error::CombineError;

/// Ordered segments of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSegments {
    /// Local segment files in chunk-index order.
    pub segments: Vec<PathBuf>,
    /// Join without a concat pass, as one virtual input to the muxer.
    pub seamless: bool,
}

impl StreamSegments {
    pub fn new(segments: Vec<PathBuf>, seamless: bool) -> Self {
        Self { segments, seamless }
    }
}

/// What to combine. One variant per shape of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineSpec {
    VideoOnly { video: StreamSegments },
    AudioOnly { audio: StreamSegments },
    Both {
        video: StreamSegments,
        audio: StreamSegments,
    },
}

impl CombineSpec {
    /// Builds the spec from streams that may or may not exist.
    pub fn from_streams(
        video: Option<StreamSegments>,
        audio: Option<StreamSegments>,
    ) -> Result<Self, CombineError> {
        match (video, audio) {
            (Some(video), Some(audio)) => Ok(Self::Both { video, audio }),
            (Some(video), None) => Ok(Self::VideoOnly { video }),
            (None, Some(audio)) => Ok(Self::AudioOnly { audio }),
            (None, None) => Err(CombineError::NoStreams),
        }
    }

    pub fn video(&self) -> Option<&StreamSegments> {
        match self {
            Self::VideoOnly { video } | Self::Both { video, .. } => Some(video),
            Self::AudioOnly { .. } => None,
        }
    }

    pub fn audio(&self) -> Option<&StreamSegments> {
        match self {
            Self::AudioOnly { audio } | Self::Both { audio, .. } => Some(audio),
            Self::VideoOnly { .. } => None,
        }
    }

    /// Number of segment files across both streams.
    pub fn segment_count(&self) -> usize {
        self.video().map(|s| s.segments.len()).unwrap_or(0)
            + self.audio().map(|s| s.segments.len()).unwrap_or(0)
    }
}

/// Object keys of one stream's segments, in chunk-index order.
///
/// Returns `Ok(None)` when no chunk produced the stream. A stream produced by
/// some chunks but not others is an error.
pub fn segment_keys(
    results: &[ChunkResult],
    stream: StreamKind,
) -> Result<Option<Vec<String>>, CombineError> {
    let keys: Vec<Option<&String>> = results
        .iter()
        .map(|r| match stream {
            StreamKind::Video => r.artifacts.video.as_ref(),
            StreamKind::Audio => r.artifacts.audio.as_ref(),
        })
        .collect();

    if keys.iter().all(Option::is_none) {
        return Ok(None);
    }

    keys.into_iter()
        .zip(results)
        .map(|(key, result)| {
            key.cloned().ok_or_else(|| CombineError::MissingSegment {
                chunk_index: result.chunk_index,
                stream: stream.as_str().to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Per-job parameters of a combine.
#[derive(Debug, Clone)]
pub struct CombineContext {
    pub job_id: String,
    /// Final output file. Lives outside the work directory.
    pub output_path: PathBuf,
    pub total_frames: u64,
    pub fps: u32,
    /// Container extension of the video intermediate.
    pub video_extension: String,
    /// Container extension of the audio intermediate.
    pub audio_extension: String,
}

impl CombineContext {
    /// Context for a job, writing to `output_path`.
    pub fn for_job(metadata: &RenderMetadata, output_path: PathBuf) -> Self {
        Self {
            job_id: metadata.job_id.clone(),
            output_path,
            total_frames: metadata.total_frames,
            fps: metadata.fps,
            video_extension: metadata.output_extension().to_string(),
            audio_extension: metadata
                .audio_codec
                .map(|c| c.extension())
                .unwrap_or("aac")
                .to_string(),
        }
    }
}

/// A muxer input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamInput {
    /// A single file.
    File(PathBuf),
    /// Ordered files read back to back as one stream.
    Seamless(Vec<PathBuf>),
}

impl StreamInput {
    /// Renders the input as an ffmpeg `-i` argument.
    pub fn to_ffmpeg_input(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Seamless(paths) => {
                let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                format!("concat:{}", joined.join("|"))
            }
        }
    }
}

/// Lossless concatenation of one stream's segments.
#[derive(Debug, Clone)]
pub struct ConcatRequest {
    pub segments: Vec<PathBuf>,
    /// File list handed to the concat demuxer.
    pub list_file: PathBuf,
    pub output: PathBuf,
    pub total_frames: u64,
    pub fps: u32,
}

/// Final mux of up to two inputs. At least one is present.
#[derive(Debug, Clone)]
pub struct MuxRequest {
    pub video: Option<StreamInput>,
    pub audio: Option<StreamInput>,
    pub output: PathBuf,
    pub total_frames: u64,
    pub fps: u32,
}

/// Progress of one muxer run, in output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxProgress {
    pub frames: u64,
}

/// Sub-step of a combine whose progress is weighted into the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinePart {
    VideoConcat,
    AudioConcat,
    Mux,
}

impl CombinePart {
    pub(crate) fn index(&self) -> usize {
        match self {
            Self::VideoConcat => 0,
            Self::AudioConcat => 1,
            Self::Mux => 2,
        }
    }
}

/// Outcome of a successful combine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineResult {
    pub output_path: PathBuf,
    pub output_size: u64,
    pub elapsed_ms: u64,
    pub segments_combined: usize,
}

/// Concat demuxer file list for `segments`.
pub fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", escape_single_quotes(p)))
        .collect()
}

fn escape_single_quotes(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ArtifactRefs, ChunkStatus};
    use chrono::Utc;

    fn result(index: usize, video: Option<&str>, audio: Option<&str>) -> ChunkResult {
        ChunkResult {
            chunk_index: index,
            attempt: 1,
            status: ChunkStatus::Success,
            frames_rendered: 10,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            artifacts: ArtifactRefs {
                video: video.map(String::from),
                audio: audio.map(String::from),
            },
            error: None,
        }
    }

    #[test]
    fn test_seamless_input_renders_concat_protocol() {
        let input = StreamInput::Seamless(vec![
            PathBuf::from("/w/a.aac"),
            PathBuf::from("/w/b.aac"),
            PathBuf::from("/w/c.aac"),
        ]);
        assert_eq!(input.to_ffmpeg_input(), "concat:/w/a.aac|/w/b.aac|/w/c.aac");
        assert_eq!(StreamInput::File(PathBuf::from("/w/v.mp4")).to_ffmpeg_input(), "/w/v.mp4");
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/w/a.mp4"), PathBuf::from("/w/it's.mp4")]);
        assert_eq!(list, "file '/w/a.mp4'\nfile '/w/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_spec_shape_follows_streams() {
        let video = StreamSegments::new(vec![PathBuf::from("v0")], false);
        let audio = StreamSegments::new(vec![PathBuf::from("a0")], true);

        let spec = CombineSpec::from_streams(Some(video.clone()), None).unwrap();
        assert!(matches!(spec, CombineSpec::VideoOnly { .. }));

        let spec = CombineSpec::from_streams(Some(video), Some(audio)).unwrap();
        assert_eq!(spec.segment_count(), 2);
        assert!(spec.audio().unwrap().seamless);

        assert!(matches!(
            CombineSpec::from_streams(None, None),
            Err(CombineError::NoStreams)
        ));
    }

    #[test]
    fn test_segment_keys_in_result_order() {
        let results = vec![
            result(0, Some("c0.video"), None),
            result(1, Some("c1.video"), None),
        ];
        assert_eq!(
            segment_keys(&results, StreamKind::Video).unwrap(),
            Some(vec!["c0.video".to_string(), "c1.video".to_string()])
        );
        assert_eq!(segment_keys(&results, StreamKind::Audio).unwrap(), None);
    }

    #[test]
    fn test_segment_keys_missing_segment() {
        let results = vec![
            result(0, Some("c0.video"), Some("c0.audio")),
            result(1, Some("c1.video"), None),
        ];
        let err = segment_keys(&results, StreamKind::Audio).unwrap_err();
        assert!(matches!(
            err,
            CombineError::MissingSegment { chunk_index: 1, .. }
        ));
    }
}
