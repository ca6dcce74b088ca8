//! Job descriptors shared by every stage of a render.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retry::ErrorClass;

/// Kind of render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// A single image.
    Still,
    /// A frame sequence encoded into a media file.
    Video,
}

/// Output codec of a video job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Vp8,
    Vp9,
    ProRes,
    Gif,
    Mp3,
    Aac,
    Wav,
}

impl Codec {
    /// Whether this codec produces an audio-only deliverable.
    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Aac | Self::Wav)
    }

    /// Whether chunk video segments can be joined without a boundary remux.
    pub fn supports_seamless_video(&self) -> bool {
        matches!(self, Self::H264)
    }

    /// Whether the container can carry an audio track at all.
    pub fn supports_audio(&self) -> bool {
        !matches!(self, Self::Gif)
    }

    /// Inclusive CRF range accepted by the encoder, if CRF applies.
    pub fn crf_range(&self) -> Option<(u8, u8)> {
        match self {
            Self::H264 => Some((1, 51)),
            Self::H265 => Some((0, 51)),
            Self::Vp8 | Self::Vp9 => Some((4, 63)),
            _ => None,
        }
    }

    /// Audio codec used when the caller does not pick one.
    pub fn default_audio_codec(&self) -> Option<AudioCodec> {
        match self {
            Self::H264 | Self::H265 => Some(AudioCodec::Aac),
            Self::Vp8 | Self::Vp9 => Some(AudioCodec::Opus),
            Self::ProRes | Self::Wav => Some(AudioCodec::PcmS16le),
            Self::Mp3 => Some(AudioCodec::Mp3),
            Self::Aac => Some(AudioCodec::Aac),
            Self::Gif => None,
        }
    }

    /// File extension of the final deliverable.
    pub fn file_extension(&self, audio_codec: Option<AudioCodec>) -> &'static str {
        match self {
            Self::H264 => {
                if audio_codec == Some(AudioCodec::PcmS16le) {
                    "mkv"
                } else {
                    "mp4"
                }
            }
            Self::H265 => "mp4",
            Self::Vp8 | Self::Vp9 => "webm",
            Self::ProRes => "mov",
            Self::Gif => "gif",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
        }
    }
}

/// Codec of the audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioCodec {
    Aac,
    Mp3,
    Opus,
    PcmS16le,
}

impl AudioCodec {
    /// File extension of a standalone audio stream.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::PcmS16le => "wav",
        }
    }

    /// Whether segments must be joined without re-encoding.
    ///
    /// AAC carries encoder priming state across packets; re-encoding the
    /// boundaries produces audible gaps.
    pub fn supports_seamless(&self) -> bool {
        matches!(self, Self::Aac)
    }
}

/// Access control applied to the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Privacy {
    Public,
    #[default]
    Private,
    NoAcl,
}

/// Lifecycle rule for every object of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteAfter {
    #[serde(rename = "1-day")]
    OneDay,
    #[serde(rename = "3-days")]
    ThreeDays,
    #[serde(rename = "7-days")]
    SevenDays,
    #[serde(rename = "30-days")]
    ThirtyDays,
}

impl DeleteAfter {
    /// Key segment used as the lifecycle prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1-day",
            Self::ThreeDays => "3-days",
            Self::SevenDays => "7-days",
            Self::ThirtyDays => "30-days",
        }
    }
}

/// Half-open frame interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
}

impl FrameRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caller input for a render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub job_type: JobType,
    /// Total frames of the composition (video jobs).
    #[serde(default)]
    pub total_frames: u64,
    /// Frame to render (still jobs).
    #[serde(default)]
    pub still_frame: u64,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub codec: Option<Codec>,
    #[serde(default)]
    pub audio_codec: Option<AudioCodec>,
    #[serde(default)]
    pub audio_bitrate: Option<String>,
    #[serde(default)]
    pub crf: Option<u8>,
    /// Overrides the planner's frames-per-chunk choice.
    #[serde(default)]
    pub frames_per_chunk: Option<u64>,
    /// Overrides the configured target concurrency.
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub out_name: Option<String>,
    /// Output goes to a caller-owned destination.
    #[serde(default)]
    pub custom_output: bool,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub delete_after: Option<DeleteAfter>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Keep intermediate artifacts for diagnostics.
    #[serde(default)]
    pub skip_cleanup: bool,
    /// Version of the caller, checked by workers.
    #[serde(default)]
    pub version: Option<String>,
}

fn default_fps() -> u32 {
    30
}

impl RenderRequest {
    /// A video request with defaults for everything but codec and length.
    pub fn video(codec: Codec, total_frames: u64) -> Self {
        Self {
            job_type: JobType::Video,
            total_frames,
            still_frame: 0,
            fps: default_fps(),
            codec: Some(codec),
            audio_codec: None,
            audio_bitrate: None,
            crf: None,
            frames_per_chunk: None,
            concurrency: None,
            out_name: None,
            custom_output: false,
            privacy: Privacy::default(),
            delete_after: None,
            max_retries: None,
            skip_cleanup: false,
            version: None,
        }
    }

    /// A still request for one frame.
    pub fn still(frame: u64) -> Self {
        Self {
            job_type: JobType::Still,
            total_frames: 1,
            still_frame: frame,
            codec: None,
            ..Self::video(Codec::H264, 1)
        }
    }

    /// Audio codec after applying the codec's default.
    pub fn resolved_audio_codec(&self) -> Option<AudioCodec> {
        match self.codec {
            Some(codec) if codec.supports_audio() => {
                self.audio_codec.or_else(|| codec.default_audio_codec())
            }
            _ => None,
        }
    }
}

/// Immutable job descriptor, persisted at job start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMetadata {
    pub job_id: String,
    pub job_type: JobType,
    pub total_frames: u64,
    pub frames_per_chunk: u64,
    pub total_chunks: usize,
    pub fps: u32,
    pub codec: Option<Codec>,
    pub audio_codec: Option<AudioCodec>,
    pub audio_bitrate: Option<String>,
    pub estimated_total_invocations: usize,
    pub estimated_render_invocations: usize,
    pub created_at: DateTime<Utc>,
    pub delete_after: Option<DeleteAfter>,
    pub privacy: Privacy,
    pub out_name: Option<String>,
    pub memory_size_mb: u32,
    pub region: String,
    pub version: String,
}

impl RenderMetadata {
    /// Whether the job produces a video stream.
    pub fn has_video(&self) -> bool {
        match (self.job_type, self.codec) {
            (JobType::Still, _) => true,
            (JobType::Video, Some(codec)) => !codec.is_audio_only(),
            (JobType::Video, None) => false,
        }
    }

    /// Whether the job produces an audio stream.
    pub fn has_audio(&self) -> bool {
        self.job_type == JobType::Video && self.audio_codec.is_some()
    }

    /// Extension of the final output object.
    pub fn output_extension(&self) -> &'static str {
        match self.codec {
            Some(codec) => codec.file_extension(self.audio_codec),
            None => "png",
        }
    }
}

/// One unit of dispatch. Never mutated; retries build a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkJob {
    pub job_id: String,
    pub chunk_index: usize,
    pub frame_range: FrameRange,
    pub attempt: u32,
}

impl ChunkJob {
    /// The same chunk, one attempt later.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Outcome status of one chunk attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Success,
    Failed,
}

/// Object keys of the segments a chunk produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl ArtifactRefs {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// Outcome of one chunk attempt, as handed back by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub attempt: u32,
    pub status: ChunkStatus,
    pub frames_rendered: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub artifacts: ArtifactRefs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }

    /// Timing marker derived from the wall-clock bounds.
    pub fn timing(&self) -> ChunkTiming {
        ChunkTiming {
            chunk_index: self.chunk_index,
            attempt: self.attempt,
            start_ms: self.started_at.timestamp_millis(),
            end_ms: self.ended_at.timestamp_millis(),
        }
    }
}

/// Start/end of one chunk attempt in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTiming {
    pub chunk_index: usize,
    pub attempt: u32,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl ChunkTiming {
    /// Wall-clock duration, clamped at zero for skewed clocks.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms).max(0) as u64
    }
}

/// One failed attempt of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub attempt: u32,
    pub class: ErrorClass,
    pub message: String,
    pub will_retry: bool,
}

/// Failure history of one chunk. Accumulates and never resets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub chunk_index: usize,
    pub attempts: u32,
    pub failures: Vec<FailureRecord>,
}

impl RetryRecord {
    pub fn new(chunk_index: usize) -> Self {
        Self {
            chunk_index,
            attempts: 0,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_attempt_keeps_range() {
        let job = ChunkJob {
            job_id: "job-1".to_string(),
            chunk_index: 2,
            frame_range: FrameRange::new(68, 100),
            attempt: 1,
        };
        let retry = job.next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.frame_range, job.frame_range);
        assert_eq!(retry.chunk_index, 2);
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn test_codec_extensions() {
        assert_eq!(Codec::H264.file_extension(Some(AudioCodec::Aac)), "mp4");
        assert_eq!(Codec::H264.file_extension(Some(AudioCodec::PcmS16le)), "mkv");
        assert_eq!(Codec::Vp9.file_extension(None), "webm");
        assert_eq!(Codec::Mp3.file_extension(None), "mp3");
    }

    #[test]
    fn test_resolved_audio_codec() {
        let request = RenderRequest::video(Codec::H264, 100);
        assert_eq!(request.resolved_audio_codec(), Some(AudioCodec::Aac));

        let gif = RenderRequest::video(Codec::Gif, 100);
        assert_eq!(gif.resolved_audio_codec(), None);

        assert_eq!(RenderRequest::still(5).resolved_audio_codec(), None);
    }

    #[test]
    fn test_delete_after_serialization() {
        let json = serde_json::to_string(&DeleteAfter::SevenDays).unwrap();
        assert_eq!(json, "\"7-days\"");
        let parsed: DeleteAfter = serde_json::from_str("\"1-day\"").unwrap();
        assert_eq!(parsed, DeleteAfter::OneDay);
    }

    #[test]
    fn test_timing_duration_clamped() {
        let timing = ChunkTiming {
            chunk_index: 0,
            attempt: 1,
            start_ms: 2_000,
            end_ms: 1_500,
        };
        assert_eq!(timing.duration_ms(), 0);
    }

    #[test]
    fn test_timing_duration_saturates_at_extremes() {
        let timing = ChunkTiming {
            chunk_index: 0,
            attempt: 1,
            start_ms: i64::MIN,
            end_ms: i64::MAX,
        };
        assert_eq!(timing.duration_ms(), i64::MAX as u64);

        let reversed = ChunkTiming {
            start_ms: i64::MAX,
            end_ms: i64::MIN,
            ..timing
        };
        assert_eq!(reversed.duration_ms(), 0);
    }
}
