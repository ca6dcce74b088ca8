//! Object key layout for a job.
//!
//! Every object of a job lives under one prefix so that listing the prefix
//! reconstructs the job's state without a live coordinator. Keys are
//! namespaced by chunk index; no two workers ever write the same key.

use super::types::{ChunkTiming, DeleteAfter};

const METADATA_FILE: &str = "pre-render-metadata.json";
const SUMMARY_FILE: &str = "post-render-metadata.json";
const CHUNKS_DIR: &str = "chunks/";
const TIMINGS_DIR: &str = "timings/";
const ERRORS_DIR: &str = "errors/";

/// Kind of per-chunk segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Root prefix of all objects of a job.
pub fn job_prefix(job_id: &str, delete_after: Option<DeleteAfter>) -> String {
    match delete_after {
        Some(rule) => format!("{}/renders/{}/", rule.as_str(), job_id),
        None => format!("renders/{}/", job_id),
    }
}

/// Key of the persisted `RenderMetadata`.
pub fn metadata_key(prefix: &str) -> String {
    format!("{}{}", prefix, METADATA_FILE)
}

/// Key of the persisted post-render summary.
pub fn summary_key(prefix: &str) -> String {
    format!("{}{}", prefix, SUMMARY_FILE)
}

/// Prefix under which timing markers are written.
pub fn timings_prefix(prefix: &str) -> String {
    format!("{}{}", prefix, TIMINGS_DIR)
}

/// Prefix under which chunk segments are written.
pub fn chunks_prefix(prefix: &str) -> String {
    format!("{}{}", prefix, CHUNKS_DIR)
}

/// Prefix under which error reports are written.
pub fn errors_prefix(prefix: &str) -> String {
    format!("{}{}", prefix, ERRORS_DIR)
}

/// Key of one chunk segment. Retries overwrite the same key.
pub fn chunk_key(prefix: &str, chunk_index: usize, stream: StreamKind) -> String {
    format!(
        "{}chunk-{:08}.{}",
        chunks_prefix(prefix),
        chunk_index,
        stream.as_str()
    )
}

/// Key of a timing marker; encodes the timing so a listing alone suffices.
pub fn timing_key(prefix: &str, timing: &ChunkTiming) -> String {
    format!(
        "{}chunk-{:08}-attempt-{}-start-{}-end-{}.json",
        timings_prefix(prefix),
        timing.chunk_index,
        timing.attempt,
        timing.start_ms,
        timing.end_ms
    )
}

/// Key of an error report for one failed attempt.
pub fn error_key(prefix: &str, chunk_index: usize, attempt: u32) -> String {
    format!(
        "{}chunk-{:08}-attempt-{}.json",
        errors_prefix(prefix),
        chunk_index,
        attempt
    )
}

/// Whether a job-relative name collides with an object the pipeline
/// writes or deletes on its own.
pub fn is_reserved_name(name: &str) -> bool {
    name == METADATA_FILE
        || name == SUMMARY_FILE
        || [CHUNKS_DIR, TIMINGS_DIR, ERRORS_DIR]
            .iter()
            .any(|dir| name.starts_with(dir) || name == dir.trim_end_matches('/'))
}

/// Key of the final output.
pub fn output_key(prefix: &str, out_name: Option<&str>, extension: &str) -> String {
    match out_name {
        Some(name) => format!("{}{}", prefix, name),
        None => format!("{}out.{}", prefix, extension),
    }
}

/// Recovers a timing marker from its key. Returns `None` for foreign keys.
pub fn parse_timing_key(key: &str) -> Option<ChunkTiming> {
    let file = key.rsplit('/').next()?;
    let rest = file.strip_prefix("chunk-")?.strip_suffix(".json")?;

    let (chunk, rest) = rest.split_once("-attempt-")?;
    let (attempt, rest) = rest.split_once("-start-")?;
    let (start, end) = rest.split_once("-end-")?;

    Some(ChunkTiming {
        chunk_index: chunk.parse().ok()?,
        attempt: attempt.parse().ok()?,
        start_ms: start.parse().ok()?,
        end_ms: end.parse().ok()?,
    })
}

/// Recovers the chunk index from a segment key.
pub fn parse_chunk_key(key: &str) -> Option<(usize, StreamKind)> {
    let file = key.rsplit('/').next()?;
    let rest = file.strip_prefix("chunk-")?;
    let (index, kind) = rest.split_once('.')?;
    let stream = match kind {
        "video" => StreamKind::Video,
        "audio" => StreamKind::Audio,
        _ => return None,
    };
    Some((index.parse().ok()?, stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_with_lifecycle() {
        assert_eq!(job_prefix("abc", None), "renders/abc/");
        assert_eq!(
            job_prefix("abc", Some(DeleteAfter::ThreeDays)),
            "3-days/renders/abc/"
        );
    }

    #[test]
    fn test_timing_key_parses_back() {
        let timing = ChunkTiming {
            chunk_index: 12,
            attempt: 3,
            start_ms: 1_700_000_000_000,
            end_ms: 1_700_000_004_250,
        };
        let key = timing_key("renders/abc/", &timing);
        assert_eq!(
            key,
            "renders/abc/timings/chunk-00000012-attempt-3-start-1700000000000-end-1700000004250.json"
        );
        assert_eq!(parse_timing_key(&key), Some(timing));
    }

    #[test]
    fn test_parse_timing_key_rejects_foreign_keys() {
        assert_eq!(parse_timing_key("renders/abc/chunks/chunk-00000001.video"), None);
        assert_eq!(parse_timing_key("renders/abc/pre-render-metadata.json"), None);
    }

    #[test]
    fn test_chunk_key_round_trip() {
        let key = chunk_key("renders/abc/", 7, StreamKind::Audio);
        assert_eq!(key, "renders/abc/chunks/chunk-00000007.audio");
        assert_eq!(parse_chunk_key(&key), Some((7, StreamKind::Audio)));
    }

    #[test]
    fn test_reserved_names() {
        for name in [
            "chunks/final.mp4",
            "timings/out.mp4",
            "errors/x.mp4",
            "chunks",
            "pre-render-metadata.json",
            "post-render-metadata.json",
        ] {
            assert!(is_reserved_name(name), "{name} should be reserved");
        }
        for name in ["final.mp4", "renders/chunks.mp4", "my-chunks/out.mp4"] {
            assert!(!is_reserved_name(name), "{name} should be allowed");
        }
    }

    #[test]
    fn test_output_key() {
        assert_eq!(output_key("renders/a/", None, "mp4"), "renders/a/out.mp4");
        assert_eq!(
            output_key("renders/a/", Some("final.mp4"), "mp4"),
            "renders/a/final.mp4"
        );
    }
}
