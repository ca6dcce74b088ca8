//! FFmpeg-based muxer implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use super::config::CombinerConfig;
use super::error::CombineError;
use super::traits::MediaMuxer;
use super::types::{concat_list, ConcatRequest, MuxProgress, MuxRequest};

/// Muxer that shells out to ffmpeg with stream copy.
pub struct FfmpegMuxer {
    config: CombinerConfig,
}

impl FfmpegMuxer {
    /// Creates a new FFmpeg muxer with the given configuration.
    pub fn new(config: CombinerConfig) -> Self {
        Self { config }
    }

    /// Creates a muxer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CombinerConfig::default())
    }

    /// Global arguments shared by every run, ahead of the output path.
    fn trailing_args(&self, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            "copy".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output.display().to_string());
        args
    }

    /// Builds ffmpeg arguments for a concat-demuxer run.
    fn build_concat_args(&self, request: &ConcatRequest) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            request.list_file.display().to_string(),
        ];
        args.extend(self.trailing_args(&request.output));
        args
    }

    /// Builds ffmpeg arguments for the final mux.
    fn build_mux_args(&self, request: &MuxRequest) -> Result<Vec<String>, CombineError> {
        let mut args = vec!["-y".to_string()];
        match (&request.video, &request.audio) {
            (Some(video), Some(audio)) => {
                args.extend([
                    "-i".to_string(),
                    video.to_ffmpeg_input(),
                    "-i".to_string(),
                    audio.to_ffmpeg_input(),
                    "-map".to_string(),
                    "0:v:0".to_string(),
                    "-map".to_string(),
                    "1:a:0".to_string(),
                ]);
            }
            (Some(input), None) | (None, Some(input)) => {
                args.extend(["-i".to_string(), input.to_ffmpeg_input()]);
            }
            (None, None) => return Err(CombineError::NoStreams),
        }
        args.extend(self.trailing_args(&request.output));
        Ok(args)
    }

    /// Converts an ffmpeg `out_time` value (microseconds) to output frames.
    fn frames_at(out_time_us: u64, fps: u32) -> u64 {
        out_time_us.saturating_mul(fps as u64) / 1_000_000
    }

    /// Runs ffmpeg, forwarding progress, enforcing the timeout.
    async fn run_ffmpeg(
        &self,
        args: &[String],
        output: &Path,
        fps: u32,
        total_frames: u64,
        progress_tx: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(output = %output.display(), "Running ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CombineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    CombineError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CombineError::mux_failed("ffmpeg stderr not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"out_time_(?:us|ms)=(\d+)").ok();
        let frame_regex = Regex::new(r"^frame=(\d+)").ok();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut error_output = String::new();
            let mut frames = 0u64;

            while let Ok(Some(line)) = reader.next_line().await {
                if line.contains("Error") || line.contains("error") {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }

                let mut parsed = None;
                if let Some(caps) = frame_regex.as_ref().and_then(|re| re.captures(&line)) {
                    parsed = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
                } else if let Some(caps) = time_regex.as_ref().and_then(|re| re.captures(&line)) {
                    parsed = caps
                        .get(1)
                        .and_then(|m| m.as_str().parse::<u64>().ok())
                        .map(|us| Self::frames_at(us, fps));
                }

                if let Some(value) = parsed {
                    let value = value.min(total_frames);
                    if value > frames {
                        frames = value;
                        let _ = progress_tx.try_send(MuxProgress { frames });
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(CombineError::mux_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
            }
            Ok(Err(e)) => return Err(CombineError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(CombineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(CombineError::OutputMissing {
                path: output.to_path_buf(),
            });
        }

        let _ = progress_tx.try_send(MuxProgress {
            frames: total_frames,
        });
        Ok(())
    }

    async fn check_binary(&self, path: &Path) -> Result<(), std::io::Error> {
        Command::new(path).arg("-version").output().await.map(|_| ())
    }
}

#[async_trait]
impl MediaMuxer for FfmpegMuxer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn concat(
        &self,
        request: ConcatRequest,
        progress: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError> {
        if request.segments.is_empty() {
            return Err(CombineError::mux_failed("No segments to concatenate", None));
        }
        tokio::fs::write(&request.list_file, concat_list(&request.segments)).await?;

        let args = self.build_concat_args(&request);
        self.run_ffmpeg(
            &args,
            &request.output,
            request.fps,
            request.total_frames,
            progress,
        )
        .await
    }

    async fn mux(
        &self,
        request: MuxRequest,
        progress: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError> {
        let args = self.build_mux_args(&request)?;
        self.run_ffmpeg(
            &args,
            &request.output,
            request.fps,
            request.total_frames,
            progress,
        )
        .await
    }

    async fn validate(&self) -> Result<(), CombineError> {
        if let Err(e) = self.check_binary(&self.config.ffmpeg_path).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(CombineError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(CombineError::Io(e));
        }

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;

        Ok(())
    }
}
