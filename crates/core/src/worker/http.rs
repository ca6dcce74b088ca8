//! Render worker reached over HTTP.
//!
//! `POST {endpoint}/chunks` with a [`WorkerRequest`]. A 2xx response carries
//! the [`ChunkResult`]; any other status carries a [`WorkerErrorBody`].
//!
//! A worker may instead answer `application/x-ndjson`: one
//! [`WorkerStreamLine`] per line, any number of progress lines and then a
//! single result or error line. Progress lines are forwarded as
//! `Rendering` events while the chunk is still running.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::WorkerConfig;
use super::traits::{JobContext, RenderWorker};
use crate::job::{ChunkJob, ChunkResult, RenderMetadata};
use crate::progress::{ProgressEvent, ProgressHandle};
use crate::retry::{TmpDirState, WorkerError};

/// Request body sent to the worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: ChunkJob,
    pub metadata: RenderMetadata,
    pub version: String,
}

/// Structured error body returned by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerErrorBody {
    #[serde(default)]
    pub kind: Option<String>,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub worker_version: Option<String>,
    #[serde(default)]
    pub tmp_dir: Option<TmpDirState>,
}

impl WorkerErrorBody {
    fn into_error(self, caller_version: &str) -> WorkerError {
        match self.kind.as_deref() {
            Some("flaky") => WorkerError::Flaky {
                message: self.message,
            },
            Some("validation") => WorkerError::Validation {
                message: self.message,
            },
            Some("version_mismatch") => WorkerError::VersionMismatch {
                worker: self.worker_version.unwrap_or_else(|| "unknown".to_string()),
                caller: caller_version.to_string(),
            },
            Some("fatal") => WorkerError::Fatal {
                message: self.message,
            },
            Some("storage_exhaustion") => WorkerError::StorageExhaustion {
                message: self.message,
                tmp_dir: self.tmp_dir,
            },
            _ => WorkerError::from_message(self.message, self.stack),
        }
    }
}

/// One line of a streamed worker response.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerStreamLine {
    Progress { frames_rendered: u64 },
    Result(ChunkResult),
    Error(WorkerErrorBody),
}

/// Parses one streamed line. Blank lines yield `None`.
pub fn parse_stream_line(line: &[u8]) -> Result<Option<WorkerStreamLine>, WorkerError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(line)
        .map(Some)
        .map_err(|e| WorkerError::failure(format!("invalid worker stream line: {}", e)))
}

/// Worker client over HTTP.
pub struct HttpRenderWorker {
    client: Client,
    endpoint: String,
    request_timeout_ms: u64,
}

impl HttpRenderWorker {
    pub fn new(config: WorkerConfig) -> Result<Self, WorkerError> {
        if config.endpoint.trim().is_empty() {
            return Err(WorkerError::Fatal {
                message: "worker endpoint is not configured".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| WorkerError::Fatal {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            request_timeout_ms: config.request_timeout_ms,
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> WorkerError {
        if err.is_timeout() {
            WorkerError::Timeout {
                timeout_ms: self.request_timeout_ms,
            }
        } else if err.is_connect() {
            WorkerError::flaky(format!("connection failed: {}", err))
        } else {
            WorkerError::from_message(err.to_string(), None)
        }
    }

    /// Reads an NDJSON response until its result or error line.
    async fn read_stream(
        &self,
        mut response: Response,
        job: &ChunkJob,
        ctx: &JobContext,
        progress: &ProgressHandle,
    ) -> Result<ChunkResult, WorkerError> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;
        while !finished {
            match response
                .chunk()
                .await
                .map_err(|e| self.map_transport_error(e))?
            {
                Some(bytes) => buffer.extend_from_slice(&bytes),
                None => finished = true,
            }

            loop {
                let line: Vec<u8> = match buffer.iter().position(|b| *b == b'\n') {
                    Some(end) => buffer.drain(..=end).collect(),
                    // The last line may lack a trailing newline.
                    None if finished && !buffer.is_empty() => std::mem::take(&mut buffer),
                    None => break,
                };
                match parse_stream_line(&line)? {
                    None => {}
                    Some(WorkerStreamLine::Progress { frames_rendered }) => {
                        progress
                            .emit(ProgressEvent::Rendering {
                                chunk_index: job.chunk_index,
                                frames_rendered,
                            })
                            .await;
                    }
                    Some(WorkerStreamLine::Result(result)) => return Ok(result),
                    Some(WorkerStreamLine::Error(body)) => {
                        return Err(body.into_error(&ctx.caller_version))
                    }
                }
            }
        }
        Err(WorkerError::failure("worker stream ended without a result"))
    }
}

fn is_ndjson(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-ndjson"))
        .unwrap_or(false)
}

#[async_trait]
impl RenderWorker for HttpRenderWorker {
    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(
        &self,
        job: &ChunkJob,
        ctx: &JobContext,
        progress: ProgressHandle,
    ) -> Result<ChunkResult, WorkerError> {
        let url = format!("{}/chunks", self.endpoint);
        debug!(
            job_id = %job.job_id,
            chunk = job.chunk_index,
            attempt = job.attempt,
            "Invoking HTTP worker"
        );

        let body = WorkerRequest {
            job: job.clone(),
            metadata: (*ctx.metadata).clone(),
            version: ctx.caller_version.clone(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            if is_ndjson(&response) {
                return self.read_stream(response, job, ctx, &progress).await;
            }
            return response
                .json::<ChunkResult>()
                .await
                .map_err(|e| WorkerError::failure(format!("invalid worker response: {}", e)));
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<WorkerErrorBody>(&text) {
            Ok(body) => Err(body.into_error(&ctx.caller_version)),
            Err(_) if is_gateway_status(status) => {
                Err(WorkerError::flaky(format!("worker gateway returned {}", status)))
            }
            Err(_) => Err(WorkerError::from_message(
                format!("worker returned {}: {}", status, text),
                None,
            )),
        }
    }
}

fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}
