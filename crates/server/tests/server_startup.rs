//! Tests against the real `chunkrender` binary.
//!
//! The binary is configured from a TOML file plus `CHUNKRENDER_*` overrides
//! and talks to a worker endpoint that accepts connections but never answers,
//! so submitted renders stay running until they are cancelled.

use std::io::Write;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};

/// Worker endpoint that holds every connection open without responding.
async fn hanging_worker() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// A running server process and a client bound to it.
struct RunningServer {
    child: Child,
    base: String,
    client: Client,
    _config: NamedTempFile,
}

impl RunningServer {
    async fn start(worker_endpoint: &str) -> Self {
        let port = free_port();
        let config = config_file(&format!(
            "[server]\nhost = \"127.0.0.1\"\nport = {}\n\n[dispatcher]\nretry_delay_ms = 0\n",
            port
        ));
        let child = Command::new(env!("CARGO_BIN_EXE_chunkrender"))
            .env("CHUNKRENDER_CONFIG", config.path())
            .env("CHUNKRENDER_WORKER__ENDPOINT", worker_endpoint)
            .env("RUST_LOG", "error")
            .kill_on_drop(true)
            .spawn()
            .expect("Failed to spawn server");

        let server = Self {
            child,
            base: format!("http://127.0.0.1:{}/api/v1", port),
            client: Client::new(),
            _config: config,
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&self) {
        for _ in 0..100 {
            if self.client.get(self.url("/health")).send().await.is_ok() {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("server did not become ready");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("request failed");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn render_status(&self, id: &str) -> String {
        let (_, body) = self
            .call(reqwest::Method::GET, &format!("/renders/{}", id), None)
            .await;
        body["status"].as_str().unwrap_or_default().to_string()
    }
}

#[tokio::test]
async fn test_env_overrides_reach_running_server() {
    let endpoint = hanging_worker().await;
    let mut server = RunningServer::start(&endpoint).await;

    let (status, config) = server.call(reqwest::Method::GET, "/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["worker"]["endpoint"], json!(endpoint));
    assert_eq!(config["dispatcher"]["retry_delay_ms"], 0);
    assert_eq!(config["storage"]["backend"], "memory");

    server.child.kill().await.ok();
}

#[tokio::test]
async fn test_submit_cancel_and_conflict() {
    let endpoint = hanging_worker().await;
    let mut server = RunningServer::start(&endpoint).await;

    let (status, accepted) = server
        .call(
            reqwest::Method::POST,
            "/renders",
            Some(json!({
                "job_type": "video",
                "codec": "h264",
                "total_frames": 60,
                "frames_per_chunk": 30
            })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = accepted["id"].as_str().unwrap().to_string();
    assert_eq!(server.render_status(&id).await, "running");

    let (status, _) = server
        .call(reqwest::Method::GET, "/renders/0000000000000000", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .call(reqwest::Method::DELETE, &format!("/renders/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let cancelled = timeout(Duration::from_secs(10), async {
        while server.render_status(&id).await != "cancelled" {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(cancelled.is_ok(), "render never reached cancelled");

    let (status, body) = server
        .call(reqwest::Method::DELETE, &format!("/renders/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("cancelled"));

    server.child.kill().await.ok();
}

#[tokio::test]
async fn test_rejected_request_is_not_registered() {
    let endpoint = hanging_worker().await;
    let mut server = RunningServer::start(&endpoint).await;

    let (status, body) = server
        .call(
            reqwest::Method::POST,
            "/renders",
            Some(json!({
                "job_type": "video",
                "codec": "h264",
                "total_frames": 60,
                "out_name": "chunks/final.mp4"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("chunks/final.mp4"));

    let (_, list) = server.call(reqwest::Method::GET, "/renders", None).await;
    assert_eq!(list["total"], 0);

    server.child.kill().await.ok();
}

#[tokio::test]
async fn test_invalid_env_override_exits_with_error() {
    let config = config_file("[pricing]\nregion = \"us-east-1\"\n");
    let output = timeout(
        Duration::from_secs(5),
        Command::new(env!("CARGO_BIN_EXE_chunkrender"))
            .env("CHUNKRENDER_CONFIG", config.path())
            .env("CHUNKRENDER_PRICING__REGION", "mars-north-1")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("process did not exit")
    .expect("failed to run binary");

    assert!(!output.status.success());
}
