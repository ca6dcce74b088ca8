//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock workers, muxer and storage injected, so whole renders run
//! without render workers, ffmpeg or a bucket.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use chunkrender_core::{
    testing::{MockMuxer, MockWorker},
    Config, InMemoryObjectStore, RenderOrchestrator,
};
use chunkrender_server::state::AppState;

/// Re-export fixtures for test convenience
pub use chunkrender_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_render_submission() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/renders", json!({
///         "job_type": "video",
///         "codec": "h264",
///         "total_frames": 90
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared application state
    pub state: Arc<AppState>,
    /// Object store every render writes to
    pub store: Arc<InMemoryObjectStore>,
    /// Mock worker - inspect invocations
    pub worker: Arc<MockWorker>,
    /// Mock muxer - inspect combine calls
    pub muxer: Arc<MockMuxer>,
    /// Scratch directory for combine work and local output
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with a worker that always succeeds.
    pub fn new() -> Self {
        Self::with_worker(|worker| worker)
    }

    /// Create a test fixture whose worker is scripted by `configure`.
    pub fn with_worker(configure: impl FnOnce(MockWorker) -> MockWorker) -> Self {
        Self::build(Config::default(), configure)
    }

    /// Create a test fixture with a custom configuration.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        configure(&mut config);
        Self::build(config, |worker| worker)
    }

    fn build(config: Config, configure: impl FnOnce(MockWorker) -> MockWorker) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(InMemoryObjectStore::new());
        let worker = Arc::new(configure(MockWorker::new(store.clone())));
        let muxer = Arc::new(MockMuxer::new());

        let settings = config
            .render_settings()
            .with_scratch_root(temp_dir.path())
            .with_retry_delay_ms(0);
        let orchestrator = Arc::new(RenderOrchestrator::new(
            settings,
            worker.clone(),
            muxer.clone(),
            store.clone(),
        ));

        let state = Arc::new(AppState::new(config, orchestrator));
        let router = chunkrender_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            store,
            worker,
            muxer,
            temp_dir,
        }
    }

    /// Polls a render until it leaves the running state.
    pub async fn wait_for_render(&self, id: &str) -> TestResponse {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/renders/{}", id)).await;
            if response.body["status"] != "running" {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("render {} did not finish in time", id);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("POST", path, body, "application/json").await
    }

    /// Send a POST request with custom content type (for testing wrong content types).
    pub async fn post_with_content_type(
        &self,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> TestResponse {
        self.request_raw("POST", path, body, content_type).await
    }

    /// Send a request with raw string body and custom content type.
    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder()
            .method(method)
            .uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
