//! Render API end-to-end tests.
//!
//! Submit, poll and cancel renders against an in-process router backed by
//! mock workers and storage.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use chunkrender_core::{ObjectStore, WorkerError};
use common::TestFixture;

fn video_body(total_frames: u64, frames_per_chunk: u64) -> serde_json::Value {
    json!({
        "job_type": "video",
        "codec": "h264",
        "total_frames": total_frames,
        "frames_per_chunk": frames_per_chunk
    })
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["server"]["port"], 8080);
    assert_eq!(response.body["pricing"]["region"], "us-east-1");
}

#[tokio::test]
async fn test_submit_and_complete_render() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/v1/renders", video_body(90, 30)).await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_json_path!(response.body, "status", json!("running"));
    let id = response.body["id"].as_str().unwrap().to_string();

    let done = fixture.wait_for_render(&id).await;
    assert_status!(done, StatusCode::OK);
    assert_json_path!(done.body, "status", json!("succeeded"));
    assert_eq!(done.body["progress"]["chunks_done"], 3);
    assert_eq!(done.body["labels"].as_array().unwrap().len(), 4);

    let output_key = done.body["summary"]["output_key"].as_str().unwrap();
    assert!(fixture.store.get(output_key).await.is_ok());
    assert_eq!(fixture.worker.invocation_count(), 3);
}

#[tokio::test]
async fn test_failed_render_reports_error() {
    let fixture = TestFixture::with_worker(|worker| {
        worker.fail_chunk(
            0,
            WorkerError::Validation {
                message: "composition not found".to_string(),
            },
        )
    });

    let response = fixture.post("/api/v1/renders", video_body(60, 30)).await;
    assert_status!(response, StatusCode::ACCEPTED);
    let id = response.body["id"].as_str().unwrap().to_string();

    let done = fixture.wait_for_render(&id).await;
    assert_json_path!(done.body, "status", json!("failed"));
    let message = done.body["error"]["message"].as_str().unwrap();
    assert!(message.contains("composition not found"));
    assert!(done.body.get("summary").is_none());
}

#[tokio::test]
async fn test_invalid_request_rejected() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/renders",
            json!({
                "job_type": "video",
                "codec": "h264",
                "total_frames": 90,
                "fps": 0
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().is_some());
    assert_eq!(fixture.worker.invocation_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let fixture = TestFixture::new();
    let response = fixture.post_raw("/api/v1/renders", "{not json").await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_wrong_content_type_rejected() {
    let fixture = TestFixture::new();
    let response = fixture
        .post_with_content_type("/api/v1/renders", "{}", "text/plain")
        .await;
    assert_status!(response, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_get_unknown_render() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/renders/does-not-exist").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_running_render() {
    let fixture = TestFixture::with_worker(|worker| worker.hang_chunk(0));

    let response = fixture.post("/api/v1/renders", video_body(60, 30)).await;
    let id = response.body["id"].as_str().unwrap().to_string();

    // Let the dispatcher invoke the hanging chunk.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancel = fixture.delete(&format!("/api/v1/renders/{}", id)).await;
    assert_status!(cancel, StatusCode::ACCEPTED);

    let done = fixture.wait_for_render(&id).await;
    assert_json_path!(done.body, "status", json!("cancelled"));

    let again = fixture.delete(&format!("/api/v1/renders/{}", id)).await;
    assert_status!(again, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_unknown_render() {
    let fixture = TestFixture::new();
    let response = fixture.delete("/api/v1/renders/nope").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_renders() {
    let fixture = TestFixture::new();
    for _ in 0..2 {
        let response = fixture.post("/api/v1/renders", video_body(30, 30)).await;
        assert_status!(response, StatusCode::ACCEPTED);
    }

    let response = fixture.get("/api/v1/renders").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let request = axum::http::Request::builder()
        .uri("/api/v1/metrics")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(fixture.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("chunkrender_http_requests_total"));
    assert!(text.contains("chunkrender_renders_by_status"));
}

#[tokio::test]
async fn test_oldest_finished_render_evicted() {
    let fixture = TestFixture::with_config(|config| config.server.max_finished_renders = 1);

    let first = fixture.post("/api/v1/renders", video_body(30, 30)).await;
    let first_id = first.body["id"].as_str().unwrap().to_string();
    let done = fixture.wait_for_render(&first_id).await;
    assert_json_path!(done.body, "status", json!("succeeded"));

    let second = fixture.post("/api/v1/renders", video_body(30, 30)).await;
    let second_id = second.body["id"].as_str().unwrap().to_string();
    let done = fixture.wait_for_render(&second_id).await;
    assert_json_path!(done.body, "status", json!("succeeded"));

    let evicted = fixture.get(&format!("/api/v1/renders/{}", first_id)).await;
    assert_status!(evicted, StatusCode::NOT_FOUND);

    let response = fixture.get("/api/v1/renders").await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["renders"][0]["id"], json!(second_id));
}
