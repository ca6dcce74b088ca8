//! Render API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use chunkrender_core::{validate_request, ProgressSnapshot, RenderRequest, RenderSummary};

use crate::metrics::RENDERS_SUBMITTED_TOTAL;
use crate::state::{AppState, RenderEntry, RenderFailure, RenderStatus};

// ============================================================================
// Response Types
// ============================================================================

/// Response for an accepted render
#[derive(Debug, Serialize)]
pub struct RenderAcceptedResponse {
    pub id: String,
    pub status: RenderStatus,
}

/// Full view of one render
#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub id: String,
    pub status: RenderStatus,
    pub created_at: DateTime<Utc>,
    pub progress: ProgressSnapshot,
    /// Human-facing line per stage
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RenderSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RenderFailure>,
}

impl RenderResponse {
    fn from_entry(id: &str, entry: &RenderEntry) -> Self {
        let progress = entry.progress.borrow().clone();
        Self {
            id: id.to_string(),
            status: entry.status,
            created_at: entry.created_at,
            labels: progress.labels(),
            progress,
            summary: entry.summary.clone(),
            error: entry.failure.clone(),
        }
    }
}

/// Compact entry for listing
#[derive(Debug, Serialize)]
pub struct RenderListItem {
    pub id: String,
    pub status: RenderStatus,
    pub created_at: DateTime<Utc>,
}

/// Response for listing renders
#[derive(Debug, Serialize)]
pub struct ListRendersResponse {
    pub renders: Vec<RenderListItem>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct RenderErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(RenderErrorResponse {
            error: error.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a render. The job runs in the background.
pub async fn create_render(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RenderRequest>,
) -> Result<(StatusCode, Json<RenderAcceptedResponse>), impl IntoResponse> {
    if let Err(e) = validate_request(&request) {
        return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let id = state.submit(request).await;
    RENDERS_SUBMITTED_TOTAL.inc();
    info!(job_id = %id, "Render submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RenderAcceptedResponse {
            id,
            status: RenderStatus::Running,
        }),
    ))
}

/// List renders, newest first
pub async fn list_renders(State(state): State<Arc<AppState>>) -> Json<ListRendersResponse> {
    let renders = state.renders().read().await;
    let mut items: Vec<RenderListItem> = renders
        .iter()
        .map(|(id, entry)| RenderListItem {
            id: id.clone(),
            status: entry.status,
            created_at: entry.created_at,
        })
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(ListRendersResponse {
        total: items.len(),
        renders: items,
    })
}

/// Get one render with its progress
pub async fn get_render(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RenderResponse>, impl IntoResponse> {
    let renders = state.renders().read().await;
    match renders.get(&id) {
        Some(entry) => Ok(Json(RenderResponse::from_entry(&id, entry))),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Render not found: {}", id),
        )),
    }
}

/// Cancel a running render
pub async fn cancel_render(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RenderAcceptedResponse>), impl IntoResponse> {
    match state.cancel(&id).await {
        Some(status) if status.is_terminal() => Err(error_response(
            StatusCode::CONFLICT,
            format!("Render {} already {}", id, status.as_str()),
        )),
        Some(status) => {
            info!(job_id = %id, "Render cancellation requested");
            Ok((StatusCode::ACCEPTED, Json(RenderAcceptedResponse { id, status })))
        }
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Render not found: {}", id),
        )),
    }
}
