//! ReplayService — replay upload and storage-event endpoints
//!
//! Endpoints:
//! - POST /replays/upload       (synchronous trigger: full document in body)
//! - POST /events/replay-blob   (asynchronous trigger: storage-change webhook)

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use tracing::warn;

use super::ApiState;
use crate::ingest::{BlobEvent, IngestOutcome};
use crate::replay::RawLogDocument;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/replays/upload", post(upload_replay))
        .route("/events/replay-blob", post(replay_blob_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct UploadResponse {
    pub accepted: bool,
    pub table_id: Option<i64>,
    pub rows_written: u64,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BlobEventResponse {
    pub processed: bool,
    pub skipped_stale: bool,
    pub table_id: Option<i64>,
    pub error: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn upload_replay(
    State(state): State<ApiState>,
    Json(doc): Json<RawLogDocument>,
) -> (StatusCode, Json<UploadResponse>) {
    match state.ingestor.ingest_document(&doc).await {
        Ok(report) => (
            StatusCode::OK,
            Json(UploadResponse {
                accepted: true,
                table_id: Some(report.table_id),
                rows_written: report.rows.total(),
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Replay upload rejected: {}", e);
            let status = if e.is_rejection() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(UploadResponse {
                    accepted: false,
                    table_id: None,
                    rows_written: 0,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Non-2xx on infrastructure failure so the event source redelivers;
/// a stale skip is a successful no-op.
async fn replay_blob_event(
    State(state): State<ApiState>,
    Json(event): Json<BlobEvent>,
) -> (StatusCode, Json<BlobEventResponse>) {
    match state.ingestor.handle_blob_event(&event).await {
        Ok(IngestOutcome::Ingested(report)) => (
            StatusCode::OK,
            Json(BlobEventResponse {
                processed: true,
                skipped_stale: false,
                table_id: Some(report.table_id),
                error: None,
            }),
        ),
        Ok(IngestOutcome::SkippedStale { .. }) => (
            StatusCode::OK,
            Json(BlobEventResponse {
                processed: false,
                skipped_stale: true,
                table_id: None,
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Replay blob event failed: {}", e);
            let status = if e.is_rejection() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(BlobEventResponse {
                    processed: false,
                    skipped_stale: false,
                    table_id: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
