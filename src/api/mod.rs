//! HTTP/JSON API Layer
//!
//! Thin boundary in front of the ingestion core: deserialize, forward,
//! report. All idempotence and atomicity guarantees live in the core, not
//! here.
//!
//! ## Architecture
//! ```text
//! Upload client / storage-event webhook
//!       ↓ HTTP POST, JSON body
//! Axum Router
//!       ↓
//! Ingestor (validate → extract → transactional write)
//!       ↓
//! PostgresStore (twelve normalized tables)
//! ```

pub mod replays;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ingest::Ingestor;

/// Shared state available to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub ingestor: Arc<Ingestor>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full API router
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(replays::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server on the given port
pub async fn start_api_server(
    ingestor: Arc<Ingestor>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = ApiState { ingestor };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
