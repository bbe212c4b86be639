//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Liveness probe body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub project: String,
    pub version: String,
    pub mock_mode: bool,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        project: state.settings.project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mock_mode: state.settings.mock_mode,
        uptime_seconds: state.startup_time.elapsed().as_secs(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
