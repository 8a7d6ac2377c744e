use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::core::telemetry::TelemetrySnapshot;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Number of tools offered to each session
    pub tools: usize,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        tools: state.tool_table().len(),
    })
}

/// Recent tool and model calls with aggregate stats
pub async fn telemetry(State(state): State<Arc<AppState>>) -> Json<TelemetrySnapshot> {
    Json(state.telemetry.snapshot(state.config.telemetry_ui_limit))
}
