//! Liveness and health endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// GET / - liveness check
pub async fn index() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Model server is running",
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub model_loaded: bool,
    pub model_path: Option<String>,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.model_loaded(),
        model_path: state.model_path().map(|p| p.display().to_string()),
    })
}
