//! Axum Handlers for the HTTP status endpoints
//!
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::{
    models::{HealthResponse, StatusResponse},
    state::AppState,
};

pub const APP_NAME: &str = "EchoSpeak API";

/// Report service identity and whether the conversation backend is configured.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service status", body = StatusResponse)
    )
)]
pub async fn root_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        app: APP_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        gemini_configured: state.config.gemini_configured(),
    })
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
