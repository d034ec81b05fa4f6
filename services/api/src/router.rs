//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the status endpoints, the conversation WebSocket, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{HealthResponse, StatusResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::root_status, handlers::health),
    components(schemas(StatusResponse, HealthResponse)),
    tags(
        (name = "EchoSpeak API", description = "Voice conversation relay for language practice")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::root_status))
        .route("/health", get(handlers::health))
        .route("/ws/conversation", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
