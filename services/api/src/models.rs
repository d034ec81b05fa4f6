//! Response bodies for the HTTP status endpoints.

use serde::Serialize;
use utoipa::ToSchema;

/// Service identity and readiness.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub app: String,
    pub version: String,
    pub status: String,
    /// Whether a Gemini credential is configured.
    pub gemini_configured: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
