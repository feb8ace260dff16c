//! System endpoints: health check and device info.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    connections: usize,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp and the number of open link connections.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.link.is_shutting_down() {
        "shutting_down"
    } else {
        "healthy"
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections: state.link.connections().len().await,
        }),
    )
}

/// `GET /api/v1/device-info`: Device info sent to new connections.
#[utoipa::path(
    get,
    path = "/api/v1/device-info",
    tag = "System",
    summary = "Current device info",
    description = "Returns the JSON object every client receives right after connecting.",
    responses(
        (status = 200, description = "Device info object", body = serde_json::Value),
    )
)]
pub async fn device_info_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.link.device_info().await))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}

/// System routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/device-info", get(device_info_handler))
}
