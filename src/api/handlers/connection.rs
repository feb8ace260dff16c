//! Connection listing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::ConnectionDto;
use crate::app_state::AppState;

/// `GET /connections`: Active link connections, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    tag = "Connections",
    summary = "List active connections",
    responses(
        (status = 200, description = "Active connections", body = Vec<ConnectionDto>),
    )
)]
pub async fn list_connections(State(state): State<AppState>) -> impl IntoResponse {
    let mut connections: Vec<ConnectionDto> = state
        .link
        .connections()
        .active()
        .await
        .iter()
        .map(ConnectionDto::from)
        .collect();
    connections.sort_by_key(|c| c.id);
    (StatusCode::OK, Json(connections))
}

/// Connection routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/connections", get(list_connections))
}
