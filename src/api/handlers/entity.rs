//! Entity handlers: schema listing and outbound value push.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::api::dto::{EntityDto, SchemaResponse, SetValueRequest};
use crate::app_state::AppState;
use crate::domain::EntityValue;
use crate::error::{ErrorResponse, LinkError};

/// `GET /entities`: Outbound and inbound entity schemas.
#[utoipa::path(
    get,
    path = "/api/v1/entities",
    tag = "Entities",
    summary = "List entity schemas",
    description = "Returns every outbound (broadcast) and inbound (command) entity in definition order.",
    responses(
        (status = 200, description = "Entity schemas", body = SchemaResponse),
    )
)]
pub async fn list_entities(State(state): State<AppState>) -> impl IntoResponse {
    let outbound = state.link.outbound().definitions().await;
    let inbound = state.link.inbound().definitions().await;
    let response = SchemaResponse {
        outbound: outbound.iter().map(|e| EntityDto::from(e.as_ref())).collect(),
        inbound: inbound.iter().map(|e| EntityDto::from(e.as_ref())).collect(),
    };
    (StatusCode::OK, Json(response))
}

/// `PUT /entities/{name}`: Store an outbound value for the next broadcast.
///
/// # Errors
///
/// Returns [`LinkError::UnknownEntity`] (404) for an undefined name and
/// [`LinkError::ArityMismatch`] (400) for a value of the wrong shape.
#[utoipa::path(
    put,
    path = "/api/v1/entities/{name}",
    tag = "Entities",
    summary = "Set an outbound entity value",
    description = "Validates the value against the entity's layout and stores it; it is sent with the next broadcast frame.",
    params(("name" = String, Path, description = "Outbound entity name")),
    request_body = SetValueRequest,
    responses(
        (status = 204, description = "Value stored"),
        (status = 400, description = "Value does not match the entity layout", body = ErrorResponse),
        (status = 404, description = "Unknown entity", body = ErrorResponse),
    )
)]
pub async fn set_entity_value(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetValueRequest>,
) -> Result<impl IntoResponse, LinkError> {
    state.link.push(name, EntityValue::from(req.value)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Entity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entities", get(list_entities))
        .route("/entities/{name}", put(set_entity_value))
}
