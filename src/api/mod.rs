//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root next to the link WebSocket endpoint.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};
use crate::ws::handler::ws_handler;

/// OpenAPI document of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "mammoth-link",
        description = "Inspection and value push endpoints of the mammoth telemetry link"
    ),
    paths(
        handlers::system::health_handler,
        handlers::system::device_info_handler,
        handlers::entity::list_entities,
        handlers::entity::set_entity_value,
        handlers::connection::list_connections,
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        handlers::system::HealthResponse,
        dto::EntityDto,
        dto::SchemaResponse,
        dto::SetValueRequest,
        dto::ConnectionDto,
    )),
    tags(
        (name = "System", description = "Health and device info"),
        (name = "Entities", description = "Entity schemas and outbound values"),
        (name = "Connections", description = "Active link connections"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

/// Builds the full application: REST endpoints plus the link WebSocket at
/// `/` and `/ws`.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// WebSocket handler needs the peer address.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(build_router())
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
