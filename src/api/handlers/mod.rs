//! REST endpoint handlers organized by resource.

pub mod connection;
pub mod entity;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::api_routes())
        .merge(entity::routes())
        .merge(connection::routes())
}
