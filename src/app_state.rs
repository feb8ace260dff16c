//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::LinkService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Link service for connections, registries and device info.
    pub link: Arc<LinkService>,
}

impl AppState {
    /// Wraps a link service.
    #[must_use]
    pub fn new(link: Arc<LinkService>) -> Self {
        Self { link }
    }
}
