//! Application callbacks and their isolation.
//!
//! The owning application implements [`LinkHandler`] and passes it to
//! [`super::LinkService::new`]. Every call goes through [`invoke`], which
//! logs returned errors and caught panics instead of letting them reach a
//! receive loop or the broadcast loop.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;

use crate::codec::DecodedEntity;
use crate::domain::ConnectionInfo;

/// Error type application callbacks may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Capability set injected into the link service.
///
/// All methods default to doing nothing. Callbacks run on the connection's
/// receive task, so long work should be handed off to another task.
pub trait LinkHandler: Send + Sync + 'static {
    /// A connection became active and has received the device info.
    fn on_connect(&self, _conn: &ConnectionInfo) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A connection was closed and removed.
    fn on_disconnect(&self, _conn: &ConnectionInfo) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A `SET+` configuration object arrived. An error turns the reply into
    /// an error envelope.
    fn on_config(&self, _conn: &ConnectionInfo, _config: Value) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A `DATA+` telemetry payload arrived.
    fn on_telemetry(&self, _conn: &ConnectionInfo, _data: Value) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A binary command frame was decoded and applied to the inbound registry.
    fn on_entities(
        &self,
        _conn: &ConnectionInfo,
        _entities: &[DecodedEntity],
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl LinkHandler for NoopHandler {}

/// Handler that logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl LinkHandler for LoggingHandler {
    fn on_connect(&self, conn: &ConnectionInfo) -> Result<(), HandlerError> {
        tracing::info!(conn_id = %conn.id, addr = %conn.addr, "client connected");
        Ok(())
    }

    fn on_disconnect(&self, conn: &ConnectionInfo) -> Result<(), HandlerError> {
        tracing::info!(conn_id = %conn.id, addr = %conn.addr, "client disconnected");
        Ok(())
    }

    fn on_config(&self, conn: &ConnectionInfo, config: Value) -> Result<(), HandlerError> {
        tracing::info!(conn_id = %conn.id, %config, "device config received");
        Ok(())
    }

    fn on_telemetry(&self, conn: &ConnectionInfo, data: Value) -> Result<(), HandlerError> {
        tracing::debug!(conn_id = %conn.id, %data, "io data received");
        Ok(())
    }

    fn on_entities(
        &self,
        conn: &ConnectionInfo,
        entities: &[DecodedEntity],
    ) -> Result<(), HandlerError> {
        for entity in entities {
            tracing::debug!(conn_id = %conn.id, entity = %entity.name, value = ?entity.value, "command entity");
        }
        Ok(())
    }
}

/// Runs one callback, converting errors and panics into a logged message.
///
/// Returns the failure message so callers can report it to the peer.
pub(crate) fn invoke<F>(callback: &'static str, conn: &ConnectionInfo, f: F) -> Result<(), String>
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    let message = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string()),
    };
    tracing::warn!(conn_id = %conn.id, callback, error = %message, "handler failed");
    Err(message)
}
