//! Dispatch of inbound messages.
//!
//! Text goes through [`Command::parse`] to the configuration or telemetry
//! callback; binary frames bypass the text path and are decoded against the
//! inbound registry.

use std::sync::Arc;

use super::handler::{LinkHandler, invoke};
use crate::codec::UnknownEntityPolicy;
use crate::domain::{ConnectionInfo, EntityRegistry, Inbound};
use crate::ws::messages::{Command, Envelope};

/// Routes one inbound message and produces the reply, if any.
pub struct CommandRouter {
    handler: Arc<dyn LinkHandler>,
    inbound: Arc<EntityRegistry>,
    unknown_policy: UnknownEntityPolicy,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("unknown_policy", &self.unknown_policy)
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    /// Creates a router delivering to `handler` and decoding binary frames
    /// against `inbound`.
    #[must_use]
    pub fn new(
        handler: Arc<dyn LinkHandler>,
        inbound: Arc<EntityRegistry>,
        unknown_policy: UnknownEntityPolicy,
    ) -> Self {
        Self {
            handler,
            inbound,
            unknown_policy,
        }
    }

    /// Handles one message from `conn`.
    ///
    /// Returns the envelope to send back to that same connection, or `None`
    /// when the message is one-way (successful `DATA+`, any binary frame).
    pub async fn route(&self, conn: &ConnectionInfo, message: Inbound) -> Option<Envelope> {
        match message {
            Inbound::Text(text) => self.route_text(conn, &text),
            Inbound::Binary(frame) => {
                self.route_frame(conn, &frame).await;
                None
            }
        }
    }

    fn route_text(&self, conn: &ConnectionInfo, text: &str) -> Option<Envelope> {
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(conn_id = %conn.id, error = %err, "rejected text command");
                return Some(Envelope::from_error(&err));
            }
        };

        match command {
            Command::Set(config) => {
                let handler = Arc::clone(&self.handler);
                match invoke("on_config", conn, move || handler.on_config(conn, config)) {
                    Ok(()) => Some(Envelope::ok()),
                    Err(message) => Some(Envelope::error([
                        "Configuration rejected".to_string(),
                        message,
                    ])),
                }
            }
            Command::Data(Some(data)) => {
                let handler = Arc::clone(&self.handler);
                let _ = invoke("on_telemetry", conn, move || handler.on_telemetry(conn, data));
                None
            }
            Command::Data(None) => None,
        }
    }

    async fn route_frame(&self, conn: &ConnectionInfo, frame: &[u8]) {
        let decoded = match self.inbound.decode(frame, self.unknown_policy).await {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(conn_id = %conn.id, error = %err, len = frame.len(), "rejected binary frame");
                return;
            }
        };

        if !decoded.skipped.is_empty() {
            tracing::debug!(conn_id = %conn.id, skipped = ?decoded.skipped, "skipped unknown entity ids");
        }
        if decoded.is_empty() {
            return;
        }

        self.inbound.apply(&decoded).await;
        let handler = Arc::clone(&self.handler);
        let _ = invoke("on_entities", conn, move || {
            handler.on_entities(conn, &decoded.entities)
        });
    }
}
