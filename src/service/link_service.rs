//! Link service: connection lifecycle and application entry points.
//!
//! [`LinkService`] owns both entity registries, the connection table and the
//! command router. The WebSocket glue calls [`LinkService::accept`],
//! [`LinkService::handle_message`] and [`LinkService::disconnect`]; the
//! application pushes sensor values through [`LinkService::push`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;

use super::broadcast::BroadcastScheduler;
use super::handler::{LinkHandler, invoke};
use super::router::CommandRouter;
use crate::config::LinkConfig;
use crate::domain::{
    ConnectionHandle, ConnectionTable, EntityKey, EntityRegistry, EntitySchema, EntityValue,
    Inbound, Outbound,
};
use crate::error::LinkError;

/// Central coordinator of the link.
pub struct LinkService {
    outbound: Arc<EntityRegistry>,
    inbound: Arc<EntityRegistry>,
    connections: Arc<ConnectionTable>,
    router: CommandRouter,
    handler: Arc<dyn LinkHandler>,
    device_info: RwLock<Value>,
    send_timeout: Duration,
    broadcast_interval: Duration,
    queue_capacity: usize,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService")
            .field("connections", &self.connections)
            .field("send_timeout", &self.send_timeout)
            .field("broadcast_interval", &self.broadcast_interval)
            .finish_non_exhaustive()
    }
}

impl LinkService {
    /// Creates a service with empty registries.
    ///
    /// Entity definitions are added afterwards with [`Self::load_schema`] or
    /// through the registries directly.
    #[must_use]
    pub fn new(config: &LinkConfig, handler: Arc<dyn LinkHandler>) -> Self {
        let inbound = Arc::new(EntityRegistry::new());
        let router = CommandRouter::new(
            Arc::clone(&handler),
            Arc::clone(&inbound),
            config.unknown_entity_policy,
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            outbound: Arc::new(EntityRegistry::new()),
            inbound,
            connections: Arc::new(ConnectionTable::new(config.connection_policy)),
            router,
            handler,
            device_info: RwLock::new(config.device_info.clone()),
            send_timeout: config.send_timeout,
            broadcast_interval: config.broadcast_interval,
            queue_capacity: config.outbound_queue_capacity.max(1),
            shutdown,
        }
    }

    /// Defines every entity of `schema` in the matching registry.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSchema`] on the first rejected definition.
    pub async fn load_schema(&self, schema: &EntitySchema) -> Result<(), LinkError> {
        self.outbound.define_all(&schema.outbound).await?;
        self.inbound.define_all(&schema.inbound).await?;
        tracing::info!(
            outbound = schema.outbound.len(),
            inbound = schema.inbound.len(),
            "entity schema loaded"
        );
        Ok(())
    }

    /// Registry of values broadcast to clients.
    #[must_use]
    pub fn outbound(&self) -> &Arc<EntityRegistry> {
        &self.outbound
    }

    /// Registry of values received from clients.
    #[must_use]
    pub fn inbound(&self) -> &Arc<EntityRegistry> {
        &self.inbound
    }

    /// Table of live connections.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionTable> {
        &self.connections
    }

    /// Capacity to use for each connection's outbound queue.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Upper bound on queueing one message for one connection.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Stores a sensor value for the next broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UnknownEntity`] or [`LinkError::ArityMismatch`].
    pub async fn push(
        &self,
        key: impl Into<EntityKey>,
        value: impl Into<EntityValue>,
    ) -> Result<(), LinkError> {
        self.outbound.set_value(key, value).await
    }

    /// Current device-info object.
    pub async fn device_info(&self) -> Value {
        self.device_info.read().await.clone()
    }

    /// Replaces the device info sent to subsequent connections.
    pub async fn set_device_info(&self, info: Value) {
        *self.device_info.write().await = info;
    }

    /// Receiver that observes `true` once shutdown has begun.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Returns `true` once [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Registers a new peer and queues the device info.
    ///
    /// The handle becomes active only after the device info is queued, so
    /// no broadcast frame can reach the peer first.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ShuttingDown`], [`LinkError::ConnectionRejected`]
    /// under [`crate::domain::ConnectionPolicy::UniqueAddress`], or a send
    /// error if the device info cannot be queued.
    pub async fn accept(
        &self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<ConnectionHandle, LinkError> {
        if self.is_shutting_down() {
            return Err(LinkError::ShuttingDown);
        }

        let handle = self.connections.register(addr, outbound).await?;
        let info = serde_json::to_string(&*self.device_info.read().await)?;
        if let Err(err) = handle.send(Outbound::Text(info), self.send_timeout).await {
            self.connections.remove(handle.id()).await;
            handle.mark_closed();
            return Err(err);
        }

        handle.activate();
        tracing::info!(conn_id = %handle.id(), %addr, "connection active");

        let handler = Arc::clone(&self.handler);
        let conn = handle.info();
        let _ = invoke("on_connect", conn, move || handler.on_connect(conn));
        Ok(handle)
    }

    /// Routes one inbound message and queues the reply, if any.
    ///
    /// A reply that cannot be queued requests the connection's close.
    pub async fn handle_message(&self, handle: &ConnectionHandle, message: Inbound) {
        let Some(reply) = self.router.route(handle.info(), message).await else {
            return;
        };
        if let Err(err) = handle
            .send(Outbound::Text(reply.to_json()), self.send_timeout)
            .await
        {
            tracing::debug!(conn_id = %handle.id(), error = %err, "reply not delivered");
            handle.request_close();
        }
    }

    /// Removes a connection and fires the disconnect callback.
    ///
    /// Idempotent: only the first call for a handle has any effect.
    pub async fn disconnect(&self, handle: &ConnectionHandle) {
        if !handle.mark_closed() {
            return;
        }
        self.connections.remove(handle.id()).await;
        tracing::info!(conn_id = %handle.id(), addr = %handle.addr(), "connection closed");

        let handler = Arc::clone(&self.handler);
        let conn = handle.info();
        let _ = invoke("on_disconnect", conn, move || handler.on_disconnect(conn));
    }

    /// Scheduler over the outbound registry and the connection table.
    #[must_use]
    pub fn broadcaster(&self) -> BroadcastScheduler {
        BroadcastScheduler::new(
            Arc::clone(&self.outbound),
            Arc::clone(&self.connections),
            self.broadcast_interval,
            self.send_timeout,
        )
    }

    /// Spawns the broadcast loop; it ends when shutdown begins.
    pub fn spawn_broadcaster(&self) -> JoinHandle<()> {
        tokio::spawn(self.broadcaster().run(self.subscribe_shutdown()))
    }

    /// Begins shutdown and waits for the connection table to drain.
    ///
    /// Returns `true` if every connection closed within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown.send_replace(true);
        for handle in self.connections.snapshot().await {
            handle.request_close();
        }
        let drained = tokio::time::timeout(timeout, self.connections.wait_drained())
            .await
            .is_ok();
        if drained {
            tracing::info!("all connections drained");
        } else {
            let remaining = self.connections.len().await;
            tracing::warn!(remaining, "shutdown timed out with connections still open");
        }
        drained
    }
}
