//! Service layer: orchestration of connections, commands and broadcasts.
//!
//! [`LinkService`] coordinates the connection lifecycle and owns the entity
//! registries, [`CommandRouter`] dispatches inbound messages to the injected
//! [`LinkHandler`], and [`BroadcastScheduler`] periodically fans the
//! outbound registry out to every active connection.

pub mod broadcast;
pub mod handler;
pub mod link_service;
pub mod router;

pub use broadcast::{BroadcastScheduler, TickOutcome};
pub use handler::{HandlerError, LinkHandler, LoggingHandler, NoopHandler};
pub use link_service::LinkService;
pub use router::CommandRouter;
