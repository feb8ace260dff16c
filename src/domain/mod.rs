//! Domain layer: entity model, entity registry, and connection tracking.
//!
//! This module contains the server-side data model: typed entity
//! definitions and their registry, plus the per-peer connection handles and
//! the table the broadcast scheduler fans out over.

pub mod connection;
pub mod connection_table;
pub mod entity;
pub mod entity_registry;
pub mod field_type;

pub use connection::{
    CloseSignal, ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionState, Inbound,
    Outbound,
};
pub use connection_table::{ConnectionPolicy, ConnectionTable};
pub use entity::{
    Entity, EntityDefinition, EntityId, EntityKey, EntitySchema, EntityValue, SnapshotEntry,
};
pub use entity_registry::EntityRegistry;
pub use field_type::{EntityLayout, FieldType, STR_MARKER};
