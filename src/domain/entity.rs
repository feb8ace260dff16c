//! Entity identity, definition and value types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::field_type::EntityLayout;

/// Wire tag of an entity, unique within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u8);

impl EntityId {
    /// Wraps a raw wire tag.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Returns the raw wire tag.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for EntityId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// A named, typed value slot exchanged over the binary protocol.
///
/// Definitions are immutable once registered; only the value stored
/// alongside them in the registry changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Wire tag.
    pub id: EntityId,
    /// Name exposed to application callbacks.
    pub name: String,
    /// Parsed payload layout.
    pub layout: EntityLayout,
}

impl Entity {
    /// Fixed payload width in bytes (the length prefix only, for text).
    #[must_use]
    pub fn byte_length(&self) -> usize {
        self.layout.byte_length()
    }
}

/// Current value of an entity.
///
/// Serialized untagged: `[1, -2]` for numbers, `"text"` for strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    /// One number per numeric field, in field order.
    Numbers(Vec<i64>),
    /// String payload of a text entity.
    Text(String),
}

impl From<i64> for EntityValue {
    fn from(value: i64) -> Self {
        Self::Numbers(vec![value])
    }
}

impl From<i32> for EntityValue {
    fn from(value: i32) -> Self {
        Self::Numbers(vec![i64::from(value)])
    }
}

impl From<Vec<i64>> for EntityValue {
    fn from(values: Vec<i64>) -> Self {
        Self::Numbers(values)
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One present value captured from a registry, ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Definition the value belongs to.
    pub entity: Arc<Entity>,
    /// Captured value.
    pub value: EntityValue,
}

/// Addresses an entity either by wire id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKey {
    /// Lookup by wire tag.
    Id(EntityId),
    /// Lookup by name.
    Name(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<EntityId> for EntityKey {
    fn from(id: EntityId) -> Self {
        Self::Id(id)
    }
}

impl From<u8> for EntityKey {
    fn from(id: u8) -> Self {
        Self::Id(EntityId::new(id))
    }
}

impl From<&str> for EntityKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Serialized form of one entity definition, as found in schema files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Entity name.
    pub name: String,
    /// Wire tag.
    pub id: u8,
    /// Type sequence, e.g. `["str", "uint8"]`.
    pub types: Vec<String>,
}

/// Schema file listing the entities the device sends and accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entities broadcast to clients.
    #[serde(default)]
    pub outbound: Vec<EntityDefinition>,
    /// Entities clients may send as binary command frames.
    #[serde(default)]
    pub inbound: Vec<EntityDefinition>,
}
