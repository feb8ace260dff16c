//! Entity schema and value DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Entity, EntityValue};

/// One entity definition as exposed over REST.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntityDto {
    /// Wire id.
    pub id: u8,
    /// Entity name.
    pub name: String,
    /// Type descriptors, `"str"` first for text entities.
    pub types: Vec<String>,
    /// Fixed payload width in bytes.
    pub byte_length: usize,
}

impl From<&Entity> for EntityDto {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.get(),
            name: entity.name.clone(),
            types: entity
                .layout
                .descriptors()
                .into_iter()
                .map(str::to_string)
                .collect(),
            byte_length: entity.byte_length(),
        }
    }
}

/// Response for `GET /api/v1/entities`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchemaResponse {
    /// Entities broadcast to clients, in definition order.
    pub outbound: Vec<EntityDto>,
    /// Entities clients may send, in definition order.
    pub inbound: Vec<EntityDto>,
}

/// Request body for `PUT /api/v1/entities/{name}`.
///
/// `value` is a number, an array of numbers, or a string.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetValueRequest {
    /// New value.
    #[schema(value_type = Object)]
    pub value: SetValue,
}

/// Accepted shapes of a pushed value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SetValue {
    /// Shorthand for a single-field numeric entity.
    Number(i64),
    /// Full value.
    Value(EntityValue),
}

impl From<SetValue> for EntityValue {
    fn from(value: SetValue) -> Self {
        match value {
            SetValue::Number(n) => Self::from(n),
            SetValue::Value(v) => v,
        }
    }
}
