//! Entity definitions and their current values.
//!
//! [`EntityRegistry`] owns every entity once and exposes two access paths,
//! by wire id and by name. Definitions are immutable after [`define`]; values
//! are written by inbound decodes and application updates, and drained by the
//! broadcast scheduler through [`snapshot_and_clear`].
//!
//! [`define`]: EntityRegistry::define
//! [`snapshot_and_clear`]: EntityRegistry::snapshot_and_clear

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::entity::{
    Entity, EntityDefinition, EntityId, EntityKey, EntityValue, SnapshotEntry,
};
use super::field_type::EntityLayout;
use crate::codec::{self, DecodedFrame, EntityLookup, FrameError, UnknownEntityPolicy};
use crate::error::LinkError;

#[derive(Debug)]
struct Slot {
    entity: Arc<Entity>,
    value: Option<EntityValue>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// Definition order; also the encode order.
    slots: Vec<Slot>,
    by_id: HashMap<EntityId, usize>,
    by_name: HashMap<String, usize>,
}

impl RegistryInner {
    fn index_of(&self, key: &EntityKey) -> Option<usize> {
        match key {
            EntityKey::Id(id) => self.by_id.get(id).copied(),
            EntityKey::Name(name) => self.by_name.get(name).copied(),
        }
    }
}

impl EntityLookup for RegistryInner {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        let index = self.by_id.get(&id)?;
        self.slots.get(*index).map(|slot| slot.entity.as_ref())
    }
}

/// Registry of typed entities and their pending values.
///
/// # Concurrency
///
/// A single `RwLock` guards definitions and values together. Writers
/// (`set_value`, `apply`) and `snapshot_and_clear` take the write lock, so a
/// snapshot never observes a half-applied frame and never loses a write.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    inner: RwLock<RegistryInner>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSchema`] if `id` or `name` is already in
    /// use or if `types` is not a valid type sequence.
    pub async fn define<S: AsRef<str>>(
        &self,
        name: &str,
        id: u8,
        types: &[S],
    ) -> Result<Arc<Entity>, LinkError> {
        let layout = EntityLayout::parse(types)?;
        let id = EntityId::new(id);

        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&id) {
            return Err(LinkError::InvalidSchema(format!(
                "entity id {id} already defined"
            )));
        }
        if inner.by_name.contains_key(name) {
            return Err(LinkError::InvalidSchema(format!(
                "entity name '{name}' already defined"
            )));
        }

        let entity = Arc::new(Entity {
            id,
            name: name.to_string(),
            layout,
        });
        let index = inner.slots.len();
        inner.slots.push(Slot {
            entity: Arc::clone(&entity),
            value: None,
        });
        inner.by_id.insert(id, index);
        inner.by_name.insert(name.to_string(), index);

        tracing::debug!(entity = name, %id, byte_length = entity.byte_length(), "entity defined");
        Ok(entity)
    }

    /// Registers every definition in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSchema`] for the first invalid definition.
    pub async fn define_all(&self, definitions: &[EntityDefinition]) -> Result<(), LinkError> {
        for def in definitions {
            self.define(&def.name, def.id, def.types.as_slice()).await?;
        }
        Ok(())
    }

    /// Stores `value`, replacing any previous one.
    ///
    /// Only the value's shape is checked here; ranges are checked at encode.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UnknownEntity`] if nothing is registered under
    /// `key`, or [`LinkError::ArityMismatch`] if the value does not have the
    /// shape of the entity's layout.
    pub async fn set_value(
        &self,
        key: impl Into<EntityKey>,
        value: impl Into<EntityValue>,
    ) -> Result<(), LinkError> {
        let key = key.into();
        let value = value.into();

        let mut inner = self.inner.write().await;
        let index = inner
            .index_of(&key)
            .ok_or_else(|| LinkError::UnknownEntity(key.to_string()))?;
        let Some(slot) = inner.slots.get_mut(index) else {
            return Err(LinkError::UnknownEntity(key.to_string()));
        };
        check_arity(&slot.entity, &value)?;
        slot.value = Some(value);
        Ok(())
    }

    /// Returns the current value, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UnknownEntity`] if nothing is registered under `key`.
    pub async fn get_value(
        &self,
        key: impl Into<EntityKey>,
    ) -> Result<Option<EntityValue>, LinkError> {
        let key = key.into();
        let inner = self.inner.read().await;
        inner
            .index_of(&key)
            .and_then(|index| inner.slots.get(index))
            .map(|slot| slot.value.clone())
            .ok_or_else(|| LinkError::UnknownEntity(key.to_string()))
    }

    /// Atomically copies every present value and resets all values to absent.
    ///
    /// Entries come back in definition order.
    pub async fn snapshot_and_clear(&self) -> Vec<SnapshotEntry> {
        let mut inner = self.inner.write().await;
        inner
            .slots
            .iter_mut()
            .filter_map(|slot| {
                slot.value.take().map(|value| SnapshotEntry {
                    entity: Arc::clone(&slot.entity),
                    value,
                })
            })
            .collect()
    }

    /// Resets every value to absent.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        for slot in &mut inner.slots {
            slot.value = None;
        }
    }

    /// Decodes `frame` against this registry's definitions without storing
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns the [`FrameError`] that rejected the frame.
    pub async fn decode(
        &self,
        frame: &[u8],
        policy: UnknownEntityPolicy,
    ) -> Result<DecodedFrame, FrameError> {
        let inner = self.inner.read().await;
        codec::decode(&*inner, frame, policy)
    }

    /// Writes every decoded value into its slot, by id.
    pub async fn apply(&self, frame: &DecodedFrame) {
        let mut inner = self.inner.write().await;
        for decoded in &frame.entities {
            let Some(index) = inner.by_id.get(&decoded.id).copied() else {
                continue;
            };
            if let Some(slot) = inner.slots.get_mut(index) {
                slot.value = Some(decoded.value.clone());
            }
        }
    }

    /// All definitions in definition order.
    pub async fn definitions(&self) -> Vec<Arc<Entity>> {
        let inner = self.inner.read().await;
        inner
            .slots
            .iter()
            .map(|slot| Arc::clone(&slot.entity))
            .collect()
    }

    /// Number of defined entities.
    pub async fn len(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    /// Returns `true` if no entity is defined.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.slots.is_empty()
    }
}

fn check_arity(entity: &Entity, value: &EntityValue) -> Result<(), LinkError> {
    let actual = match value {
        EntityValue::Numbers(numbers) => Some(numbers.len()),
        EntityValue::Text(_) => None,
    };
    let expected = entity.layout.arity();
    if expected == actual {
        return Ok(());
    }
    let describe = |arity: Option<usize>| match arity {
        Some(n) => format!("{n} number(s)"),
        None => "text".to_string(),
    };
    Err(LinkError::ArityMismatch {
        entity: entity.name.clone(),
        expected: describe(expected),
        actual: describe(actual),
    })
}
