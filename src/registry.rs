use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::config::DeviceCatalog;
use crate::entity::Entity;
use crate::types::EntityUpdate;

pub type EntityId = usize;

/// Entities keyed by `(device_id, dp_code)`. A climate entity fans in from
/// several codes and is registered under each of them.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: Vec<Mutex<Entity>>,
    index: HashMap<String, HashMap<String, EntityId>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: &DeviceCatalog) -> Self {
        let mut registry = Self::new();
        for device in catalog.enabled() {
            for spec in &device.entities {
                registry.insert(Entity::from_spec(device, spec));
            }
        }
        registry
    }

    /// Add an entity under every code it listens to. A code already taken
    /// keeps its first registration.
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        let id = self.entities.len();
        let device_id = entity.info().device_id.clone();
        let codes = self.index.entry(device_id.clone()).or_default();
        for code in entity.codes() {
            if codes.contains_key(code) {
                warn!(%device_id, code, "code already registered, ignoring duplicate");
                continue;
            }
            codes.insert(code.to_string(), id);
        }
        debug!(unique_id = %entity.info().unique_id, "entity registered");
        self.entities.push(Mutex::new(entity));
        id
    }

    pub fn register(&mut self, device_id: &str, code: &str, id: EntityId) {
        if id >= self.entities.len() {
            warn!(device_id, code, id, "register with unknown entity id");
            return;
        }
        self.index
            .entry(device_id.to_string())
            .or_default()
            .insert(code.to_string(), id);
    }

    pub fn lookup(&self, device_id: &str, code: &str) -> Option<EntityId> {
        self.index.get(device_id)?.get(code).copied()
    }

    pub fn with_entity<R>(&self, id: EntityId, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        let slot = self.entities.get(id)?;
        let mut entity = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut entity))
    }

    pub fn apply(
        &self,
        device_id: &str,
        code: &str,
        raw: &serde_json::Value,
    ) -> Option<EntityUpdate> {
        let id = self.lookup(device_id, code)?;
        self.with_entity(id, |entity| {
            entity.apply_raw(code, raw);
            entity.update_for(code)
        })
    }

    pub fn snapshot(&self, id: EntityId) -> Option<Entity> {
        self.with_entity(id, |entity| entity.clone())
    }

    pub fn entities_for(&self, device_id: &str) -> Vec<EntityId> {
        let Some(codes) = self.index.get(device_id) else {
            return Vec::new();
        };
        let mut ids: Vec<EntityId> = codes.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn find_by_unique_id(&self, unique_id: &str) -> Option<EntityId> {
        (0..self.entities.len())
            .find(|&id| self.with_entity(id, |e| e.info().unique_id == unique_id) == Some(true))
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
