//! Entity ids and a minimal in-memory host world.
//!
//! The dead reckoning subsystem never owns actors; it talks to whatever host
//! owns them through the traits in [`crate::host`]. `World` is the small
//! reference host used by the demo binary and the tests: typed component
//! storages keyed by entity id.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use serde::{Deserialize, Serialize};

use crate::{host::PartPose, math::Transform};

/// Opaque entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Simple world that can store typed components.
#[derive(Default)]
pub struct World {
    next_id: u64,
    storages: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl World {
    /// Creates a new entity.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Inserts/replaces a component for an entity.
    pub fn insert<T: 'static + Send + Sync>(&mut self, entity: EntityId, component: T) {
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(HashMap::<EntityId, T>::new()));

        if let Some(storage) = storage.downcast_mut::<HashMap<EntityId, T>>() {
            storage.insert(entity, component);
        }
    }

    /// Removes a component, returning it if present.
    pub fn remove<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.remove(&entity))
    }

    /// Gets a component reference.
    pub fn get<T: 'static + Send + Sync>(&self, entity: EntityId) -> Option<&T> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.get(&entity))
    }

    /// Gets a mutable component reference.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.get_mut(&entity))
    }

    /// Spawns an actor with a transform and articulated part slots.
    pub fn spawn_actor(&mut self, transform: Transform, parts: &[&str]) -> EntityId {
        let id = self.spawn();
        self.insert(id, transform);
        if !parts.is_empty() {
            self.insert(id, ArticulatedParts::new(parts));
        }
        id
    }
}

/// Component: the scene nodes of an actor's articulated parts, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticulatedParts {
    pub nodes: Vec<(String, PartPose)>,
}

impl ArticulatedParts {
    pub fn new(names: &[&str]) -> Self {
        Self {
            nodes: names
                .iter()
                .map(|n| (n.to_string(), PartPose::default()))
                .collect(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|(n, _)| n == name)
    }

    /// Current pose of a named part.
    pub fn pose(&self, name: &str) -> Option<PartPose> {
        self.index_of(name).map(|i| self.nodes[i].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn insert_get_remove_transform() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, Transform::from_hpr(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO));
        assert_eq!(world.get::<Transform>(e).unwrap().translation.x, 1.0);
        assert!(world.remove::<Transform>(e).is_some());
        assert!(world.get::<Transform>(e).is_none());
    }

    #[test]
    fn spawn_actor_registers_parts() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &["turret", "hatch"]);
        let parts = world.get::<ArticulatedParts>(e).unwrap();
        assert_eq!(parts.index_of("hatch"), Some(1));
        assert_eq!(parts.pose("gun"), None);
    }
}
