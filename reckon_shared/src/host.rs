//! Host abstractions.
//!
//! The dead reckoning scheduler reads and writes actor transforms and
//! articulated-part nodes through these traits; it never owns the actors.
//! [`World`] implements both so headless tests and tools need no engine.

use serde::{Deserialize, Serialize};

use crate::{
    ecs::{ArticulatedParts, EntityId, World},
    math::{Transform, Vec3},
};

/// Access to the transforms of host-owned actors.
pub trait ActorHost {
    fn actor_transform(&self, id: EntityId) -> Option<Transform>;

    /// Returns false when the actor does not exist.
    fn set_actor_transform(&mut self, id: EntityId, transform: Transform) -> bool;
}

/// Handle to an articulated-part scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub owner: EntityId,
    pub index: usize,
}

/// Local pose of an articulated part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PartPose {
    /// Heading/pitch/roll in radians.
    Rotation(Vec3),
    /// Local offset.
    Position(Vec3),
}

impl Default for PartPose {
    fn default() -> Self {
        PartPose::Rotation(Vec3::ZERO)
    }
}

impl PartPose {
    pub fn value(&self) -> Vec3 {
        match self {
            PartPose::Rotation(v) | PartPose::Position(v) => *v,
        }
    }
}

/// Resolves articulated parts of an actor by name.
pub trait SceneNodeLookup {
    fn node_by_name(&self, owner: EntityId, part: &str) -> Option<NodeHandle>;
    fn set_node_transform(&mut self, node: NodeHandle, pose: PartPose);
}

impl ActorHost for World {
    fn actor_transform(&self, id: EntityId) -> Option<Transform> {
        self.get::<Transform>(id).copied()
    }

    fn set_actor_transform(&mut self, id: EntityId, transform: Transform) -> bool {
        match self.get_mut::<Transform>(id) {
            Some(t) => {
                *t = transform;
                true
            }
            None => false,
        }
    }
}

impl SceneNodeLookup for World {
    fn node_by_name(&self, owner: EntityId, part: &str) -> Option<NodeHandle> {
        self.get::<ArticulatedParts>(owner)
            .and_then(|parts| parts.index_of(part))
            .map(|index| NodeHandle { owner, index })
    }

    fn set_node_transform(&mut self, node: NodeHandle, pose: PartPose) {
        if let Some(slot) = self
            .get_mut::<ArticulatedParts>(node.owner)
            .and_then(|parts| parts.nodes.get_mut(node.index))
        {
            slot.1 = pose;
        }
    }
}
