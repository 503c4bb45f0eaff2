//! Events consumed by the dead reckoning scheduler.
//!
//! The host translates its own notifications (frame ticks, actor lifecycle,
//! decoded network updates) into [`Event`]s and feeds them to a single
//! `handle` entry point, either directly or through an [`EventQueue`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{ecs::EntityId, math::Vec3};

/// A message for the dead reckoning subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Once per frame for remote processing.
    TickRemote { sim_time: f64, dt: f32 },
    /// The host deleted an actor.
    EntityDeleted { id: EntityId },
    /// The current map is about to unload.
    MapUnloadBegin,
    /// Freshly decoded network state for an actor.
    EntityUpdated { id: EntityId, update: EntityUpdate },
}

/// Newly arrived state for one entity, already in engine units.
///
/// Every field is optional; absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    #[serde(default)]
    pub translation: Option<Vec3>,
    /// Heading/pitch/roll in radians.
    #[serde(default)]
    pub rotation: Option<Vec3>,
    #[serde(default)]
    pub velocity: Option<Vec3>,
    #[serde(default)]
    pub acceleration: Option<Vec3>,
    #[serde(default)]
    pub angular_velocity: Option<Vec3>,
    #[serde(default)]
    pub ground_offset: Option<f32>,
    #[serde(default)]
    pub articulations: Vec<ArticulationUpdate>,
}

impl EntityUpdate {
    pub fn with_translation(mut self, v: Vec3) -> Self {
        self.translation = Some(v);
        self
    }

    pub fn with_rotation(mut self, hpr: Vec3) -> Self {
        self.rotation = Some(hpr);
        self
    }

    pub fn with_velocity(mut self, v: Vec3) -> Self {
        self.velocity = Some(v);
        self
    }

    pub fn with_acceleration(mut self, v: Vec3) -> Self {
        self.acceleration = Some(v);
        self
    }

    pub fn with_angular_velocity(mut self, v: Vec3) -> Self {
        self.angular_velocity = Some(v);
        self
    }

    pub fn with_articulation(mut self, a: ArticulationUpdate) -> Self {
        self.articulations.push(a);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.translation.is_none()
            && self.rotation.is_none()
            && self.velocity.is_none()
            && self.acceleration.is_none()
            && self.angular_velocity.is_none()
            && self.ground_offset.is_none()
            && self.articulations.is_empty()
    }
}

/// New target for one articulated part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticulationUpdate {
    pub part: String,
    pub location: Vec3,
    pub rate: Vec3,
    /// Representation of `location`, e.g. `Azimuth` or `Position`.
    #[serde(default)]
    pub metric: String,
}

impl ArticulationUpdate {
    pub fn new(part: impl Into<String>, location: Vec3, rate: Vec3) -> Self {
        Self {
            part: part.into(),
            location,
            rate,
            metric: String::new(),
        }
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }
}

/// FIFO of pending events, drained once per frame.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<Event>,
}

impl EventQueue {
    /// Pushes an event into the queue.
    pub fn push(&mut self, e: Event) {
        self.queue.push_back(e);
    }

    /// Drains all queued events in arrival order.
    pub fn drain(&mut self) -> Vec<Event> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
