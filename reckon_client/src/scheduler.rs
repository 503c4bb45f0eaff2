//! Dead reckoning scheduler.
//!
//! Owns the registry of [`EntityMotionState`]s and runs the per-tick pass:
//! predict, queue a ground clamp, advance articulated parts, clear the
//! updated flags. The clamp batch is flushed once after the pass.

use std::{collections::BTreeMap, fmt};

use reckon_shared::{
    config::ReckonConfig,
    ecs::EntityId,
    event::{EntityUpdate, Event},
    host::{ActorHost, SceneNodeLookup},
};
use tracing::{debug, info, warn};

use crate::{
    clamp::{ClampRequest, GroundClamper},
    motion::{Algorithm, EntityMotionState, UpdateMode},
    predict::DeadReckoner,
};

/// Registration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    AlreadyRegistered(EntityId),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::AlreadyRegistered(id) => {
                write!(f, "entity {id} is already registered for dead reckoning")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

pub struct DeadReckoningScheduler {
    config: ReckonConfig,
    entities: BTreeMap<EntityId, EntityMotionState>,
    clamper: Option<Box<dyn GroundClamper>>,
    time_until_force_clamp: f32,
}

impl DeadReckoningScheduler {
    /// Scheduler without a ground clamper; predicted transforms are applied
    /// as they are.
    pub fn new(config: ReckonConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            clamper: None,
            time_until_force_clamp: 0.0,
        }
    }

    pub fn with_clamper(config: ReckonConfig, clamper: Box<dyn GroundClamper>) -> Self {
        Self {
            clamper: Some(clamper),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &ReckonConfig {
        &self.config
    }

    /// Seconds an articulated part takes to reach a new stop.
    pub fn set_articulation_smooth_time(&mut self, seconds: f32) {
        self.config.articulation_smooth_time = seconds.max(0.0);
    }

    pub fn clamper(&self) -> Option<&dyn GroundClamper> {
        self.clamper.as_deref()
    }

    pub fn clamper_mut(&mut self) -> Option<&mut (dyn GroundClamper + 'static)> {
        self.clamper.as_deref_mut()
    }

    pub fn set_clamper(&mut self, clamper: Option<Box<dyn GroundClamper>>) {
        self.clamper = clamper;
    }

    // ---- registry ---------------------------------------------------------

    /// Starts dead reckoning `id`.
    ///
    /// Calculate-and-move entities with a pending update move the actor to the
    /// last known pose right away. Calculate-only entities adopt the actor's
    /// current transform as their last known pose.
    pub fn register<H: ActorHost>(
        &mut self,
        id: EntityId,
        mut state: EntityMotionState,
        host: &mut H,
    ) -> Result<(), RegistrationError> {
        if self.entities.contains_key(&id) {
            warn!(entity = %id, "Entity already registered for dead reckoning");
            return Err(RegistrationError::AlreadyRegistered(id));
        }

        match state.effective_update_mode() {
            UpdateMode::CalculateAndMoveActor => {
                state.seed_from_last_known();
                if state.is_updated()
                    && !host.set_actor_transform(id, state.last_known_transform())
                {
                    warn!(entity = %id, "Registered entity has no actor transform");
                }
            }
            UpdateMode::CalculateOnly => match host.actor_transform(id) {
                Some(t) => state.seed_from_transform(t),
                None => warn!(entity = %id, "Registered entity has no actor transform"),
            },
            UpdateMode::Auto => {}
        }

        debug!(entity = %id, algorithm = ?state.algorithm(), "Registered for dead reckoning");
        self.entities.insert(id, state);
        Ok(())
    }

    /// Stops dead reckoning `id`. Returns the removed state, if any.
    pub fn unregister(&mut self, id: EntityId) -> Option<EntityMotionState> {
        let removed = self.entities.remove(&id);
        if removed.is_some() {
            debug!(entity = %id, "Unregistered from dead reckoning");
        }
        removed
    }

    pub fn is_registered(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn state(&self, id: EntityId) -> Option<&EntityMotionState> {
        self.entities.get(&id)
    }

    pub fn state_mut(&mut self, id: EntityId) -> Option<&mut EntityMotionState> {
        self.entities.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityMotionState)> {
        self.entities.iter().map(|(id, s)| (*id, s))
    }

    // ---- notifications ----------------------------------------------------

    /// Merges freshly received state. Returns false for unknown entities.
    pub fn on_entity_updated(&mut self, id: EntityId, update: &EntityUpdate) -> bool {
        match self.entities.get_mut(&id) {
            Some(state) => {
                let applied = state.apply_update(update);
                debug!(entity = %id, applied, "Entity update merged");
                true
            }
            None => {
                warn!(entity = %id, "Update for entity that is not dead reckoned");
                false
            }
        }
    }

    /// Forgets a deleted entity and any clamper reference to it.
    pub fn on_entity_removed(&mut self, id: EntityId) {
        self.unregister(id);
        if let Some(clamper) = self.clamper.as_deref_mut() {
            if clamper.eye_point_actor() == Some(id) {
                clamper.set_eye_point_actor(None);
            }
            if clamper.terrain_actor() == Some(id) {
                clamper.set_terrain_actor(None);
            }
        }
    }

    /// Drops every registration and clamper reference.
    pub fn on_map_unload(&mut self) {
        info!(entities = self.entities.len(), "Map unloading; dead reckoning registry cleared");
        self.entities.clear();
        if let Some(clamper) = self.clamper.as_deref_mut() {
            clamper.set_eye_point_actor(None);
            clamper.set_terrain_actor(None);
        }
    }

    /// Single entry point for host events.
    pub fn handle<H: ActorHost + SceneNodeLookup>(&mut self, event: Event, host: &mut H) {
        match event {
            Event::TickRemote { sim_time, dt } => self.tick(sim_time, dt, host),
            Event::EntityDeleted { id } => self.on_entity_removed(id),
            Event::MapUnloadBegin => self.on_map_unload(),
            Event::EntityUpdated { id, update } => {
                self.on_entity_updated(id, &update);
            }
        }
    }

    // ---- tick -------------------------------------------------------------

    /// Runs one dead reckoning pass over every registered entity.
    pub fn tick<H: ActorHost + SceneNodeLookup>(&mut self, sim_time: f64, dt: f32, host: &mut H) {
        if let Some(clamper) = self.clamper.as_deref_mut() {
            let eye = clamper
                .eye_point_actor()
                .and_then(|id| host.actor_transform(id))
                .map(|t| t.translation);
            clamper.update_eye_point(eye);
        }

        self.time_until_force_clamp -= dt;
        let force_clamp = self.time_until_force_clamp <= 0.0;
        if force_clamp {
            self.time_until_force_clamp = self.config.force_clamp_interval;
            debug!(sim_time, "Forcing a ground clamp on all entities");
        }

        let window = self.config.articulation_smooth_time;
        for (&id, state) in self.entities.iter_mut() {
            if host.actor_transform(id).is_none() {
                warn!(entity = %id, "Dead reckoned entity has no actor; skipped");
                continue;
            }

            state.advance_clock(sim_time, dt);
            let prediction = DeadReckoner::predict(state, sim_time, dt);

            // Calculate-only entities never touch the actor or its parts.
            if state.effective_update_mode() != UpdateMode::CalculateAndMoveActor {
                state.clear_updated();
                continue;
            }

            let transform_changed = state.algorithm() != Algorithm::None
                && (prediction.changed || force_clamp);
            if transform_changed {
                match self.clamper.as_deref_mut() {
                    Some(clamper) => clamper.clamp_to_ground(ClampRequest {
                        range: state.clamp_range_type(),
                        sim_time,
                        transform: prediction.transform,
                        entity: id,
                        data: state.clamping_data(),
                        transform_changed,
                        velocity: state.velocity(),
                    }),
                    None => {
                        host.set_actor_transform(id, prediction.transform);
                    }
                }
            }

            for (part, pose) in state.articulations_mut().advance_all(dt, window) {
                match host.node_by_name(id, &part) {
                    Some(node) => host.set_node_transform(node, pose),
                    None => debug!(entity = %id, part = %part, "No scene node for articulated part"),
                }
            }

            state.clear_updated();
        }

        if let Some(clamper) = self.clamper.as_deref_mut() {
            for result in clamper.finish_up() {
                if !host.set_actor_transform(result.entity, result.transform) {
                    warn!(entity = %result.entity, "Clamped entity vanished before apply");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clamp::{BatchGroundClamper, FlatTerrain, NoGroundClamp},
        motion::{Algorithm, Ownership},
    };
    use reckon_shared::{
        ecs::{ArticulatedParts, World},
        event::ArticulationUpdate,
        host::PartPose,
        math::{Transform, Vec3},
    };

    fn moving_state(at: Vec3, velocity: Vec3) -> EntityMotionState {
        let mut s = EntityMotionState::new(Algorithm::VelocityOnly);
        s.set_flying(true);
        s.set_last_known_translation(at);
        s.set_velocity(velocity);
        s
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());

        sched.register(e, moving_state(Vec3::X, Vec3::ZERO), &mut world).unwrap();
        let err = sched
            .register(e, moving_state(Vec3::Y, Vec3::ZERO), &mut world)
            .unwrap_err();
        assert_eq!(err, RegistrationError::AlreadyRegistered(e));
        assert_eq!(sched.state(e).unwrap().last_known_translation(), Vec3::X);
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        sched.register(e, moving_state(Vec3::X, Vec3::ZERO), &mut world).unwrap();
        assert!(sched.unregister(e).is_some());
        assert!(sched.unregister(e).is_none());
        assert!(sched.is_empty());
    }

    #[test]
    fn move_mode_registration_places_actor() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        sched
            .register(e, moving_state(Vec3::new(4.0, 0.0, 0.0), Vec3::ZERO), &mut world)
            .unwrap();
        assert_eq!(world.actor_transform(e).unwrap().translation, Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn calculate_only_adopts_actor_pose_and_never_moves_it() {
        let mut world = World::default();
        let start = Transform::from_hpr(Vec3::new(7.0, 1.0, 0.0), Vec3::ZERO);
        let e = world.spawn_actor(start, &[]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());

        let mut state = EntityMotionState::new(Algorithm::VelocityOnly);
        state.set_ownership(Ownership::Local);
        state.set_velocity(Vec3::X);
        sched.register(e, state, &mut world).unwrap();
        assert_eq!(sched.state(e).unwrap().last_known_translation(), start.translation);

        sched.tick(0.0, 0.0, &mut world);
        sched.tick(1.0, 1.0, &mut world);
        assert_eq!(world.actor_transform(e), Some(start));
        assert!(sched.state(e).unwrap().current_translation().x > 7.0);
    }

    #[test]
    fn tick_without_clamper_applies_raw_transform() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        sched
            .register(e, moving_state(Vec3::new(0.0, 0.0, -3.0), Vec3::X), &mut world)
            .unwrap();
        sched.tick(0.0, 0.0, &mut world);
        sched.tick(2.0, 2.0, &mut world);
        let t = world.actor_transform(e).unwrap();
        assert!(t.translation.abs_diff_eq(Vec3::new(2.0, 0.0, -3.0), 1e-4));
        assert!(!sched.state(e).unwrap().is_updated());
    }

    #[test]
    fn clamper_keeps_ground_entities_above_terrain() {
        let mut world = World::default();
        let terrain = world.spawn_actor(Transform::IDENTITY, &[]);
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut clamper = BatchGroundClamper::new(FlatTerrain::new(1.0));
        clamper.set_terrain_actor(Some(terrain));
        let mut sched =
            DeadReckoningScheduler::with_clamper(ReckonConfig::default(), Box::new(clamper));

        let mut state = moving_state(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        state.set_flying(false);
        state.set_ground_offset(0.25);
        sched.register(e, state, &mut world).unwrap();
        sched.tick(0.0, 0.0, &mut world);

        assert_eq!(world.actor_transform(e).unwrap().translation.z, 1.25);
        // The prediction itself stays unclamped.
        assert_eq!(sched.state(e).unwrap().current_translation().z, -5.0);
    }

    #[test]
    fn removing_terrain_actor_clears_clamper_reference() {
        let mut world = World::default();
        let terrain = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut clamper = NoGroundClamp::default();
        clamper.set_terrain_actor(Some(terrain));
        clamper.set_eye_point_actor(Some(EntityId(77)));
        let mut sched =
            DeadReckoningScheduler::with_clamper(ReckonConfig::default(), Box::new(clamper));

        sched.handle(Event::EntityDeleted { id: terrain }, &mut world);
        let clamper = sched.clamper().unwrap();
        assert_eq!(clamper.terrain_actor(), None);
        assert_eq!(clamper.eye_point_actor(), Some(EntityId(77)));
    }

    #[test]
    fn map_unload_clears_everything() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut clamper = NoGroundClamp::default();
        clamper.set_terrain_actor(Some(e));
        clamper.set_eye_point_actor(Some(e));
        let mut sched =
            DeadReckoningScheduler::with_clamper(ReckonConfig::default(), Box::new(clamper));
        sched.register(e, moving_state(Vec3::ZERO, Vec3::ZERO), &mut world).unwrap();

        sched.handle(Event::MapUnloadBegin, &mut world);
        assert!(sched.is_empty());
        let clamper = sched.clamper().unwrap();
        assert!(clamper.terrain_actor().is_none() && clamper.eye_point_actor().is_none());
    }

    #[test]
    fn articulated_parts_reach_scene_nodes() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &["turret"]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        sched.register(e, moving_state(Vec3::ZERO, Vec3::ZERO), &mut world).unwrap();

        let update = EntityUpdate::default()
            .with_articulation(ArticulationUpdate::new("turret", Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO))
            .with_articulation(ArticulationUpdate::new("missing", Vec3::ZERO, Vec3::ZERO));
        assert!(sched.on_entity_updated(e, &update));
        sched.tick(0.0, 0.1, &mut world);

        let parts = world.get::<ArticulatedParts>(e).unwrap();
        assert_eq!(parts.pose("turret"), Some(PartPose::Rotation(Vec3::new(1.0, 0.0, 0.0))));
    }

    #[test]
    fn calculate_only_parts_stay_put() {
        let mut world = World::default();
        let e = world.spawn_actor(Transform::IDENTITY, &["turret"]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        let mut state = EntityMotionState::new(Algorithm::VelocityOnly);
        state.set_ownership(Ownership::Local);
        sched.register(e, state, &mut world).unwrap();

        let update = EntityUpdate::default()
            .with_articulation(ArticulationUpdate::new("turret", Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO));
        assert!(sched.on_entity_updated(e, &update));
        sched.tick(0.0, 0.1, &mut world);

        let parts = world.get::<ArticulatedParts>(e).unwrap();
        assert_eq!(parts.pose("turret"), Some(PartPose::Rotation(Vec3::ZERO)));
        let stops = sched.state(e).unwrap().articulations().stops("turret").unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].elapsed, 0.0);
    }

    #[test]
    fn none_algorithm_leaves_host_moves_alone() {
        let mut world = World::default();
        let terrain = world.spawn_actor(Transform::IDENTITY, &[]);
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut clamper = BatchGroundClamper::new(FlatTerrain::new(10.0));
        clamper.set_terrain_actor(Some(terrain));
        let mut sched =
            DeadReckoningScheduler::with_clamper(ReckonConfig::default(), Box::new(clamper));
        sched.register(e, EntityMotionState::new(Algorithm::None), &mut world).unwrap();

        let moved = Transform::from_hpr(Vec3::splat(7.0), Vec3::ZERO);
        assert!(world.set_actor_transform(e, moved));
        // Both ticks are forced clamps.
        sched.tick(0.0, 0.0, &mut world);
        sched.tick(2.0, 2.0, &mut world);
        assert_eq!(world.actor_transform(e), Some(moved));
    }

    #[test]
    fn update_for_unknown_entity_is_reported() {
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        assert!(!sched.on_entity_updated(EntityId(5), &EntityUpdate::default()));
    }

    #[test]
    fn missing_actor_does_not_stop_the_pass() {
        let mut world = World::default();
        let ghost = EntityId(1000);
        let e = world.spawn_actor(Transform::IDENTITY, &[]);
        let mut sched = DeadReckoningScheduler::new(ReckonConfig::default());
        sched.register(ghost, moving_state(Vec3::ZERO, Vec3::X), &mut world).unwrap();
        sched.register(e, moving_state(Vec3::ZERO, Vec3::X), &mut world).unwrap();

        sched.tick(0.0, 0.0, &mut world);
        sched.tick(1.0, 1.0, &mut world);
        assert!(world.actor_transform(e).unwrap().translation.abs_diff_eq(Vec3::X, 1e-4));
    }
}
