//! Per-entity dead reckoning state.
//!
//! An [`EntityMotionState`] holds the last-known kinematic state received from
//! the owner, the pose most recently predicted locally, and the smoothing
//! bookkeeping between the two. The setters keep the "before update" snapshot
//! consistent so a fresh update always blends from where the entity is drawn.

use reckon_shared::{
    config::ReckonConfig,
    event::EntityUpdate,
    math::{hpr_to_quat, quat_to_hpr, Quat, Transform, Vec3},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    articulation::{ArticulationChain, PartKind},
    clamp::{ClampRangeType, GroundClampType, GroundClampingData},
};

/// Prediction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Nothing is predicted; the stored transform is left alone.
    #[default]
    None,
    /// Holds the last known pose.
    Static,
    VelocityOnly,
    VelocityAndAcceleration,
}

impl Algorithm {
    pub fn is_kinematic(self) -> bool {
        matches!(self, Algorithm::VelocityOnly | Algorithm::VelocityAndAcceleration)
    }
}

/// What the scheduler does with a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Resolved from [`Ownership`].
    #[default]
    Auto,
    /// Predict but never touch the actor.
    CalculateOnly,
    /// Predict and move the actor.
    CalculateAndMoveActor,
}

/// Who simulates an entity. Decides what [`UpdateMode::Auto`] means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ownership {
    Local,
    #[default]
    Remote,
}

bitflags::bitflags! {
    /// Parts of the pose that arrived since the last tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct UpdateFlags: u8 {
        const TRANSLATION = 1 << 0;
        const ROTATION = 1 << 1;
    }
}

/// Velocities above this multiple of the reported one are treated as spikes.
const INSTANT_VELOCITY_SPIKE: f32 = 4.0;
/// Spiky instant velocities are scaled down to this multiple.
const INSTANT_VELOCITY_TAMP: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMotionState {
    pub(crate) last_translation: Vec3,
    pub(crate) last_rotation: Vec3,
    pub(crate) last_rotation_quat: Quat,

    pub(crate) translation_before_update: Vec3,
    pub(crate) rotation_before_update: Quat,
    pub(crate) velocity_before_update: Vec3,

    pub(crate) current_translation: Vec3,
    pub(crate) current_rotation: Quat,
    pub(crate) current_instant_velocity: Vec3,

    pub(crate) velocity: Vec3,
    pub(crate) acceleration: Vec3,
    pub(crate) angular_velocity: Vec3,

    pub(crate) flags: UpdateFlags,
    translation_initiated: bool,
    rotation_initiated: bool,
    pub(crate) rotation_resolved: bool,

    pub(crate) last_translation_update_time: f64,
    pub(crate) last_rotation_update_time: f64,
    pub(crate) average_translation_update_interval: f32,
    pub(crate) average_rotation_update_interval: f32,
    pub(crate) translation_elapsed: f32,
    pub(crate) rotation_elapsed: f32,

    pub(crate) translation_smoothing_time: f32,
    pub(crate) rotation_smoothing_time: f32,
    max_translation_smoothing_time: f32,
    max_rotation_smoothing_time: f32,
    fixed_smoothing_time: Option<f32>,
    use_cubic_spline_blend: bool,

    algorithm: Algorithm,
    update_mode: UpdateMode,
    ownership: Ownership,
    force_upright: bool,
    clamping: GroundClampingData,

    pub(crate) articulations: ArticulationChain,
}

impl Default for EntityMotionState {
    fn default() -> Self {
        Self {
            last_translation: Vec3::ZERO,
            last_rotation: Vec3::ZERO,
            last_rotation_quat: Quat::IDENTITY,
            translation_before_update: Vec3::ZERO,
            rotation_before_update: Quat::IDENTITY,
            velocity_before_update: Vec3::ZERO,
            current_translation: Vec3::ZERO,
            current_rotation: Quat::IDENTITY,
            current_instant_velocity: Vec3::ZERO,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            flags: UpdateFlags::empty(),
            translation_initiated: false,
            rotation_initiated: false,
            rotation_resolved: true,
            last_translation_update_time: 0.0,
            last_rotation_update_time: 0.0,
            average_translation_update_interval: 0.0,
            average_rotation_update_interval: 0.0,
            translation_elapsed: 0.0,
            rotation_elapsed: 0.0,
            translation_smoothing_time: 0.0,
            rotation_smoothing_time: 0.0,
            max_translation_smoothing_time: 4.0,
            max_rotation_smoothing_time: 2.0,
            fixed_smoothing_time: None,
            use_cubic_spline_blend: false,
            algorithm: Algorithm::None,
            update_mode: UpdateMode::Auto,
            ownership: Ownership::Remote,
            force_upright: false,
            clamping: GroundClampingData::default(),
            articulations: ArticulationChain::default(),
        }
    }
}

impl EntityMotionState {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// New state using the configured smoothing limits.
    pub fn from_config(algorithm: Algorithm, cfg: &ReckonConfig) -> Self {
        Self {
            algorithm,
            max_translation_smoothing_time: cfg.max_translation_smoothing_time.max(0.0),
            max_rotation_smoothing_time: cfg.max_rotation_smoothing_time.max(0.0),
            ..Self::default()
        }
    }

    // ---- last known state -------------------------------------------------

    pub fn last_known_translation(&self) -> Vec3 {
        self.last_translation
    }

    /// Stores a new reported position.
    ///
    /// The first update of a tick snapshots the current predicted position as
    /// the smoothing source; later ones in the same tick keep that snapshot.
    pub fn set_last_known_translation(&mut self, v: Vec3) {
        self.mark_translation_updated(v);
        self.last_translation = v;
        self.translation_initiated = true;
        self.translation_elapsed = 0.0;
    }

    /// Heading/pitch/roll in radians.
    pub fn last_known_rotation(&self) -> Vec3 {
        self.last_rotation
    }

    pub fn last_known_rotation_quat(&self) -> Quat {
        self.last_rotation_quat
    }

    pub fn set_last_known_rotation(&mut self, hpr: Vec3) {
        let hpr = if self.force_upright {
            Vec3::new(hpr.x, 0.0, 0.0)
        } else {
            hpr
        };
        let quat = hpr_to_quat(hpr);
        if !self.flags.contains(UpdateFlags::ROTATION) {
            self.rotation_before_update = if self.rotation_initiated {
                self.current_rotation
            } else {
                quat
            };
        }
        self.last_rotation = hpr;
        self.last_rotation_quat = quat;
        self.rotation_initiated = true;
        self.rotation_elapsed = 0.0;
        self.flags.insert(UpdateFlags::ROTATION);
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Stores a new reported velocity. Counts as a translation update.
    pub fn set_velocity(&mut self, v: Vec3) {
        let mut before = self.current_instant_velocity;
        let reported = v.length();
        let instant = before.length();
        if instant > INSTANT_VELOCITY_SPIKE * reported && instant > 0.0 {
            before *= INSTANT_VELOCITY_TAMP * reported / instant;
        }
        self.velocity_before_update = before;
        let last = self.last_translation;
        self.mark_translation_updated(last);
        self.velocity = v;
        self.translation_elapsed = 0.0;
    }

    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    pub fn set_acceleration(&mut self, a: Vec3) {
        self.acceleration = a;
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Radians per second about each world axis.
    pub fn set_angular_velocity(&mut self, w: Vec3) {
        self.angular_velocity = w;
        self.rotation_resolved = false;
    }

    fn mark_translation_updated(&mut self, fallback: Vec3) {
        if !self.flags.contains(UpdateFlags::TRANSLATION) {
            self.translation_before_update = if self.translation_initiated {
                self.current_translation
            } else {
                fallback
            };
        }
        self.flags.insert(UpdateFlags::TRANSLATION);
    }

    /// Merges an update, skipping any non-finite field.
    ///
    /// Returns the number of fields applied.
    pub fn apply_update(&mut self, update: &EntityUpdate) -> usize {
        let mut applied = 0;
        let vec_field = |name: &str, v: Option<Vec3>| match v {
            Some(v) if v.is_finite() => Some(v),
            Some(v) => {
                warn!(field = name, value = ?v, "Rejected non-finite update field");
                None
            }
            None => None,
        };

        let translation = vec_field("translation", update.translation);
        let rotation = vec_field("rotation", update.rotation);
        let velocity = vec_field("velocity", update.velocity);
        let acceleration = vec_field("acceleration", update.acceleration);
        let angular_velocity = vec_field("angular_velocity", update.angular_velocity);

        if let Some(v) = translation {
            self.set_last_known_translation(v);
            applied += 1;
        }
        if let Some(v) = rotation {
            self.set_last_known_rotation(v);
            applied += 1;
        }
        if let Some(v) = velocity {
            self.set_velocity(v);
            applied += 1;
        }
        if let Some(v) = acceleration {
            self.set_acceleration(v);
            applied += 1;
        }
        if let Some(v) = angular_velocity {
            self.set_angular_velocity(v);
            applied += 1;
        }
        match update.ground_offset {
            Some(o) if o.is_finite() => {
                self.set_ground_offset(o);
                applied += 1;
            }
            Some(o) => warn!(field = "ground_offset", value = o, "Rejected non-finite update field"),
            None => {}
        }
        for art in &update.articulations {
            if !(art.location.is_finite() && art.rate.is_finite()) {
                warn!(part = %art.part, "Rejected non-finite articulation");
                continue;
            }
            let kind = PartKind::from_metric(&art.metric);
            self.articulations.add_stop(&art.part, kind, art.location, art.rate);
            applied += 1;
        }
        applied
    }

    // ---- flags ------------------------------------------------------------

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    pub fn is_updated(&self) -> bool {
        !self.flags.is_empty()
    }

    pub fn is_translation_updated(&self) -> bool {
        self.flags.contains(UpdateFlags::TRANSLATION)
    }

    pub fn is_rotation_updated(&self) -> bool {
        self.flags.contains(UpdateFlags::ROTATION)
    }

    pub fn clear_updated(&mut self) {
        self.flags = UpdateFlags::empty();
    }

    // ---- timing -----------------------------------------------------------

    /// Records when a translation update was taken into account and folds the
    /// interval into the running average.
    pub fn set_last_translation_update_time(&mut self, time: f64) {
        let delta = (time - self.last_translation_update_time) as f32;
        self.average_translation_update_interval =
            0.5 * delta + 0.5 * self.average_translation_update_interval;
        self.last_translation_update_time = time;
    }

    pub fn set_last_rotation_update_time(&mut self, time: f64) {
        let delta = (time - self.last_rotation_update_time) as f32;
        self.average_rotation_update_interval =
            0.5 * delta + 0.5 * self.average_rotation_update_interval;
        self.last_rotation_update_time = time;
    }

    pub fn last_translation_update_time(&self) -> f64 {
        self.last_translation_update_time
    }

    pub fn last_rotation_update_time(&self) -> f64 {
        self.last_rotation_update_time
    }

    pub fn average_translation_update_interval(&self) -> f32 {
        self.average_translation_update_interval
    }

    pub fn average_rotation_update_interval(&self) -> f32 {
        self.average_rotation_update_interval
    }

    pub fn translation_elapsed(&self) -> f32 {
        self.translation_elapsed
    }

    pub fn rotation_elapsed(&self) -> f32 {
        self.rotation_elapsed
    }

    /// Per-tick clock bookkeeping, run before prediction.
    ///
    /// Fresh updates are treated as having arrived on the previous tick.
    pub fn advance_clock(&mut self, sim_time: f64, dt: f32) {
        let arrived = sim_time - f64::from(dt);
        if self.is_translation_updated() {
            self.set_last_translation_update_time(arrived);
            self.translation_elapsed = 0.0;
        }
        if self.is_rotation_updated() {
            self.set_last_rotation_update_time(arrived);
            self.rotation_elapsed = 0.0;
            self.rotation_resolved = false;
        }
        self.translation_elapsed = (self.translation_elapsed + dt).max(0.0);
        self.rotation_elapsed = (self.rotation_elapsed + dt).max(0.0);
    }

    // ---- smoothing --------------------------------------------------------

    pub fn translation_smoothing_time(&self) -> f32 {
        self.translation_smoothing_time
    }

    pub fn rotation_smoothing_time(&self) -> f32 {
        self.rotation_smoothing_time
    }

    pub fn max_translation_smoothing_time(&self) -> f32 {
        self.max_translation_smoothing_time
    }

    pub fn set_max_translation_smoothing_time(&mut self, t: f32) {
        self.max_translation_smoothing_time = t.max(0.0);
    }

    pub fn max_rotation_smoothing_time(&self) -> f32 {
        self.max_rotation_smoothing_time
    }

    pub fn set_max_rotation_smoothing_time(&mut self, t: f32) {
        self.max_rotation_smoothing_time = t.max(0.0);
    }

    /// Use one fixed window for both translation and rotation instead of the
    /// adaptive one.
    pub fn set_fixed_smoothing_time(&mut self, t: Option<f32>) {
        self.fixed_smoothing_time = t.map(|t| t.max(0.0));
    }

    pub fn fixed_smoothing_time(&self) -> Option<f32> {
        self.fixed_smoothing_time
    }

    pub fn use_cubic_spline_blend(&self) -> bool {
        self.use_cubic_spline_blend
    }

    pub fn set_use_cubic_spline_blend(&mut self, on: bool) {
        self.use_cubic_spline_blend = on;
    }

    pub fn is_rotation_resolved(&self) -> bool {
        self.rotation_resolved
    }

    // ---- prediction output ------------------------------------------------

    pub fn current_translation(&self) -> Vec3 {
        self.current_translation
    }

    pub fn current_rotation(&self) -> Quat {
        self.current_rotation
    }

    pub fn current_rotation_hpr(&self) -> Vec3 {
        quat_to_hpr(self.current_rotation)
    }

    pub fn current_transform(&self) -> Transform {
        Transform::new(self.current_translation, self.current_rotation)
    }

    pub fn current_instant_velocity(&self) -> Vec3 {
        self.current_instant_velocity
    }

    pub fn last_known_transform(&self) -> Transform {
        Transform::new(self.last_translation, self.last_rotation_quat)
    }

    pub fn translation_before_update(&self) -> Vec3 {
        self.translation_before_update
    }

    pub fn rotation_before_update(&self) -> Quat {
        self.rotation_before_update
    }

    /// Makes the last known pose the drawn pose and the smoothing source.
    pub(crate) fn seed_from_last_known(&mut self) {
        self.translation_before_update = self.last_translation;
        self.rotation_before_update = self.last_rotation_quat;
        self.current_translation = self.last_translation;
        self.current_rotation = self.last_rotation_quat;
    }

    /// Adopts a host transform as the last known and drawn pose without
    /// flagging an update.
    pub(crate) fn seed_from_transform(&mut self, t: Transform) {
        self.last_translation = t.translation;
        self.last_rotation_quat = t.rotation;
        self.last_rotation = quat_to_hpr(t.rotation);
        self.translation_initiated = true;
        self.rotation_initiated = true;
        self.seed_from_last_known();
    }

    // ---- configuration ----------------------------------------------------

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    pub fn set_update_mode(&mut self, mode: UpdateMode) {
        self.update_mode = mode;
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn set_ownership(&mut self, ownership: Ownership) {
        self.ownership = ownership;
    }

    /// `Auto` becomes calculate-and-move for remote entities and
    /// calculate-only for local ones.
    pub fn effective_update_mode(&self) -> UpdateMode {
        match (self.update_mode, self.ownership) {
            (UpdateMode::Auto, Ownership::Remote) => UpdateMode::CalculateAndMoveActor,
            (UpdateMode::Auto, Ownership::Local) => UpdateMode::CalculateOnly,
            (mode, _) => mode,
        }
    }

    pub fn force_upright(&self) -> bool {
        self.force_upright
    }

    /// Zero pitch and roll of incoming rotations.
    pub fn set_force_upright(&mut self, on: bool) {
        self.force_upright = on;
    }

    pub fn is_flying(&self) -> bool {
        self.clamping.clamp_type == GroundClampType::None
    }

    pub fn set_flying(&mut self, flying: bool) {
        if flying {
            self.clamping.clamp_type = GroundClampType::None;
        } else if self.clamping.clamp_type == GroundClampType::None {
            self.clamping.clamp_type = GroundClampType::KeepAbove;
        }
    }

    pub fn ground_clamp_type(&self) -> GroundClampType {
        self.clamping.clamp_type
    }

    pub fn set_ground_clamp_type(&mut self, t: GroundClampType) {
        self.clamping.clamp_type = t;
    }

    pub fn ground_offset(&self) -> f32 {
        self.clamping.ground_offset
    }

    pub fn set_ground_offset(&mut self, offset: f32) {
        self.clamping.ground_offset = offset;
    }

    pub fn adjust_rotation_to_ground(&self) -> bool {
        self.clamping.adjust_rotation_to_ground
    }

    pub fn set_adjust_rotation_to_ground(&mut self, on: bool) {
        self.clamping.adjust_rotation_to_ground = on;
    }

    pub fn model_dimensions(&self) -> Option<Vec3> {
        self.clamping.model_dimensions
    }

    pub fn set_model_dimensions(&mut self, dims: Option<Vec3>) {
        self.clamping.model_dimensions = dims;
    }

    pub fn clamping_data(&self) -> GroundClampingData {
        self.clamping
    }

    /// Clamp effort for this entity.
    pub fn clamp_range_type(&self) -> ClampRangeType {
        if self.algorithm == Algorithm::None {
            return ClampRangeType::None;
        }
        self.clamping.range_type()
    }

    pub fn articulations(&self) -> &ArticulationChain {
        &self.articulations
    }

    pub fn articulations_mut(&mut self) -> &mut ArticulationChain {
        &mut self.articulations
    }
}
