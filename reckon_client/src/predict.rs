//! Prediction.
//!
//! [`DeadReckoner::predict`] turns an [`EntityMotionState`] whose clocks were
//! already advanced for this tick into the transform to draw. Right after an
//! update the result is blended from the pose the entity had when the update
//! arrived toward the freshly extrapolated one, over the smoothing windows.

use reckon_shared::math::{Quat, Transform, Vec3};
use tracing::{debug, warn};

use crate::motion::{Algorithm, EntityMotionState};

/// Velocities at or below this squared length count as standing still.
const VELOCITY_EPSILON_SQ: f32 = 1e-2;
const ACCELERATION_EPSILON_SQ: f32 = 1e-2;
const ANGULAR_VELOCITY_EPSILON_SQ: f32 = 1e-5;
/// Rotation windows shrink when the angular velocity covers less than this
/// share of the remaining rotation gap.
const ROTATION_REACH_FACTOR: f32 = 0.1;

/// Outcome of one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub transform: Transform,
    /// False when the transform needs no new clamp or write.
    pub changed: bool,
}

pub struct DeadReckoner;

impl DeadReckoner {
    /// Predicts the current pose and stores it as the state's current
    /// predicted pose.
    pub fn predict(state: &mut EntityMotionState, sim_time: f64, dt: f32) -> Prediction {
        let previous = state.current_transform();
        let (transform, changed) = match state.algorithm() {
            Algorithm::None => return unchanged(previous),
            Algorithm::Static => predict_static(state, previous),
            Algorithm::VelocityOnly | Algorithm::VelocityAndAcceleration => {
                if can_skip(state) {
                    debug!(sim_time, "Entity at rest; prediction skipped");
                    state.current_instant_velocity = Vec3::ZERO;
                    return unchanged(previous);
                }
                (predict_kinematic(state), true)
            }
        };

        if !transform.is_finite() {
            warn!(sim_time, ?transform, "Non-finite prediction discarded");
            return unchanged(previous);
        }

        state.current_instant_velocity = if dt > 0.0 {
            (transform.translation - previous.translation) / dt
        } else {
            Vec3::ZERO
        };
        state.current_translation = transform.translation;
        state.current_rotation = transform.rotation;
        Prediction { transform, changed }
    }
}

fn unchanged(transform: Transform) -> Prediction {
    Prediction {
        transform,
        changed: false,
    }
}

fn can_skip(state: &EntityMotionState) -> bool {
    !state.is_updated()
        && state.current_translation == state.last_translation
        && state.rotation_resolved
        && state.velocity.length_squared() <= VELOCITY_EPSILON_SQ
        && (state.algorithm() != Algorithm::VelocityAndAcceleration
            || state.acceleration.length_squared() <= ACCELERATION_EPSILON_SQ)
        && state.angular_velocity.length_squared() <= ANGULAR_VELOCITY_EPSILON_SQ
}

/// Recomputes both smoothing windows after an update.
pub fn calculate_smoothing_times(state: &mut EntityMotionState) {
    if let Some(fixed) = state.fixed_smoothing_time() {
        state.translation_smoothing_time = fixed;
        state.rotation_smoothing_time = fixed;
        return;
    }

    let avg_rotation = state.average_rotation_update_interval.max(0.0);
    let mut rotation = state.max_rotation_smoothing_time().min(avg_rotation);
    if state.algorithm() == Algorithm::VelocityAndAcceleration {
        let gap = (state.last_rotation_quat - state.current_rotation).length_squared();
        let reach = state.angular_velocity.length_squared() * rotation * rotation;
        if reach < ROTATION_REACH_FACTOR * gap {
            rotation = rotation.min(1.0);
        }
    }

    let avg_translation = state.average_translation_update_interval.max(0.0);
    let mut translation = state.max_translation_smoothing_time().min(avg_translation);
    let gap = (state.last_translation - state.current_translation).length_squared();
    if state.velocity.length_squared() * translation * translation < gap {
        translation = translation.min(1.0);
    }

    state.translation_smoothing_time = translation;
    state.rotation_smoothing_time = rotation;
}

fn predict_static(state: &mut EntityMotionState, previous: Transform) -> (Transform, bool) {
    if state.is_updated() {
        calculate_smoothing_times(state);
    }
    let rotation = reckon_rotation(state);

    let t = state.translation_elapsed;
    let w = state.translation_smoothing_time;
    let (translation, resolved) = if w > 0.0 && t < w {
        (state.translation_before_update.lerp(state.last_translation, t / w), false)
    } else {
        (state.last_translation, true)
    };

    let transform = Transform::new(translation, rotation);
    let changed = !resolved || !state.rotation_resolved || transform != previous;
    (transform, changed)
}

fn predict_kinematic(state: &mut EntityMotionState) -> Transform {
    if state.is_updated() {
        calculate_smoothing_times(state);
    }
    let rotation = reckon_rotation(state);
    Transform::new(reckon_translation(state), rotation)
}

fn reckon_rotation(state: &mut EntityMotionState) -> Quat {
    if state.rotation_resolved {
        return state.current_rotation;
    }

    let omega = state.angular_velocity;
    let spinning =
        state.algorithm().is_kinematic() && omega.length_squared() > ANGULAR_VELOCITY_EPSILON_SQ;
    let (start, target) = if spinning {
        let spin = Quat::from_scaled_axis(omega * state.rotation_elapsed);
        (spin * state.rotation_before_update, spin * state.last_rotation_quat)
    } else {
        (state.rotation_before_update, state.last_rotation_quat)
    };

    let t = state.rotation_elapsed;
    let w = state.rotation_smoothing_time;
    let rotation = if w > 0.0 && t < w {
        start.slerp(target, (t / w).clamp(0.0, 1.0))
    } else {
        // Spinning entities keep predicting.
        state.rotation_resolved = !spinning;
        target
    };
    rotation.normalize()
}

fn reckon_translation(state: &EntityMotionState) -> Vec3 {
    let t = state.translation_elapsed;
    let w = state.translation_smoothing_time;
    let acceleration = if state.algorithm() == Algorithm::VelocityAndAcceleration {
        state.acceleration
    } else {
        Vec3::ZERO
    };
    let target = state.last_translation + state.velocity * t + acceleration * (0.5 * t * t);

    if !(w > 0.0 && t < w) {
        return target;
    }
    if state.use_cubic_spline_blend() {
        return cubic_blend(state, acceleration, t, w);
    }

    // Blend the velocity too, over a third of the window.
    let velocity_window = w / 3.0;
    let blended_velocity = if t < velocity_window {
        state
            .velocity_before_update
            .lerp(state.velocity, t / velocity_window)
    } else {
        state.velocity
    };
    let source =
        state.translation_before_update + blended_velocity * t + acceleration * (0.5 * t * t);
    source.lerp(target, t / w)
}

/// Bezier from the pre-update pose and velocity to where the entity will be
/// at the end of the window.
fn cubic_blend(state: &EntityMotionState, acceleration: Vec3, t: f32, w: f32) -> Vec3 {
    let p0 = state.translation_before_update;
    let p1 = p0 + state.velocity_before_update * (w / 3.0);
    let p3 = state.last_translation + state.velocity * w + acceleration * (0.5 * w * w);
    let p2 = p3 - (state.velocity + acceleration * w) * (w / 3.0);

    let s = (t / w).clamp(0.0, 1.0);
    let u = 1.0 - s;
    p0 * (u * u * u) + p1 * (3.0 * u * u * s) + p2 * (3.0 * u * s * s) + p3 * (s * s * s)
}
