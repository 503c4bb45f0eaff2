//! Math types.
//!
//! Vectors and quaternions come from `glam`; this module adds the rigid
//! `Transform` handed between the predictor, the ground clamper and the host,
//! plus the heading/pitch/roll conventions and angle wrapping used by
//! articulated parts.
//!
//! Rotations are expressed as heading (about +Z), pitch (about +X) and roll
//! (about +Y), composed as `H * P * R`.

use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

pub use glam::{EulerRot, Quat, Vec3};

/// Euler order matching heading/pitch/roll composition.
pub const HPR_ORDER: EulerRot = EulerRot::ZXY;

/// Converts heading/pitch/roll (radians) to a quaternion.
pub fn hpr_to_quat(hpr: Vec3) -> Quat {
    Quat::from_euler(HPR_ORDER, hpr.x, hpr.y, hpr.z)
}

/// Converts a quaternion back to heading/pitch/roll (radians).
pub fn quat_to_hpr(q: Quat) -> Vec3 {
    let (h, p, r) = q.to_euler(HPR_ORDER);
    Vec3::new(h, p, r)
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_pi(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Wraps an angle into `[0, 2PI)`.
pub fn wrap_two_pi(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Component-wise [`wrap_pi`].
pub fn wrap_pi_vec(v: Vec3) -> Vec3 {
    Vec3::new(wrap_pi(v.x), wrap_pi(v.y), wrap_pi(v.z))
}

/// Component-wise [`wrap_two_pi`].
pub fn wrap_two_pi_vec(v: Vec3) -> Vec3 {
    Vec3::new(wrap_two_pi(v.x), wrap_two_pi(v.y), wrap_two_pi(v.z))
}

/// Rigid transform: translation plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub const fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Builds a transform from a translation and heading/pitch/roll.
    pub fn from_hpr(translation: Vec3, hpr: Vec3) -> Self {
        Self::new(translation, hpr_to_quat(hpr))
    }

    /// Heading/pitch/roll of the rotation.
    pub fn hpr(&self) -> Vec3 {
        quat_to_hpr(self.rotation)
    }

    /// Replaces the rotation from heading/pitch/roll.
    pub fn set_hpr(&mut self, hpr: Vec3) {
        self.rotation = hpr_to_quat(hpr);
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite()
    }

    /// Transforms a point from local space into world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.translation + self.rotation * local
    }

    /// Approximate equality. Quaternions `q` and `-q` compare equal.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && (self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
                || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff))
    }
}
