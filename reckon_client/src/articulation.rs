//! Articulated part motion.
//!
//! Each named part keeps an ordered list of stops (oldest first). While a
//! part has a successor stop it interpolates toward it over the articulation
//! smoothing window; a lone stop is extrapolated by its rate.

use reckon_shared::{
    host::PartPose,
    math::{wrap_pi_vec, wrap_two_pi_vec, Vec3},
};
use serde::{Deserialize, Serialize};

/// Whether a part's value is an angle triple or an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartKind {
    Rotational,
    Positional,
}

impl PartKind {
    /// Derives the kind from the metric name that came with the update.
    pub fn from_metric(metric: &str) -> Self {
        match metric {
            "Position" | "Extension" | "LocationX" | "LocationY" | "LocationZ" => {
                PartKind::Positional
            }
            _ => PartKind::Rotational,
        }
    }

    fn pose(self, value: Vec3) -> PartPose {
        match self {
            PartKind::Rotational => PartPose::Rotation(value),
            PartKind::Positional => PartPose::Position(value),
        }
    }
}

/// One motion stop of a part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub start: Vec3,
    pub rate: Vec3,
    pub elapsed: f32,
    pub resolved: bool,
}

impl Stop {
    fn new(start: Vec3, rate: Vec3) -> Self {
        Self {
            start,
            rate,
            elapsed: 0.0,
            resolved: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    name: String,
    kind: PartKind,
    current: Vec3,
    stops: Vec<Stop>,
}

/// Stops for every articulated part of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticulationChain {
    parts: Vec<Part>,
}

impl ArticulationChain {
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.stops.is_empty())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    pub fn stops(&self, part: &str) -> Option<&[Stop]> {
        self.part(part).map(|p| p.stops.as_slice())
    }

    /// Last value produced for a part.
    pub fn current(&self, part: &str) -> Option<Vec3> {
        self.part(part).map(|p| p.current)
    }

    pub fn kind(&self, part: &str) -> Option<PartKind> {
        self.part(part).map(|p| p.kind)
    }

    fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// Appends a new target for `part`.
    ///
    /// The previous tail is re-based on the part's current value so the
    /// interpolation toward the new stop starts where the part actually is.
    pub fn add_stop(&mut self, part: &str, kind: PartKind, location: Vec3, rate: Vec3) {
        match self.parts.iter_mut().find(|p| p.name == part) {
            Some(p) => {
                p.kind = kind;
                let current = p.current;
                if let Some(tail) = p.stops.last_mut() {
                    tail.elapsed = 0.0;
                    tail.start = current;
                    tail.resolved = false;
                }
                p.stops.push(Stop::new(location, rate));
            }
            None => self.parts.push(Part {
                name: part.to_string(),
                kind,
                current: location,
                stops: vec![Stop::new(location, rate)],
            }),
        }
    }

    /// Drops a part and all of its stops. Returns whether it existed.
    pub fn remove_part(&mut self, part: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| p.name != part);
        self.parts.len() != before
    }

    pub fn clear(&mut self) {
        self.parts.clear();
    }

    /// Advances one part by `dt`. Returns the new pose, or `None` when the
    /// part is unknown, has no stops, or is at rest.
    pub fn advance(&mut self, part: &str, dt: f32, window: f32) -> Option<PartPose> {
        let p = self.parts.iter_mut().find(|p| p.name == part)?;
        advance_part(p, dt, window)
    }

    /// Advances every part, returning the poses that changed.
    pub fn advance_all(&mut self, dt: f32, window: f32) -> Vec<(String, PartPose)> {
        self.parts
            .iter_mut()
            .filter_map(|p| advance_part(p, dt, window).map(|pose| (p.name.clone(), pose)))
            .collect()
    }
}

fn advance_part(p: &mut Part, dt: f32, window: f32) -> Option<PartPose> {
    // The re-based tail is the source, the newest stop its target.
    let len = p.stops.len();
    if len > 2 {
        p.stops.drain(..len - 2);
    }

    match p.stops.len() {
        0 => None,
        1 => {
            let only = &mut p.stops[0];
            if only.resolved {
                return None;
            }
            only.elapsed += dt;
            p.current = match p.kind {
                PartKind::Rotational => wrap_two_pi_vec(only.start + only.rate * only.elapsed),
                PartKind::Positional => only.start,
            };
            only.resolved = p.kind == PartKind::Positional || only.rate == Vec3::ZERO;
            Some(p.kind.pose(p.current))
        }
        _ => {
            let target = p.stops[1].start;
            let first = &mut p.stops[0];
            first.elapsed += dt;
            let ratio = if window > 0.0 { first.elapsed / window } else { 1.0 };
            if ratio >= 1.0 {
                p.current = target;
                p.stops.remove(0);
                let promoted = &mut p.stops[0];
                promoted.start = target;
                promoted.elapsed = 0.0;
            } else {
                p.current = interpolate(p.kind, first.start, target, ratio);
            }
            Some(p.kind.pose(p.current))
        }
    }
}

fn interpolate(kind: PartKind, from: Vec3, to: Vec3, ratio: f32) -> Vec3 {
    match kind {
        PartKind::Positional => from.lerp(to, ratio),
        PartKind::Rotational => wrap_two_pi_vec(from + wrap_pi_vec(to - from) * ratio),
    }
}
