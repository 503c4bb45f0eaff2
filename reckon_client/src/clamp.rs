//! Ground clamping.
//!
//! The scheduler queues one [`ClampRequest`] per moved entity during a tick
//! and calls [`GroundClamper::finish_up`] exactly once afterwards. The
//! returned [`ClampResult`]s are the final actor transforms for the frame.

use reckon_shared::{
    ecs::EntityId,
    math::{Quat, Transform, Vec3},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How an entity is kept on the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroundClampType {
    /// Never clamped (flying).
    None,
    /// Raised to the ground if below it, otherwise left alone.
    #[default]
    KeepAbove,
    /// Always snapped to the ground.
    Full,
}

/// How much effort the clamper spends on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClampRangeType {
    #[default]
    None,
    /// Height only, and only when the transform changed.
    Intermittent,
    /// Every tick, with rotation following the terrain.
    Ranged,
}

/// Per-entity clamping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundClampingData {
    pub clamp_type: GroundClampType,
    /// Added to the ground height.
    pub ground_offset: f32,
    pub adjust_rotation_to_ground: bool,
    /// Width (x), length (y) and height (z) of the model footprint.
    pub model_dimensions: Option<Vec3>,
}

impl GroundClampingData {
    pub fn range_type(&self) -> ClampRangeType {
        match self.clamp_type {
            GroundClampType::None => ClampRangeType::None,
            _ if self.adjust_rotation_to_ground => ClampRangeType::Ranged,
            _ => ClampRangeType::Intermittent,
        }
    }
}

/// One queued clamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ClampRequest {
    pub range: ClampRangeType,
    pub sim_time: f64,
    pub transform: Transform,
    pub entity: EntityId,
    pub data: GroundClampingData,
    pub transform_changed: bool,
    pub velocity: Vec3,
}

/// Final transform for an actor after clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampResult {
    pub entity: EntityId,
    pub transform: Transform,
}

/// Collaborator that places predicted transforms on the terrain.
pub trait GroundClamper {
    /// Queues a request; nothing is applied until [`GroundClamper::finish_up`].
    fn clamp_to_ground(&mut self, request: ClampRequest);

    /// Processes the queued batch and returns the transforms to apply.
    fn finish_up(&mut self) -> Vec<ClampResult>;

    /// Position of the viewer this frame, if any.
    fn update_eye_point(&mut self, eye: Option<Vec3>);

    fn eye_point_actor(&self) -> Option<EntityId>;
    fn set_eye_point_actor(&mut self, actor: Option<EntityId>);

    fn terrain_actor(&self) -> Option<EntityId>;
    fn set_terrain_actor(&mut self, actor: Option<EntityId>);
}

/// Height field queried by [`BatchGroundClamper`].
pub trait TerrainQuery {
    /// Ground height below `(x, y)`, or `None` outside the terrain.
    fn height_at(&self, x: f32, y: f32) -> Option<f32>;
}

impl<F> TerrainQuery for F
where
    F: Fn(f32, f32) -> Option<f32>,
{
    fn height_at(&self, x: f32, y: f32) -> Option<f32> {
        self(x, y)
    }
}

/// Infinite horizontal plane.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlatTerrain {
    pub height: f32,
}

impl FlatTerrain {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl TerrainQuery for FlatTerrain {
    fn height_at(&self, _x: f32, _y: f32) -> Option<f32> {
        Some(self.height)
    }
}

/// Queue-then-flush clamper over a [`TerrainQuery`].
///
/// Requests are only clamped while a terrain actor is set; otherwise they
/// pass through unchanged.
pub struct BatchGroundClamper<T: TerrainQuery> {
    terrain: T,
    pending: Vec<ClampRequest>,
    eye_point: Option<Vec3>,
    eye_point_actor: Option<EntityId>,
    terrain_actor: Option<EntityId>,
    high_res_clamp_range: f32,
}

impl<T: TerrainQuery> BatchGroundClamper<T> {
    pub fn new(terrain: T) -> Self {
        Self {
            terrain,
            pending: Vec::new(),
            eye_point: None,
            eye_point_actor: None,
            terrain_actor: None,
            high_res_clamp_range: 0.0,
        }
    }

    /// Within this distance of the eye point ranged requests use three
    /// points. Zero means always.
    pub fn with_high_res_clamp_range(mut self, range: f32) -> Self {
        self.high_res_clamp_range = range.max(0.0);
        self
    }

    pub fn terrain(&self) -> &T {
        &self.terrain
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn wants_three_point(&self, req: &ClampRequest) -> bool {
        if req.range != ClampRangeType::Ranged || req.data.model_dimensions.is_none() {
            return false;
        }
        if self.high_res_clamp_range <= 0.0 {
            return true;
        }
        match self.eye_point {
            Some(eye) => eye.distance(req.transform.translation) <= self.high_res_clamp_range,
            None => true,
        }
    }

    fn clamp_one(&self, req: &ClampRequest) -> Option<Transform> {
        match req.range {
            ClampRangeType::None | ClampRangeType::Intermittent if !req.transform_changed => {
                return None
            }
            ClampRangeType::None => return Some(req.transform),
            _ => {}
        }

        let mut out = req.transform;
        let pos = out.translation;

        if self.wants_three_point(req) {
            if let Some((height, normal)) = self.sample_three_point(req) {
                out.translation.z = clamped_height(req.data, pos.z, height);
                if req.data.adjust_rotation_to_ground {
                    let heading = out.hpr().x;
                    out.rotation = (Quat::from_rotation_arc(Vec3::Z, normal)
                        * Quat::from_rotation_z(heading))
                    .normalize();
                }
                return Some(out);
            }
        }

        match self.terrain.height_at(pos.x, pos.y) {
            Some(height) => out.translation.z = clamped_height(req.data, pos.z, height),
            None => debug!(entity = %req.entity, "No terrain below entity; left unclamped"),
        }
        Some(out)
    }

    /// Samples the front and both rear corners of the footprint. Returns the
    /// plane height below the center and the plane's upward normal.
    fn sample_three_point(&self, req: &ClampRequest) -> Option<(f32, Vec3)> {
        let dims = req.data.model_dimensions?;
        let pos = req.transform.translation;
        let footprint = Transform::new(pos, Quat::from_rotation_z(req.transform.hpr().x));
        let (half_w, half_l) = (dims.x * 0.5, dims.y * 0.5);

        let corners = [
            Vec3::new(0.0, half_l, 0.0),
            Vec3::new(-half_w, -half_l, 0.0),
            Vec3::new(half_w, -half_l, 0.0),
        ];
        let mut pts = [Vec3::ZERO; 3];
        for (pt, local) in pts.iter_mut().zip(corners) {
            let world = footprint.transform_point(local);
            *pt = Vec3::new(world.x, world.y, self.terrain.height_at(world.x, world.y)?);
        }

        let mut normal = (pts[1] - pts[0]).cross(pts[2] - pts[0]).try_normalize()?;
        if normal.z < 0.0 {
            normal = -normal;
        }
        if normal.z.abs() < 1e-4 {
            return None;
        }
        let height =
            pts[0].z - (normal.x * (pos.x - pts[0].x) + normal.y * (pos.y - pts[0].y)) / normal.z;
        Some((height, normal))
    }
}

fn clamped_height(data: GroundClampingData, z: f32, ground: f32) -> f32 {
    let target = ground + data.ground_offset;
    match data.clamp_type {
        GroundClampType::None => z,
        GroundClampType::KeepAbove => z.max(target),
        GroundClampType::Full => target,
    }
}

impl<T: TerrainQuery> GroundClamper for BatchGroundClamper<T> {
    fn clamp_to_ground(&mut self, request: ClampRequest) {
        self.pending.push(request);
    }

    fn finish_up(&mut self) -> Vec<ClampResult> {
        let batch = std::mem::take(&mut self.pending);
        if self.terrain_actor.is_none() {
            if !batch.is_empty() {
                debug!(count = batch.len(), "No terrain actor; clamp batch passed through");
            }
            return batch
                .into_iter()
                .filter(|r| r.transform_changed)
                .map(|r| ClampResult {
                    entity: r.entity,
                    transform: r.transform,
                })
                .collect();
        }

        batch
            .iter()
            .filter_map(|req| {
                self.clamp_one(req).map(|transform| ClampResult {
                    entity: req.entity,
                    transform,
                })
            })
            .collect()
    }

    fn update_eye_point(&mut self, eye: Option<Vec3>) {
        self.eye_point = eye;
    }

    fn eye_point_actor(&self) -> Option<EntityId> {
        self.eye_point_actor
    }

    fn set_eye_point_actor(&mut self, actor: Option<EntityId>) {
        self.eye_point_actor = actor;
    }

    fn terrain_actor(&self) -> Option<EntityId> {
        self.terrain_actor
    }

    fn set_terrain_actor(&mut self, actor: Option<EntityId>) {
        self.terrain_actor = actor;
    }
}

/// Clamper that applies predicted transforms unchanged.
#[derive(Debug, Default)]
pub struct NoGroundClamp {
    pending: Vec<ClampResult>,
    eye_point_actor: Option<EntityId>,
    terrain_actor: Option<EntityId>,
}

impl GroundClamper for NoGroundClamp {
    fn clamp_to_ground(&mut self, request: ClampRequest) {
        if request.transform_changed {
            self.pending.push(ClampResult {
                entity: request.entity,
                transform: request.transform,
            });
        }
    }

    fn finish_up(&mut self) -> Vec<ClampResult> {
        std::mem::take(&mut self.pending)
    }

    fn update_eye_point(&mut self, _eye: Option<Vec3>) {}

    fn eye_point_actor(&self) -> Option<EntityId> {
        self.eye_point_actor
    }

    fn set_eye_point_actor(&mut self, actor: Option<EntityId>) {
        self.eye_point_actor = actor;
    }

    fn terrain_actor(&self) -> Option<EntityId> {
        self.terrain_actor
    }

    fn set_terrain_actor(&mut self, actor: Option<EntityId>) {
        self.terrain_actor = actor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(z: f32, data: GroundClampingData) -> ClampRequest {
        ClampRequest {
            range: data.range_type(),
            sim_time: 0.0,
            transform: Transform::from_hpr(Vec3::new(1.0, 2.0, z), Vec3::ZERO),
            entity: EntityId(1),
            data,
            transform_changed: true,
            velocity: Vec3::ZERO,
        }
    }

    fn clamper(height: f32) -> BatchGroundClamper<FlatTerrain> {
        let mut c = BatchGroundClamper::new(FlatTerrain::new(height));
        c.set_terrain_actor(Some(EntityId(99)));
        c
    }

    #[test]
    fn range_type_follows_clamp_settings() {
        let mut data = GroundClampingData::default();
        assert_eq!(data.range_type(), ClampRangeType::Intermittent);
        data.adjust_rotation_to_ground = true;
        assert_eq!(data.range_type(), ClampRangeType::Ranged);
        data.clamp_type = GroundClampType::None;
        assert_eq!(data.range_type(), ClampRangeType::None);
    }

    #[test]
    fn keep_above_only_raises() {
        let mut c = clamper(5.0);
        let data = GroundClampingData {
            ground_offset: 0.5,
            ..Default::default()
        };
        c.clamp_to_ground(request(2.0, data));
        c.clamp_to_ground(ClampRequest {
            entity: EntityId(2),
            ..request(9.0, data)
        });
        let out = c.finish_up();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].transform.translation.z, 5.5);
        assert_eq!(out[1].transform.translation.z, 9.0);
        assert_eq!(c.pending(), 0);
    }

    #[test]
    fn full_always_snaps() {
        let mut c = clamper(1.0);
        let data = GroundClampingData {
            clamp_type: GroundClampType::Full,
            ..Default::default()
        };
        c.clamp_to_ground(request(30.0, data));
        assert_eq!(c.finish_up()[0].transform.translation.z, 1.0);
    }

    #[test]
    fn unchanged_intermittent_request_is_skipped() {
        let mut c = clamper(0.0);
        let mut req = request(0.0, GroundClampingData::default());
        req.transform_changed = false;
        c.clamp_to_ground(req);
        assert!(c.finish_up().is_empty());
    }

    #[test]
    fn unclamped_range_only_returns_changed() {
        let mut c = clamper(10.0);
        let data = GroundClampingData {
            clamp_type: GroundClampType::None,
            ..Default::default()
        };
        let mut stale = request(-2.0, data);
        stale.transform_changed = false;
        c.clamp_to_ground(stale);
        assert!(c.finish_up().is_empty());

        c.clamp_to_ground(request(-2.0, data));
        assert_eq!(c.finish_up()[0].transform.translation.z, -2.0);
    }

    #[test]
    fn no_terrain_actor_passes_through() {
        let mut c = BatchGroundClamper::new(FlatTerrain::new(100.0));
        c.clamp_to_ground(request(3.0, GroundClampingData::default()));
        assert_eq!(c.finish_up()[0].transform.translation.z, 3.0);
    }

    #[test]
    fn three_point_follows_slope() {
        // Ground rises one unit per unit of y.
        let slope = |_x: f32, y: f32| Some(y);
        let mut c = BatchGroundClamper::new(slope);
        c.set_terrain_actor(Some(EntityId(99)));
        let data = GroundClampingData {
            clamp_type: GroundClampType::Full,
            adjust_rotation_to_ground: true,
            model_dimensions: Some(Vec3::new(2.0, 4.0, 1.0)),
            ..Default::default()
        };
        c.clamp_to_ground(request(0.0, data));
        let out = c.finish_up()[0].transform;
        assert!((out.translation.z - 2.0).abs() < 1e-4, "{out:?}");
        let up = out.rotation * Vec3::Z;
        let expected = Vec3::new(0.0, -1.0, 1.0).normalize();
        assert!(up.abs_diff_eq(expected, 1e-4), "{up:?}");
    }

    #[test]
    fn far_from_eye_uses_single_point() {
        let slope = |_x: f32, y: f32| Some(y);
        let mut c = BatchGroundClamper::new(slope).with_high_res_clamp_range(10.0);
        c.set_terrain_actor(Some(EntityId(99)));
        c.update_eye_point(Some(Vec3::new(500.0, 0.0, 0.0)));
        let data = GroundClampingData {
            clamp_type: GroundClampType::Full,
            adjust_rotation_to_ground: true,
            model_dimensions: Some(Vec3::new(2.0, 4.0, 1.0)),
            ..Default::default()
        };
        c.clamp_to_ground(request(0.0, data));
        let out = c.finish_up()[0].transform;
        assert!((out.translation.z - 2.0).abs() < 1e-4);
        assert!(out.rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn no_ground_clamp_only_returns_changed() {
        let mut c = NoGroundClamp::default();
        c.clamp_to_ground(request(-4.0, GroundClampingData::default()));
        let mut stale = request(1.0, GroundClampingData::default());
        stale.transform_changed = false;
        c.clamp_to_ground(stale);
        let out = c.finish_up();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].transform.translation.z, -4.0);
    }
}
