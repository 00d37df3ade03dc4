//! Screen-point to world-position resolution.
//!
//! The cascade runs in strict priority order and the first stage that
//! produces a result wins:
//!
//! 1. extent of an already-tracked plane
//! 2. high-confidence feature points inside an 18° cone, 0.2–2.0 m
//! 3. infinite horizontal plane at the reference object's height, when
//!    stage 2 failed or infinite-plane mode was requested
//! 4. stage 2's result, when it succeeded and stage 3 was skipped
//! 5. unfiltered nearest feature point to the ray
//! 6. no result

use std::collections::VecDeque;

use glam::{Vec2, Vec3};

use crate::entity::Transform;
use crate::math::{self, Ray};
use crate::plane::{PlaneId, PlaneRegistry};
use crate::session::FrameSnapshot;

/// Cone opening angle for high-confidence feature hits.
pub const FEATURE_CONE_ANGLE: f32 = 18.0 * std::f32::consts::PI / 180.0;
/// Feature hits closer than this are rejected as too near the camera.
pub const FEATURE_MIN_DISTANCE: f32 = 0.2;
/// Feature hits beyond this are rejected as unreliable.
pub const FEATURE_MAX_DISTANCE: f32 = 2.0;
/// Number of camera-to-object distances averaged while dragging.
pub const SMOOTHING_WINDOW: usize = 10;

/// One resolution query.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest {
    pub screen_point: Vec2,
    /// Current object position; its height anchors the infinite plane.
    pub reference_position: Option<Vec3>,
    /// Force the infinite-plane stage even when feature hits exist.
    pub allow_infinite_plane: bool,
    /// Apply depth averaging to inexact results (set while dragging).
    pub smooth: bool,
}

/// Result of a resolution query.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub position: Vec3,
    /// Full transform when the hit carried one (tracked-plane hits).
    pub exact_transform: Option<Transform>,
    pub plane: Option<PlaneId>,
    /// True for plane-guessed or low-quality results, false for real hits.
    pub estimated: bool,
}

/// Stateful resolver; the depth-smoothing window persists across calls so
/// a drag keeps a stable distance even when individual hits jitter.
#[derive(Debug, Default)]
pub struct SpatialResolver {
    recent_distances: VecDeque<f32>,
}

impl SpatialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the smoothing window; called when a drag ends.
    pub fn reset_smoothing(&mut self) {
        self.recent_distances.clear();
    }

    /// Runs the cascade for one screen point.
    pub fn resolve(
        &mut self,
        planes: &PlaneRegistry,
        frame: &FrameSnapshot,
        req: &ResolveRequest,
    ) -> Option<Resolution> {
        let ray = frame.camera.screen_ray(req.screen_point)?;

        // 1. Tracked plane extents.
        if let Some((plane, _, position)) = planes.hit_test(&ray) {
            let mut transform = Transform::from_position(position);
            transform.rotation = plane.orientation;
            let resolution = Resolution {
                position,
                exact_transform: Some(transform),
                plane: Some(plane.id),
                estimated: false,
            };
            return Some(self.finish(resolution, &ray, frame, req));
        }

        // 2. High-confidence feature points in the cone.
        let cone_hit = Self::feature_cone_hit(&ray, frame);

        // 3. Infinite horizontal plane at the reference height, when the
        // cone produced nothing or infinite-plane mode was requested.
        if cone_hit.is_none() || req.allow_infinite_plane {
            if let Some(reference) = req.reference_position {
                if let Some(position) = math::ray_horizontal_plane(&ray, reference.y) {
                    let resolution = Resolution {
                        position,
                        exact_transform: None,
                        plane: None,
                        estimated: true,
                    };
                    return Some(self.finish(resolution, &ray, frame, req));
                }
            }
        }

        // 4. The cone hit, when stage 3 was skipped or failed.
        if let Some(position) = cone_hit {
            let resolution = Resolution {
                position,
                exact_transform: None,
                plane: None,
                estimated: false,
            };
            return Some(self.finish(resolution, &ray, frame, req));
        }

        // 5. Unfiltered nearest feature point.
        if let Some(position) = Self::nearest_feature(&ray, frame) {
            let resolution = Resolution {
                position,
                exact_transform: None,
                plane: None,
                estimated: true,
            };
            return Some(self.finish(resolution, &ray, frame, req));
        }

        // 6. Nothing.
        None
    }

    /// Best feature point inside the cone and range window: the one with
    /// the smallest perpendicular distance to the ray.
    fn feature_cone_hit(ray: &Ray, frame: &FrameSnapshot) -> Option<Vec3> {
        frame
            .feature_points
            .iter()
            .copied()
            .filter(|&p| {
                let distance = (p - ray.origin).length();
                if !(FEATURE_MIN_DISTANCE..=FEATURE_MAX_DISTANCE).contains(&distance) {
                    return false;
                }
                ray.angle_to_point(p)
                    .is_some_and(|angle| angle <= FEATURE_CONE_ANGLE * 0.5)
            })
            .min_by(|a, b| {
                ray.distance_to_point(*a)
                    .total_cmp(&ray.distance_to_point(*b))
            })
    }

    /// Last-resort feature lookup with no cone or range filter.
    fn nearest_feature(ray: &Ray, frame: &FrameSnapshot) -> Option<Vec3> {
        frame
            .feature_points
            .iter()
            .copied()
            .min_by(|a, b| {
                ray.distance_to_point(*a)
                    .total_cmp(&ray.distance_to_point(*b))
            })
    }

    /// Applies the depth-averaging filter. The averaged camera distance is
    /// reapplied along the *current* ray, damping depth jitter without
    /// lagging lateral motion. Exact transforms keep their own position;
    /// their rotation is preserved regardless.
    fn finish(
        &mut self,
        mut resolution: Resolution,
        ray: &Ray,
        frame: &FrameSnapshot,
        req: &ResolveRequest,
    ) -> Resolution {
        if !req.smooth {
            return resolution;
        }
        let distance = (resolution.position - frame.camera.position).length();
        self.recent_distances.push_back(distance);
        while self.recent_distances.len() > SMOOTHING_WINDOW {
            self.recent_distances.pop_front();
        }
        if resolution.exact_transform.is_none() {
            let sum: f32 = self.recent_distances.iter().sum();
            let average = sum / self.recent_distances.len() as f32;
            resolution.position = ray.point_at(average);
        }
        resolution
    }
}
