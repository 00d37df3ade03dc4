//! Ray geometry and camera projection helpers.
//!
//! Every intersection routine returns `Option` — degenerate inputs
//! (zero-length directions, rays parallel to their target plane) yield
//! `None` instead of propagating NaNs into entity transforms.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Minimum squared length below which a vector is treated as zero.
pub const EPSILON: f32 = 1e-6;

/// A world-space ray with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Builds a ray, normalizing the direction. Returns `None` for a
    /// zero-length direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        if direction.length_squared() < EPSILON {
            return None;
        }
        Some(Self {
            origin,
            direction: direction.normalize(),
        })
    }

    /// Point along the ray at parameter `t`.
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Perpendicular distance from `point` to the ray's supporting line.
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        let to_point = point - self.origin;
        to_point.cross(self.direction).length()
    }

    /// Angle in radians between the ray direction and the direction from
    /// the ray origin to `point`. `None` when `point` sits on the origin.
    pub fn angle_to_point(&self, point: Vec3) -> Option<f32> {
        let to_point = point - self.origin;
        if to_point.length_squared() < EPSILON {
            return None;
        }
        let cos = self
            .direction
            .dot(to_point.normalize())
            .clamp(-1.0, 1.0);
        Some(cos.acos())
    }
}

/// Intersects a ray with the infinite horizontal plane at `plane_y`.
/// Returns the hit position, or `None` when the ray is parallel to the
/// plane or the hit lies behind the origin.
pub fn ray_horizontal_plane(ray: &Ray, plane_y: f32) -> Option<Vec3> {
    if ray.direction.y.abs() < EPSILON {
        return None;
    }
    let t = (plane_y - ray.origin.y) / ray.direction.y;
    if t <= 0.0 {
        return None;
    }
    Some(ray.point_at(t))
}

/// Intersects a ray with an arbitrary infinite plane given by a point and
/// normal. Returns `(t, position)`.
pub fn ray_plane(ray: &Ray, plane_point: Vec3, plane_normal: Vec3) -> Option<(f32, Vec3)> {
    let denom = plane_normal.dot(ray.direction);
    if denom.abs() < EPSILON {
        return None;
    }
    let t = plane_normal.dot(plane_point - ray.origin) / denom;
    if t <= 0.0 {
        return None;
    }
    Some((t, ray.point_at(t)))
}

/// Intersects a ray with a finite rectangle: the rect lies in the plane
/// through `center` with `orientation`, spanning `extent` (width across
/// local X, depth across local Z), local +Y as its normal.
pub fn ray_rect(ray: &Ray, center: Vec3, orientation: Quat, extent: Vec2) -> Option<(f32, Vec3)> {
    let normal = orientation * Vec3::Y;
    let (t, hit) = ray_plane(ray, center, normal)?;
    let local = orientation.inverse() * (hit - center);
    if local.x.abs() <= extent.x * 0.5 && local.z.abs() <= extent.y * 0.5 {
        Some((t, hit))
    } else {
        None
    }
}

/// Intersects a ray with an oriented bounding box (slab test in the box's
/// local frame). Returns the entry parameter `t`.
pub fn ray_obb(
    ray: &Ray,
    center: Vec3,
    orientation: Quat,
    half_extents: Vec3,
) -> Option<f32> {
    let inv = orientation.inverse();
    let origin = inv * (ray.origin - center);
    let direction = inv * ray.direction;

    let mut t_min = 0.0_f32;
    let mut t_max = f32::MAX;
    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        let h = half_extents[axis];
        if d.abs() < EPSILON {
            if o.abs() > h {
                return None;
            }
            continue;
        }
        let mut t0 = (-h - o) / d;
        let mut t1 = (h - o) / d;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

/// Wraps an angle to the `(-π, π]` interval.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % std::f32::consts::TAU;
    if a <= -std::f32::consts::PI {
        a += std::f32::consts::TAU;
    } else if a > std::f32::consts::PI {
        a -= std::f32::consts::TAU;
    }
    a
}

/// Pinhole camera pose + intrinsics used to convert between screen points
/// and world rays. Screen coordinates are in pixels, origin at the top
/// left, Y down; the camera looks along its local -Z.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Viewport size in pixels.
    pub viewport: Vec2,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

impl Camera {
    pub fn new(position: Vec3, rotation: Quat, viewport: Vec2, fov_y: f32) -> Self {
        Self {
            position,
            rotation,
            viewport,
            fov_y,
        }
    }

    /// Center of the viewport in pixels.
    pub fn viewport_center(&self) -> Vec2 {
        self.viewport * 0.5
    }

    /// World-space ray through the given screen point.
    pub fn screen_ray(&self, screen: Vec2) -> Option<Ray> {
        if self.viewport.x < 1.0 || self.viewport.y < 1.0 {
            return None;
        }
        let aspect = self.viewport.x / self.viewport.y;
        let tan_half = (self.fov_y * 0.5).tan();
        // Pixel -> NDC, Y flipped (screen Y grows downward).
        let ndc_x = (screen.x / self.viewport.x) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen.y / self.viewport.y) * 2.0;
        let local = Vec3::new(ndc_x * tan_half * aspect, ndc_y * tan_half, -1.0);
        Ray::new(self.position, self.rotation * local)
    }

    /// Projects a world position to screen pixels. `None` when the point
    /// is at or behind the camera plane.
    pub fn project(&self, world: Vec3) -> Option<Vec2> {
        let local = self.rotation.inverse() * (world - self.position);
        if local.z >= -EPSILON {
            return None;
        }
        let aspect = self.viewport.x / self.viewport.y;
        let tan_half = (self.fov_y * 0.5).tan();
        let ndc_x = local.x / (-local.z * tan_half * aspect);
        let ndc_y = local.y / (-local.z * tan_half);
        Some(Vec2::new(
            (ndc_x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - ndc_y) * 0.5 * self.viewport.y,
        ))
    }

}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            viewport: Vec2::new(750.0, 1334.0),
            fov_y: 60.0_f32.to_radians(),
        }
    }
}

/// Extracts the yaw (rotation about +Y) of a quaternion, in radians.
pub fn yaw_of(rotation: Quat) -> f32 {
    let forward = rotation * Vec3::NEG_Z;
    if forward.x.abs() < EPSILON && forward.z.abs() < EPSILON {
        return 0.0;
    }
    (-forward.x).atan2(-forward.z)
}

/// Quaternion rotating about +Y by `yaw` radians.
pub fn quat_from_yaw(yaw: f32) -> Quat {
    Quat::from_rotation_y(yaw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn test_ray_rejects_zero_direction() {
        assert!(Ray::new(Vec3::ZERO, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_ray_horizontal_plane_hit() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -1.0, -1.0)).unwrap();
        let hit = ray_horizontal_plane(&ray, 0.0).unwrap();
        assert_close(hit.y, 0.0);
        assert_close(hit.z, -1.0);
    }

    #[test]
    fn test_ray_parallel_to_plane_is_none() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Z).unwrap();
        assert!(ray_horizontal_plane(&ray, 0.0).is_none());
    }

    #[test]
    fn test_ray_behind_origin_is_none() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Y).unwrap();
        assert!(ray_horizontal_plane(&ray, 0.0).is_none());
    }

    #[test]
    fn test_ray_rect_inside_and_outside() {
        let ray = Ray::new(Vec3::new(0.3, 1.0, 0.0), Vec3::NEG_Y).unwrap();
        let extent = Vec2::new(1.0, 1.0);
        assert!(ray_rect(&ray, Vec3::ZERO, Quat::IDENTITY, extent).is_some());

        let ray = Ray::new(Vec3::new(0.8, 1.0, 0.0), Vec3::NEG_Y).unwrap();
        assert!(ray_rect(&ray, Vec3::ZERO, Quat::IDENTITY, extent).is_none());
    }

    #[test]
    fn test_ray_obb_hit() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z).unwrap();
        let t = ray_obb(&ray, Vec3::ZERO, Quat::IDENTITY, Vec3::splat(0.5)).unwrap();
        assert_close(t, 4.5);

        let miss = Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::NEG_Z).unwrap();
        assert!(ray_obb(&miss, Vec3::ZERO, Quat::IDENTITY, Vec3::splat(0.5)).is_none());
    }

    #[test]
    fn test_ray_obb_rotated() {
        // 45° yawed box still intersects a centered ray.
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z).unwrap();
        let rot = Quat::from_rotation_y(FRAC_PI_2 * 0.5);
        assert!(ray_obb(&ray, Vec3::ZERO, rot, Vec3::splat(0.5)).is_some());
    }

    #[test]
    fn test_wrap_angle() {
        assert_close(wrap_angle(PI + 0.1), -PI + 0.1);
        assert_close(wrap_angle(-PI - 0.1), PI - 0.1);
        assert_close(wrap_angle(0.25), 0.25);
    }

    #[test]
    fn test_screen_ray_center_points_forward() {
        let cam = Camera::default();
        let ray = cam.screen_ray(cam.viewport_center()).unwrap();
        assert!(ray.direction.distance(Vec3::NEG_Z) < 1e-4);
    }

    #[test]
    fn test_project_roundtrip() {
        let cam = Camera::default();
        let world = Vec3::new(0.2, -0.1, -2.0);
        let screen = cam.project(world).unwrap();
        let ray = cam.screen_ray(screen).unwrap();
        // The reprojected ray passes through the original point.
        assert!(ray.distance_to_point(world) < 1e-3);
    }

    #[test]
    fn test_project_behind_camera_is_none() {
        let cam = Camera::default();
        assert!(cam.project(Vec3::new(0.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_yaw_roundtrip() {
        for yaw in [-2.0_f32, -0.5, 0.0, 0.7, 2.9] {
            assert_close(wrap_angle(yaw_of(quat_from_yaw(yaw)) - yaw), 0.0);
        }
    }
}
