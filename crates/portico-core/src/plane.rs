//! Detected-surface records and their registry.

use std::collections::BTreeMap;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::math::{self, Ray};

/// Identifier assigned by the host session to a detected plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaneId(pub Uuid);

impl PlaneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlaneId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneAlignment {
    Horizontal,
    Vertical,
}

/// One detected flat surface. Mutated in place on every update event from
/// the host session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneRecord {
    pub id: PlaneId,
    pub alignment: PlaneAlignment,
    /// Pose origin of the plane in world space.
    pub origin: Vec3,
    /// Offset of the extent's center from the origin, in plane-local space.
    pub center_offset: Vec3,
    pub orientation: Quat,
    /// Width x depth of the detected extent, in meters.
    pub extent: Vec2,
}

impl PlaneRecord {
    /// World-space center of the plane's extent.
    pub fn world_center(&self) -> Vec3 {
        self.origin + self.orientation * self.center_offset
    }

    /// Smaller side of the extent; the side a required diameter must fit.
    pub fn min_extent(&self) -> f32 {
        self.extent.x.min(self.extent.y)
    }

    /// Area of the detected extent.
    pub fn area(&self) -> f32 {
        self.extent.x * self.extent.y
    }

    /// Ray intersection against the finite extent.
    pub fn hit_test(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        math::ray_rect(ray, self.world_center(), self.orientation, self.extent)
    }
}

/// All currently-tracked planes plus a snapshot of the largest horizontal
/// plane ever observed, which survives removal of the plane itself (the
/// bootstrap fallback may still need it).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlaneRegistry {
    planes: BTreeMap<PlaneId, PlaneRecord>,
    largest_horizontal: Option<PlaneRecord>,
}

impl PlaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates a plane record.
    pub fn upsert(&mut self, plane: PlaneRecord) {
        if plane.alignment == PlaneAlignment::Horizontal {
            let beats = self
                .largest_horizontal
                .as_ref()
                .is_none_or(|best| plane.area() > best.area());
            if beats {
                self.largest_horizontal = Some(plane.clone());
            }
        }
        self.planes.insert(plane.id, plane);
    }

    pub fn remove(&mut self, id: PlaneId) -> Option<PlaneRecord> {
        self.planes.remove(&id)
    }

    pub fn get(&self, id: PlaneId) -> Option<&PlaneRecord> {
        self.planes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaneRecord> {
        self.planes.values()
    }

    /// Largest horizontal plane observed so far, even if since removed.
    pub fn largest_horizontal(&self) -> Option<&PlaneRecord> {
        self.largest_horizontal.as_ref()
    }

    /// Nearest extent hit across all tracked planes.
    pub fn hit_test(&self, ray: &Ray) -> Option<(&PlaneRecord, f32, Vec3)> {
        self.iter()
            .filter_map(|p| p.hit_test(ray).map(|(t, pos)| (p, t, pos)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal(extent: Vec2, y: f32) -> PlaneRecord {
        PlaneRecord {
            id: PlaneId::new(),
            alignment: PlaneAlignment::Horizontal,
            origin: Vec3::new(0.0, y, 0.0),
            center_offset: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            extent,
        }
    }

    #[test]
    fn test_upsert_and_update() {
        let mut reg = PlaneRegistry::new();
        let mut plane = horizontal(Vec2::new(1.0, 1.0), 0.0);
        let id = plane.id;
        reg.upsert(plane.clone());

        plane.extent = Vec2::new(2.0, 1.5);
        reg.upsert(plane);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(id).unwrap().extent, Vec2::new(2.0, 1.5));
    }

    #[test]
    fn test_largest_horizontal_survives_removal() {
        let mut reg = PlaneRegistry::new();
        let big = horizontal(Vec2::new(3.0, 2.0), 0.0);
        let big_id = big.id;
        reg.upsert(big);
        reg.upsert(horizontal(Vec2::new(1.0, 1.0), 0.0));

        reg.remove(big_id);
        assert_eq!(reg.len(), 1);
        let largest = reg.largest_horizontal().unwrap();
        assert_eq!(largest.extent, Vec2::new(3.0, 2.0));
    }

    #[test]
    fn test_largest_tracks_growth() {
        let mut reg = PlaneRegistry::new();
        let mut plane = horizontal(Vec2::new(1.0, 1.0), 0.0);
        reg.upsert(plane.clone());
        assert_eq!(reg.largest_horizontal().unwrap().extent, Vec2::new(1.0, 1.0));

        plane.extent = Vec2::new(2.0, 2.0);
        reg.upsert(plane);
        assert_eq!(reg.largest_horizontal().unwrap().extent, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn test_hit_test_nearest_plane() {
        let mut reg = PlaneRegistry::new();
        reg.upsert(horizontal(Vec2::new(2.0, 2.0), 0.0));
        reg.upsert(horizontal(Vec2::new(2.0, 2.0), -1.0));

        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y).unwrap();
        let (plane, _, pos) = reg.hit_test(&ray).unwrap();
        assert_eq!(plane.origin.y, 0.0);
        assert!((pos.y - 0.0).abs() < 1e-5);
    }
}
