//! Virtual entity arena with deterministic iteration order.
//!
//! Entities are owned by a single [`EntityRegistry`] keyed by name; every
//! cross-reference (fragment parents, the gesture engine's bound entity)
//! is a plain name resolved through the registry, so there are no weak
//! references or ownership cycles.

use std::collections::BTreeMap;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::math;

/// Stable identity of a virtual entity. Anchor names in the persisted map
/// use the same string.
pub type EntityName = String;

/// Handle of an anchor bound in the host spatial session.
pub type AnchorId = u64;

/// Opaque handle of the scene node rendering this entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

/// Surface alignment the entity wants for placement, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredAlignment {
    Horizontal,
    Vertical,
    Either,
    /// Prefers vertical but accepts horizontal when no vertical surface
    /// has been detected.
    EitherIfAvailable,
}

/// Puzzle-assembly status of a fragmented entity. `Moveable` variants are
/// still draggable by gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinationState {
    Complete,
    Incomplete,
    CompleteMoveable,
    IncompleteMoveable,
}

impl CombinationState {
    /// Whether gestures may still move this entity.
    pub fn is_moveable(self) -> bool {
        matches!(self, Self::CompleteMoveable | Self::IncompleteMoveable)
    }
}

/// Link from a puzzle piece to the entity it assembles into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRef {
    pub index: u32,
    /// Name of the reference entity, resolved through the registry.
    pub parent: EntityName,
}

/// Position, orientation, and scale of an entity in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Yaw about +Y in radians.
    pub fn yaw(&self) -> f32 {
        math::yaw_of(self.rotation)
    }

    /// Replaces the rotation with a pure yaw about +Y.
    pub fn set_yaw(&mut self, yaw: f32) {
        self.rotation = math::quat_from_yaw(yaw);
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// A placeable virtual object with identity, transform, and an optional
/// binding to a tracked real-world anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualEntity {
    pub name: EntityName,
    pub transform: Transform,
    pub node: NodeHandle,
    /// Present iff the entity is currently bound to a tracked pose.
    pub anchor: Option<AnchorId>,
    pub alignment: DesiredAlignment,
    pub fragment: Option<FragmentRef>,
    pub combination: CombinationState,
    /// Footprint on its supporting surface, width x depth in meters.
    pub footprint: Vec2,
    /// Bounding half-extents for hit-testing, in local space.
    pub half_extents: Vec3,
    /// Yaw offset compensating the asset's native forward axis.
    pub forward_correction: f32,
    /// Whether this entity is the distinguished portal object.
    pub is_portal: bool,
}

impl VirtualEntity {
    pub fn new(name: impl Into<EntityName>, node: NodeHandle, alignment: DesiredAlignment) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            node,
            anchor: None,
            alignment,
            fragment: None,
            combination: CombinationState::CompleteMoveable,
            footprint: Vec2::splat(0.3),
            half_extents: Vec3::splat(0.15),
            forward_correction: 0.0,
            is_portal: false,
        }
    }

    /// Width of the footprint, the dimension placement packs by.
    pub fn width(&self) -> f32 {
        self.footprint.x
    }

    /// Intersection parameter of a ray against this entity's oriented
    /// bounding box, scale applied.
    pub fn hit_test(&self, ray: &math::Ray) -> Option<f32> {
        math::ray_obb(
            ray,
            self.transform.position,
            self.transform.rotation,
            self.half_extents * self.transform.scale,
        )
    }
}

/// Arena of all entities in a session. `BTreeMap` keeps iteration order
/// deterministic, which placement and tests rely on.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityName, VirtualEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entity, replacing any previous one with the same name.
    pub fn insert(&mut self, entity: VirtualEntity) {
        self.entities.insert(entity.name.clone(), entity);
    }

    pub fn get(&self, name: &str) -> Option<&VirtualEntity> {
        self.entities.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VirtualEntity> {
        self.entities.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<VirtualEntity> {
        self.entities.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualEntity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VirtualEntity> {
        self.entities.values_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &EntityName> {
        self.entities.keys()
    }

    /// The distinguished portal entity, if the session has one.
    pub fn portal(&self) -> Option<&VirtualEntity> {
        self.iter().find(|e| e.is_portal)
    }

    /// Nearest entity whose bounding volume the ray enters.
    pub fn hit_test(&self, ray: &math::Ray) -> Option<(&VirtualEntity, f32)> {
        self.iter()
            .filter_map(|e| e.hit_test(ray).map(|t| (e, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Resolves a fragment's parent entity, if both ends still exist.
    pub fn fragment_parent(&self, name: &str) -> Option<&VirtualEntity> {
        let fragment = self.get(name)?.fragment.as_ref()?;
        self.get(&fragment.parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> VirtualEntity {
        VirtualEntity::new(name, NodeHandle(0), DesiredAlignment::Horizontal)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut reg = EntityRegistry::new();
        reg.insert(entity("vase"));
        reg.insert(entity("mask"));

        assert_eq!(reg.len(), 2);
        assert!(reg.get("vase").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn test_portal_lookup() {
        let mut reg = EntityRegistry::new();
        reg.insert(entity("vase"));
        let mut portal = entity("portal");
        portal.is_portal = true;
        reg.insert(portal);

        assert_eq!(reg.portal().unwrap().name, "portal");
    }

    #[test]
    fn test_hit_test_picks_nearest() {
        let mut reg = EntityRegistry::new();
        let mut near = entity("near");
        near.transform.position = Vec3::new(0.0, 0.0, -1.0);
        let mut far = entity("far");
        far.transform.position = Vec3::new(0.0, 0.0, -3.0);
        reg.insert(far);
        reg.insert(near);

        let ray = math::Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        let (hit, _) = reg.hit_test(&ray).unwrap();
        assert_eq!(hit.name, "near");
    }

    #[test]
    fn test_hit_test_miss_is_none() {
        let mut reg = EntityRegistry::new();
        let mut e = entity("vase");
        e.transform.position = Vec3::new(5.0, 0.0, -1.0);
        reg.insert(e);

        let ray = math::Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        assert!(reg.hit_test(&ray).is_none());
    }

    #[test]
    fn test_fragment_parent_resolution() {
        let mut reg = EntityRegistry::new();
        reg.insert(entity("statue"));
        let mut piece = entity("statue_piece_2");
        piece.fragment = Some(FragmentRef {
            index: 2,
            parent: "statue".to_string(),
        });
        piece.combination = CombinationState::IncompleteMoveable;
        reg.insert(piece);

        assert_eq!(reg.fragment_parent("statue_piece_2").unwrap().name, "statue");
        assert!(reg.fragment_parent("statue").is_none());
    }

    #[test]
    fn test_moveable_states() {
        assert!(CombinationState::CompleteMoveable.is_moveable());
        assert!(CombinationState::IncompleteMoveable.is_moveable());
        assert!(!CombinationState::Complete.is_moveable());
        assert!(!CombinationState::Incomplete.is_moveable());
    }
}
