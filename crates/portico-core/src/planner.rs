//! Deterministic auto-layout onto a detected plane.
//!
//! The portal is centered on the plane and turned toward the camera; the
//! remaining objects share a circular arc around it. Layout pulls its
//! randomness from the session RNG, so a seeded session always produces
//! the same arrangement.

use glam::Vec3;
use rand::prelude::*;

use crate::entity::EntityName;
use crate::plane::{PlaneAlignment, PlaneRecord};
use crate::session::SessionContext;

/// Clearance added around the portal's width, meters.
pub const PORTAL_CLEARANCE: f32 = 0.8;
/// Clearance packed between neighboring objects on the arc, meters.
pub const OBJECT_CLEARANCE: f32 = 0.8;
/// Angular jitter applied when a single object would otherwise sit dead
/// center in front of the camera, radians.
const SINGLE_OBJECT_JITTER: f32 = 0.35;

/// Arc the non-portal objects are distributed along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutArc {
    /// 270°, the standard layout.
    ThreeQuarter,
    /// 180°, used when reconciliation lays out a fresh persisted session.
    Half,
}

impl LayoutArc {
    pub fn radians(self) -> f32 {
        match self {
            Self::ThreeQuarter => 270.0_f32.to_radians(),
            Self::Half => 180.0_f32.to_radians(),
        }
    }
}

/// Minimum plane size a layout needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneRequirement {
    pub min_diameter: f32,
}

#[derive(Debug, Default, Clone)]
pub struct PlacementPlanner;

impl PlacementPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Closed-form minimum plane diameter. A lone object with no portal
    /// only needs its own footprint; otherwise the diameter is the larger
    /// of the portal's cleared width and the arc-packing circumference
    /// converted to a diameter.
    pub fn requirement(&self, object_widths: &[f32], portal_width: Option<f32>) -> PlaneRequirement {
        if portal_width.is_none() && object_widths.len() == 1 {
            return PlaneRequirement {
                min_diameter: object_widths[0],
            };
        }
        let packing: f32 = object_widths.iter().sum::<f32>()
            + object_widths.len().saturating_sub(1) as f32 * OBJECT_CLEARANCE;
        let packed_diameter = packing / std::f32::consts::PI * 2.0;
        let portal_diameter = portal_width.map_or(0.0, |w| w + PORTAL_CLEARANCE);
        PlaneRequirement {
            min_diameter: portal_diameter.max(packed_diameter),
        }
    }

    /// Whether a detected plane can host the layout.
    pub fn plane_satisfies(&self, plane: &PlaneRecord, requirement: &PlaneRequirement) -> bool {
        plane.alignment == PlaneAlignment::Horizontal
            && plane.min_extent() >= requirement.min_diameter
    }

    /// Lays out every entity (portal included) onto the plane and rebinds
    /// their anchors. Returns the number of entities placed.
    pub fn layout(&self, ctx: &mut SessionContext, plane: &PlaneRecord, arc: LayoutArc) -> usize {
        let names: Vec<EntityName> = ctx
            .entities
            .iter()
            .filter(|e| !e.is_portal)
            .map(|e| e.name.clone())
            .collect();
        self.layout_entities(ctx, plane, arc, &names, true)
    }

    /// Lays out a subset of entities. When `include_portal` is set, the
    /// portal is centered on the plane facing the camera.
    pub fn layout_entities(
        &self,
        ctx: &mut SessionContext,
        plane: &PlaneRecord,
        arc: LayoutArc,
        names: &[EntityName],
        include_portal: bool,
    ) -> usize {
        let center = plane.world_center();
        let camera = ctx.frame.camera.position;
        let mut placed = 0;

        if include_portal {
            placed += self.place_portal(ctx, center, camera);
        }

        if names.is_empty() {
            return placed;
        }

        let widths: Vec<f32> = names
            .iter()
            .filter_map(|n| ctx.entities.get(n))
            .map(|e| e.width())
            .collect();
        let portal_width = if include_portal {
            ctx.portal_width()
        } else {
            None
        };
        let radius = self.requirement(&widths, portal_width).min_diameter * 0.5;

        // Polar angle of the camera as seen from the plane center; the
        // arc is centered on it so objects face the user.
        let to_camera = camera - center;
        let camera_angle = to_camera.x.atan2(to_camera.z);

        let count = names.len();
        let slot = arc.radians() / count as f32;
        for (i, name) in names.iter().enumerate() {
            let angle = if count == 1 {
                camera_angle + ctx.rng.random_range(-SINGLE_OBJECT_JITTER..SINGLE_OBJECT_JITTER)
            } else {
                camera_angle - arc.radians() * 0.5 + slot * i as f32 + slot * 0.5
            };
            let offset = Vec3::new(angle.sin(), 0.0, angle.cos()) * radius;
            let Some(entity) = ctx.entities.get_mut(name) else {
                continue;
            };
            entity.transform.position = center + offset;
            // Face the arc center, corrected for the asset's forward axis.
            entity.transform.set_yaw(angle + entity.forward_correction);
            ctx.anchors.rebind(entity);
            placed += 1;
        }
        placed
    }

    /// Drops entities near the plane with a small random offset, used for
    /// the incremental "a few objects added since the map was captured"
    /// path. No full re-layout.
    pub fn scatter_near(
        &self,
        ctx: &mut SessionContext,
        plane: &PlaneRecord,
        names: &[EntityName],
    ) -> usize {
        let center = plane.world_center();
        let spread = (plane.min_extent() * 0.3).max(0.1);
        let mut placed = 0;
        for name in names {
            let dx = ctx.rng.random_range(-spread..spread);
            let dz = ctx.rng.random_range(-spread..spread);
            let Some(entity) = ctx.entities.get_mut(name) else {
                continue;
            };
            entity.transform.position = center + Vec3::new(dx, 0.0, dz);
            ctx.anchors.rebind(entity);
            placed += 1;
        }
        placed
    }

    fn place_portal(&self, ctx: &mut SessionContext, center: Vec3, camera: Vec3) -> usize {
        let Some(name) = ctx.entities.portal().map(|p| p.name.clone()) else {
            return 0;
        };
        let Some(portal) = ctx.entities.get_mut(&name) else {
            return 0;
        };
        portal.transform.position = center;
        let toward = camera - center;
        // Yaw that points the portal's forward axis at the camera.
        let yaw = (-toward.x).atan2(-toward.z);
        portal.transform.set_yaw(yaw + portal.forward_correction);
        ctx.anchors.rebind(portal);
        1
    }
}
