//! Anchor↔entity reconciliation and session bootstrapping.
//!
//! Ad-hoc sessions (no persisted map) wait for the first detected plane
//! that satisfies the placement requirement and lay everything out once;
//! a 10 s timeout falls back to the largest plane observed so far.
//! Persisted-map sessions match relocalized anchors to entities by name
//! and place only the entities the map does not already contain.

use crate::entity::{AnchorId, EntityName, Transform};
use crate::plane::{PlaneAlignment, PlaneRecord};
use crate::planner::{LayoutArc, PlacementPlanner};
use crate::session::SessionContext;
use crate::worldmap::SpatialMapSnapshot;

/// Seconds to wait for a qualifying plane before falling back to the
/// largest plane observed so far.
pub const BOOTSTRAP_TIMEOUT: f32 = 10.0;

/// How a session bootstraps its object placement.
#[derive(Debug, Clone)]
pub enum BootstrapMode {
    /// No persisted map: auto-layout everything on the first qualifying
    /// plane.
    AdHoc,
    /// Relocalize against a persisted map; only entities missing from the
    /// map need placement.
    PersistedMap(SpatialMapSnapshot),
}

/// What an evaluation pass decided to do. Computed with shared borrows,
/// then applied.
enum Plan {
    Nothing,
    AdHocLayout(PlaneRecord),
    FreshHalfCircle {
        plane: PlaneRecord,
        names: Vec<EntityName>,
    },
    Scatter {
        plane: PlaneRecord,
        names: Vec<EntityName>,
    },
}

#[derive(Debug)]
pub struct AnchorReconciler {
    mode: BootstrapMode,
    /// Ad-hoc placement has run. Guards against re-placement.
    objects_positioned: bool,
    /// Persisted-mode missing-entity placement has run.
    missing_positioned: bool,
    elapsed: f32,
    timeout_logged: bool,
}

impl AnchorReconciler {
    pub fn new(mode: BootstrapMode) -> Self {
        Self {
            mode,
            objects_positioned: false,
            missing_positioned: false,
            elapsed: 0.0,
            timeout_logged: false,
        }
    }

    /// Whether initial placement has completed.
    pub fn is_placed(&self) -> bool {
        match self.mode {
            BootstrapMode::AdHoc => self.objects_positioned,
            BootstrapMode::PersistedMap(_) => self.missing_positioned,
        }
    }

    /// Re-checks the plane registry against the placement requirement.
    /// Called on every plane add/update and once per tick; placement runs
    /// at most once per mode thanks to the positioned flags.
    pub fn evaluate(&mut self, ctx: &mut SessionContext, planner: &PlacementPlanner) {
        let plan = self.decide(ctx, planner);
        match plan {
            Plan::Nothing => {}
            Plan::AdHocLayout(plane) => {
                let placed = planner.layout(ctx, &plane, LayoutArc::ThreeQuarter);
                self.objects_positioned = true;
                tracing::info!(
                    "[reconciler] placed {placed} objects on qualifying plane {:?}",
                    plane.id
                );
            }
            Plan::FreshHalfCircle { plane, names } => {
                let placed = planner.layout_entities(ctx, &plane, LayoutArc::Half, &names, true);
                self.missing_positioned = true;
                tracing::info!("[reconciler] fresh persisted session, placed {placed} objects");
            }
            Plan::Scatter { plane, names } => {
                let placed = planner.scatter_near(ctx, &plane, &names);
                self.missing_positioned = true;
                tracing::info!("[reconciler] scattered {placed} objects added since map capture");
            }
        }
    }

    /// Advances the bootstrap timeout. The fallback re-checks the placed
    /// flag when it fires, so a legitimate placement that landed mid-timer
    /// wins and the fallback is a no-op.
    pub fn tick(&mut self, ctx: &mut SessionContext, planner: &PlacementPlanner, dt: f32) {
        self.evaluate(ctx, planner);

        if !matches!(self.mode, BootstrapMode::AdHoc) || self.objects_positioned {
            return;
        }
        self.elapsed += dt;
        if self.elapsed < BOOTSTRAP_TIMEOUT {
            return;
        }
        if let Some(plane) = ctx.planes.largest_horizontal().cloned() {
            let placed = planner.layout(ctx, &plane, LayoutArc::ThreeQuarter);
            self.objects_positioned = true;
            tracing::warn!(
                "[reconciler] no qualifying plane within {BOOTSTRAP_TIMEOUT}s, \
                 placed {placed} objects on largest plane seen"
            );
        } else if !self.timeout_logged {
            tracing::warn!("[reconciler] no plane found, session continues without placement");
            self.timeout_logged = true;
        }
    }

    /// Matches an anchor surfacing from relocalization to its entity by
    /// name. A second anchor claiming an already-bound entity is discarded
    /// and removed from the session; the existing binding is
    /// authoritative.
    pub fn on_anchor_resolved(
        &mut self,
        ctx: &mut SessionContext,
        name: &str,
        anchor: AnchorId,
        transform: Transform,
    ) {
        let Some(entity) = ctx.entities.get_mut(name) else {
            tracing::warn!("[reconciler] resolved anchor for unknown entity '{name}'");
            ctx.anchors.reject(anchor);
            return;
        };
        match entity.anchor {
            None => {
                entity.transform = transform;
                ctx.anchors.adopt(entity, anchor);
                tracing::info!("[reconciler] entity '{name}' bound to relocalized anchor");
            }
            Some(existing) if existing == anchor => {
                // Pose refinement of the anchor we already hold.
                entity.transform = transform;
            }
            Some(_) => {
                tracing::warn!(
                    "[reconciler] anchor name collision for '{name}', incoming anchor discarded"
                );
                ctx.anchors.reject(anchor);
            }
        }
    }

    fn decide(&self, ctx: &SessionContext, planner: &PlacementPlanner) -> Plan {
        if ctx.entities.is_empty() {
            return Plan::Nothing;
        }
        match &self.mode {
            BootstrapMode::AdHoc => {
                if self.objects_positioned {
                    return Plan::Nothing;
                }
                let requirement =
                    planner.requirement(&ctx.object_widths(), ctx.portal_width());
                let qualifying = ctx
                    .planes
                    .iter()
                    .filter(|p| planner.plane_satisfies(p, &requirement))
                    .max_by(|a, b| a.area().total_cmp(&b.area()));
                match qualifying {
                    Some(plane) => Plan::AdHocLayout(plane.clone()),
                    None => Plan::Nothing,
                }
            }
            BootstrapMode::PersistedMap(map) => {
                if self.missing_positioned {
                    return Plan::Nothing;
                }
                let Some(plane) = ctx
                    .planes
                    .iter()
                    .filter(|p| p.alignment == PlaneAlignment::Horizontal)
                    .max_by(|a, b| a.area().total_cmp(&b.area()))
                else {
                    return Plan::Nothing;
                };
                let missing: Vec<EntityName> = ctx
                    .entities
                    .iter()
                    .filter(|e| e.anchor.is_none() && !map.contains(&e.name))
                    .map(|e| e.name.clone())
                    .collect();
                if missing.is_empty() {
                    return Plan::Nothing;
                }
                if missing.len() == ctx.entities.len() {
                    // Nothing was ever anchored: treat as a fresh session.
                    let names = missing
                        .into_iter()
                        .filter(|n| ctx.entities.get(n).is_some_and(|e| !e.is_portal))
                        .collect();
                    Plan::FreshHalfCircle {
                        plane: plane.clone(),
                        names,
                    }
                } else {
                    // A few objects added after the map was captured.
                    Plan::Scatter {
                        plane: plane.clone(),
                        names: missing,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DesiredAlignment, NodeHandle, VirtualEntity};
    use crate::plane::PlaneId;
    use crate::session::AnchorOp;
    use glam::{Quat, Vec2, Vec3};

    fn floor(extent: Vec2) -> PlaneRecord {
        PlaneRecord {
            id: PlaneId::new(),
            alignment: PlaneAlignment::Horizontal,
            origin: Vec3::ZERO,
            center_offset: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            extent,
        }
    }

    fn setup_context() -> SessionContext {
        let mut ctx = SessionContext::new(9);
        ctx.frame.camera.position = Vec3::new(0.0, 1.4, 2.0);
        for i in 0..4 {
            let mut e = VirtualEntity::new(
                format!("object_{i}"),
                NodeHandle(i),
                DesiredAlignment::Horizontal,
            );
            e.footprint = Vec2::new(0.3, 0.3);
            ctx.entities.insert(e);
        }
        let mut portal = VirtualEntity::new("portal", NodeHandle(99), DesiredAlignment::Horizontal);
        portal.footprint = Vec2::new(0.5, 0.1);
        portal.is_portal = true;
        ctx.entities.insert(portal);
        ctx
    }

    #[test]
    fn test_ad_hoc_places_exactly_once() {
        let mut ctx = setup_context();
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::AdHoc);

        ctx.planes.upsert(floor(Vec2::new(3.0, 3.0)));
        reconciler.evaluate(&mut ctx, &planner);
        assert!(reconciler.is_placed());
        assert_eq!(ctx.anchors.bound_count(), 5);

        // Move an object, then deliver more plane events: no re-layout.
        ctx.entities.get_mut("object_0").unwrap().transform.position = Vec3::splat(9.0);
        ctx.planes.upsert(floor(Vec2::new(5.0, 5.0)));
        reconciler.evaluate(&mut ctx, &planner);
        assert_eq!(
            ctx.entities.get("object_0").unwrap().transform.position,
            Vec3::splat(9.0)
        );
    }

    #[test]
    fn test_small_plane_does_not_trigger() {
        let mut ctx = setup_context();
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::AdHoc);

        ctx.planes.upsert(floor(Vec2::new(0.5, 0.5)));
        reconciler.evaluate(&mut ctx, &planner);
        assert!(!reconciler.is_placed());
        assert_eq!(ctx.anchors.bound_count(), 0);
    }

    #[test]
    fn test_timeout_falls_back_to_largest_plane() {
        let mut ctx = setup_context();
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::AdHoc);

        // Too small to qualify, but the largest seen so far.
        ctx.planes.upsert(floor(Vec2::new(1.0, 1.0)));
        for _ in 0..601 {
            reconciler.tick(&mut ctx, &planner, 1.0 / 60.0);
        }
        assert!(reconciler.is_placed());
        assert!(ctx.entities.iter().all(|e| e.anchor.is_some()));
    }

    #[test]
    fn test_timeout_without_any_plane_is_nonfatal() {
        let mut ctx = setup_context();
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::AdHoc);

        for _ in 0..700 {
            reconciler.tick(&mut ctx, &planner, 1.0 / 60.0);
        }
        assert!(!reconciler.is_placed());
        assert_eq!(ctx.anchors.bound_count(), 0);
    }

    #[test]
    fn test_fallback_is_noop_after_legitimate_placement() {
        let mut ctx = setup_context();
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::AdHoc);

        // Let most of the timeout elapse, then a qualifying plane appears.
        for _ in 0..540 {
            reconciler.tick(&mut ctx, &planner, 1.0 / 60.0);
        }
        ctx.planes.upsert(floor(Vec2::new(3.0, 3.0)));
        reconciler.evaluate(&mut ctx, &planner);
        let placed_at = ctx.entities.get("object_0").unwrap().transform.position;

        // Timer keeps running past 10 s; the fallback must not move
        // anything.
        for _ in 0..120 {
            reconciler.tick(&mut ctx, &planner, 1.0 / 60.0);
        }
        assert_eq!(
            ctx.entities.get("object_0").unwrap().transform.position,
            placed_at
        );
    }

    #[test]
    fn test_anchor_collision_rejected() {
        let mut ctx = setup_context();
        let mut map = SpatialMapSnapshot::new("gallery", vec![]);
        map.anchor_names.insert("object_0".to_string());
        let mut reconciler = AnchorReconciler::new(BootstrapMode::PersistedMap(map));

        let pose_a = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        let pose_b = Transform::from_position(Vec3::new(5.0, 0.0, 0.0));
        reconciler.on_anchor_resolved(&mut ctx, "object_0", 10, pose_a);
        ctx.anchors.drain_ops();

        reconciler.on_anchor_resolved(&mut ctx, "object_0", 11, pose_b);
        // The existing binding is authoritative.
        let entity = ctx.entities.get("object_0").unwrap();
        assert_eq!(entity.anchor, Some(10));
        assert_eq!(entity.transform.position, pose_a.position);
        assert_eq!(
            ctx.anchors.drain_ops(),
            vec![AnchorOp::Remove { anchor: 11 }]
        );
    }

    #[test]
    fn test_fresh_persisted_session_half_circle() {
        let mut ctx = setup_context();
        // Map contains nothing the session knows about.
        let map = SpatialMapSnapshot::new("gallery", vec![]);
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::PersistedMap(map));

        ctx.planes.upsert(floor(Vec2::new(3.0, 3.0)));
        reconciler.evaluate(&mut ctx, &planner);

        assert!(reconciler.is_placed());
        assert!(ctx.entities.iter().all(|e| e.anchor.is_some()));
    }

    #[test]
    fn test_incremental_entities_scattered_not_relayed_out() {
        let mut ctx = setup_context();
        let mut map = SpatialMapSnapshot::new("gallery", vec![]);
        for name in ["object_0", "object_1", "object_2", "portal"] {
            map.anchor_names.insert(name.to_string());
        }
        let planner = PlacementPlanner::new();
        let mut reconciler = AnchorReconciler::new(BootstrapMode::PersistedMap(map));

        // Relocalization restores the mapped entities first.
        for (i, name) in ["object_0", "object_1", "object_2", "portal"]
            .iter()
            .enumerate()
        {
            let pose = Transform::from_position(Vec3::new(i as f32, 0.0, 0.0));
            reconciler.on_anchor_resolved(&mut ctx, name, 100 + i as u64, pose);
        }

        ctx.planes.upsert(floor(Vec2::new(3.0, 3.0)));
        reconciler.evaluate(&mut ctx, &planner);

        // Restored entities keep their relocalized poses.
        assert_eq!(
            ctx.entities.get("object_1").unwrap().transform.position,
            Vec3::new(1.0, 0.0, 0.0)
        );
        // Only the unmapped object was placed, near the plane center.
        let added = ctx.entities.get("object_3").unwrap();
        assert!(added.anchor.is_some());
        assert!(added.transform.position.length() < 1.0);
    }
}
