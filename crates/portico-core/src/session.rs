//! Session context, anchor ledger, and the host-facing facade.
//!
//! There is no global state: everything a component needs lives in one
//! [`SessionContext`] built per AR session and passed in explicitly. The
//! host drives [`PorticoSession`] from its render loop: push events, push
//! touches, call [`PorticoSession::tick`] once per frame, then drain the
//! anchor ops back into its own anchor store.

use std::collections::BTreeMap;

use glam::Vec3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::assets::{AssetPipeline, AssetSource};
use crate::content::{AssetRef, ContentManifest, ObjectDescriptor};
use crate::entity::{
    AnchorId, CombinationState, EntityName, EntityRegistry, FragmentRef, Transform, VirtualEntity,
};
use crate::gesture::{GestureEngine, Touch, TouchPhase};
use crate::math::Camera;
use crate::plane::{PlaneId, PlaneRecord, PlaneRegistry};
use crate::planner::PlacementPlanner;
use crate::portal::{BoundarySide, PortalBoundaryController};
use crate::reconciler::{AnchorReconciler, BootstrapMode};
use crate::resolver::SpatialResolver;

/// One camera frame from the host session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub camera: Camera,
    /// High-confidence feature points in world space.
    pub feature_points: Vec<Vec3>,
}

impl Default for FrameSnapshot {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            feature_points: Vec::new(),
        }
    }
}

/// Events delivered by the host spatial session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PlaneAdded(PlaneRecord),
    PlaneUpdated(PlaneRecord),
    PlaneRemoved(PlaneId),
    /// An anchor surfaced from relocalizing a persisted map.
    AnchorResolved {
        name: String,
        anchor: AnchorId,
        transform: Transform,
    },
    Frame(FrameSnapshot),
}

/// Anchor mutations for the host to apply to its anchor store, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorOp {
    Add {
        anchor: AnchorId,
        entity: EntityName,
        transform: Transform,
    },
    Remove {
        anchor: AnchorId,
    },
}

/// Tracks which anchor is bound to which entity and emits the ordered op
/// list for the host. Rebinding always sequences the Remove of the old
/// anchor before the Add of the new one, so an entity is never visible to
/// the host with zero and two anchors at once.
#[derive(Debug, Default)]
pub struct AnchorLedger {
    bound: BTreeMap<AnchorId, EntityName>,
    next_id: AnchorId,
    ops: Vec<AnchorOp>,
}

impl AnchorLedger {
    pub fn new() -> Self {
        Self {
            bound: BTreeMap::new(),
            next_id: 1,
            ops: Vec::new(),
        }
    }

    /// Binds a fresh anchor at the entity's current transform, removing
    /// the old binding first if one exists.
    pub fn rebind(&mut self, entity: &mut VirtualEntity) -> AnchorId {
        if let Some(old) = entity.anchor.take() {
            self.bound.remove(&old);
            self.ops.push(AnchorOp::Remove { anchor: old });
        }
        let anchor = self.next_id;
        self.next_id += 1;
        self.bound.insert(anchor, entity.name.clone());
        self.ops.push(AnchorOp::Add {
            anchor,
            entity: entity.name.clone(),
            transform: entity.transform,
        });
        entity.anchor = Some(anchor);
        anchor
    }

    /// Adopts an anchor that the host resolved from a persisted map. The
    /// entity must be unbound; the reconciler enforces that.
    pub fn adopt(&mut self, entity: &mut VirtualEntity, anchor: AnchorId) {
        debug_assert!(entity.anchor.is_none());
        self.bound.insert(anchor, entity.name.clone());
        self.next_id = self.next_id.max(anchor + 1);
        entity.anchor = Some(anchor);
    }

    /// Discards an incoming anchor without binding it, instructing the
    /// host to remove it from the session.
    pub fn reject(&mut self, anchor: AnchorId) {
        self.ops.push(AnchorOp::Remove { anchor });
    }

    /// Releases an entity's binding, if any.
    pub fn release(&mut self, entity: &mut VirtualEntity) {
        if let Some(old) = entity.anchor.take() {
            self.bound.remove(&old);
            self.ops.push(AnchorOp::Remove { anchor: old });
        }
    }

    /// Entity currently bound to the given anchor.
    pub fn entity_for(&self, anchor: AnchorId) -> Option<&EntityName> {
        self.bound.get(&anchor)
    }

    /// Takes the ops accumulated since the last drain.
    pub fn drain_ops(&mut self) -> Vec<AnchorOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of currently bound anchors.
    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }
}

/// Everything mutable a session owns, constructed once and injected into
/// the components. The RNG is seeded so placement is reproducible.
#[derive(Debug)]
pub struct SessionContext {
    pub entities: EntityRegistry,
    pub planes: PlaneRegistry,
    pub anchors: AnchorLedger,
    pub frame: FrameSnapshot,
    pub rng: ChaCha8Rng,
}

impl SessionContext {
    pub fn new(seed: u64) -> Self {
        Self {
            entities: EntityRegistry::new(),
            planes: PlaneRegistry::new(),
            anchors: AnchorLedger::new(),
            frame: FrameSnapshot::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Widths of every non-portal entity, in registry order.
    pub fn object_widths(&self) -> Vec<f32> {
        self.entities
            .iter()
            .filter(|e| !e.is_portal)
            .map(VirtualEntity::width)
            .collect()
    }

    /// Width of the portal entity, if one exists.
    pub fn portal_width(&self) -> Option<f32> {
        self.entities.portal().map(VirtualEntity::width)
    }
}

/// Host-facing facade tying the components together. All methods run on
/// the host's single session thread; the only background work is asset
/// preparation, whose completions are drained inside [`Self::tick`].
pub struct PorticoSession {
    pub ctx: SessionContext,
    gesture: GestureEngine,
    resolver: SpatialResolver,
    planner: PlacementPlanner,
    reconciler: AnchorReconciler,
    portal: PortalBoundaryController,
    assets: AssetPipeline,
    portal_name: Option<String>,
    /// Descriptors whose assets are still being prepared.
    outstanding: BTreeMap<AssetRef, ObjectDescriptor>,
    /// Resolved anchors waiting for their entity's asset to finish.
    deferred_anchors: Vec<(String, AnchorId, Transform)>,
}

impl PorticoSession {
    /// Builds a session and queues every manifest asset for preparation.
    pub fn new(
        seed: u64,
        manifest: &ContentManifest,
        mode: BootstrapMode,
        source: impl AssetSource,
    ) -> Self {
        let assets = AssetPipeline::spawn(source);
        let mut outstanding = BTreeMap::new();
        for descriptor in manifest.iter() {
            assets.request(descriptor.asset.clone());
            outstanding.insert(descriptor.asset.clone(), descriptor.clone());
        }
        tracing::info!(
            "[session] starting with {} objects ({} mode)",
            manifest.len(),
            match mode {
                BootstrapMode::AdHoc => "ad-hoc",
                BootstrapMode::PersistedMap(_) => "persisted-map",
            }
        );
        Self {
            ctx: SessionContext::new(seed),
            gesture: GestureEngine::new(),
            resolver: SpatialResolver::new(),
            planner: PlacementPlanner::new(),
            reconciler: AnchorReconciler::new(mode),
            portal: PortalBoundaryController::new(),
            assets,
            portal_name: manifest.portal.as_ref().map(|d| d.name.clone()),
            outstanding,
            deferred_anchors: Vec::new(),
        }
    }

    /// Whether every manifest asset has finished preparation (successfully
    /// or not). Placement is deferred until then so the plane-size
    /// requirement sees the full object set.
    pub fn assets_ready(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.ctx.entities
    }

    /// Which side of the portal the user is on.
    pub fn boundary_side(&self) -> BoundarySide {
        self.portal.side()
    }

    /// Ingests one event from the host spatial session.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PlaneAdded(plane) | SessionEvent::PlaneUpdated(plane) => {
                self.ctx.planes.upsert(plane);
                if self.assets_ready() {
                    self.reconciler.evaluate(&mut self.ctx, &self.planner);
                }
            }
            SessionEvent::PlaneRemoved(id) => {
                self.ctx.planes.remove(id);
            }
            SessionEvent::AnchorResolved {
                name,
                anchor,
                transform,
            } => {
                if self.ctx.entities.get(&name).is_some() {
                    self.reconciler
                        .on_anchor_resolved(&mut self.ctx, &name, anchor, transform);
                } else if self.outstanding.values().any(|d| d.name == name) {
                    // Asset still preparing; replay once the entity exists.
                    self.deferred_anchors.push((name, anchor, transform));
                } else {
                    tracing::warn!("[session] anchor for unknown entity '{name}' discarded");
                    self.ctx.anchors.reject(anchor);
                }
            }
            SessionEvent::Frame(frame) => {
                self.ctx.frame = frame;
            }
        }
    }

    /// Forwards a touch delta plus the live touch set to the gesture
    /// engine.
    pub fn handle_touches(&mut self, phase: TouchPhase, touches: &[Touch]) {
        self.gesture
            .handle_touches(phase, touches, &mut self.ctx, &mut self.resolver);
    }

    /// Per-frame entry point, called from the host render loop. Returns
    /// the new boundary side when this frame crossed the portal.
    pub fn tick(&mut self, dt: f32) -> Option<BoundarySide> {
        self.drain_prepared_assets();
        if self.assets_ready() {
            self.reconciler
                .tick(&mut self.ctx, &self.planner, dt);
        }
        self.gesture.tick(&mut self.ctx, &mut self.resolver);

        let gate_distance = self.gate_distance();
        self.portal.update(gate_distance)
    }

    /// Anchor mutations accumulated since the last drain, for the host to
    /// apply to its anchor store in order.
    pub fn drain_anchor_ops(&mut self) -> Vec<AnchorOp> {
        self.ctx.anchors.drain_ops()
    }

    /// Hit-test at the viewport center against the portal's gate volume.
    /// An unplaced portal (no anchor yet) has no meaningful transform and
    /// never participates.
    fn gate_distance(&self) -> Option<f32> {
        let camera = &self.ctx.frame.camera;
        let ray = camera.screen_ray(camera.viewport_center())?;
        self.ctx
            .entities
            .portal()
            .filter(|p| p.anchor.is_some())
            .and_then(|p| p.hit_test(&ray))
    }

    fn drain_prepared_assets(&mut self) {
        for (asset, result) in self.assets.drain_ready() {
            let Some(descriptor) = self.outstanding.remove(&asset) else {
                continue;
            };
            match result {
                Ok(prepared) => {
                    self.instantiate(&descriptor, prepared.node, prepared.half_extents);
                }
                Err(err) => {
                    // Skip this object; the rest of the session proceeds.
                    tracing::warn!(
                        "[session] skipping '{}', asset failed: {err}",
                        descriptor.name
                    );
                }
            }
        }
        if self.assets_ready() && !self.deferred_anchors.is_empty() {
            for (name, anchor, transform) in std::mem::take(&mut self.deferred_anchors) {
                if self.ctx.entities.get(&name).is_some() {
                    self.reconciler
                        .on_anchor_resolved(&mut self.ctx, &name, anchor, transform);
                } else {
                    tracing::warn!("[session] anchor for unknown entity '{name}' discarded");
                    self.ctx.anchors.reject(anchor);
                }
            }
        }
    }

    /// Creates the entity (or entity pieces) for a prepared descriptor.
    fn instantiate(
        &mut self,
        descriptor: &ObjectDescriptor,
        node: crate::entity::NodeHandle,
        half_extents: Vec3,
    ) {
        let is_portal = self.portal_name.as_deref() == Some(descriptor.name.as_str());
        let mut base = VirtualEntity::new(descriptor.name.clone(), node, descriptor.alignment);
        base.footprint = descriptor.footprint;
        base.half_extents = half_extents;
        base.forward_correction = descriptor.forward_correction;
        base.is_portal = is_portal;

        if is_portal {
            base.combination = CombinationState::Complete;
            self.ctx.entities.insert(base);
        } else if descriptor.fragment_count >= 2 {
            // Piece 0 is the reference fragment the others point back to.
            base.combination = CombinationState::IncompleteMoveable;
            let parent = base.name.clone();
            self.ctx.entities.insert(base);
            for index in 1..descriptor.fragment_count {
                let mut piece = VirtualEntity::new(
                    format!("{parent}.{index}"),
                    node,
                    descriptor.alignment,
                );
                piece.footprint = descriptor.footprint;
                piece.half_extents = half_extents;
                piece.forward_correction = descriptor.forward_correction;
                piece.combination = CombinationState::IncompleteMoveable;
                piece.fragment = Some(FragmentRef {
                    index,
                    parent: parent.clone(),
                });
                self.ctx.entities.insert(piece);
            }
        } else {
            self.ctx.entities.insert(base);
        }
    }
}
