//! Touch-gesture disambiguation and entity manipulation.
//!
//! One gesture session is live at a time, tagged by variant: one finger
//! drags, two fingers drag and rotate. Touch-count transitions (1↔2, or
//! down to 0) end the old session and start a new one from the current
//! touch set, so no state leaks across the boundary. Independent of touch
//! events, [`GestureEngine::tick`] re-evaluates the active session every
//! frame so camera movement alone keeps a held object visually attached.

use glam::Vec2;

use crate::entity::EntityName;
use crate::math;
use crate::resolver::{ResolveRequest, SpatialResolver};
use crate::session::SessionContext;

/// Screen displacement before a one-finger drag engages, pixels.
pub const SINGLE_TRANSLATION_THRESHOLD: f32 = 30.0;
/// Screen displacement before a two-finger drag engages, pixels.
pub const TWO_TRANSLATION_THRESHOLD: f32 = 40.0;
/// Raised drag threshold once rotation has already engaged, pixels.
pub const TWO_TRANSLATION_THRESHOLD_AFTER_ROTATION: f32 = 70.0;
/// Finger-pair angle change before rotation engages, radians.
pub const ROTATION_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;
/// Raised rotation threshold once translation has already engaged.
pub const ROTATION_THRESHOLD_AFTER_TRANSLATION: f32 = 18.0 * std::f32::consts::PI / 180.0;

/// One live touch, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub id: u64,
    pub position: Vec2,
}

/// What just happened to the touch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Began,
    Moved,
    Ended,
    Cancelled,
}

/// State of a one-finger session.
#[derive(Debug, Clone)]
pub struct SingleFingerGesture {
    touch_id: u64,
    start_point: Vec2,
    current_point: Vec2,
    entity: Option<EntityName>,
    translation_passed: bool,
    drag_offset: Vec2,
    moved_entity: bool,
}

/// State of a two-finger session.
#[derive(Debug, Clone)]
pub struct TwoFingerGesture {
    touch_ids: [u64; 2],
    points: [Vec2; 2],
    entity: Option<EntityName>,
    /// Both translation and rotation stay disabled unless the selection
    /// vote at gesture start found an entity.
    manipulation_enabled: bool,
    start_midpoint: Vec2,
    initial_angle: f32,
    translation_passed: bool,
    rotation_passed: bool,
    drag_offset: Vec2,
    /// Entity yaw and finger angle captured at the rotation threshold
    /// crossing, so engagement introduces no visible jump.
    yaw_baseline: f32,
    angle_baseline: f32,
    moved_entity: bool,
}

/// The active gesture, tagged by variant.
#[derive(Debug, Clone)]
pub enum GestureSession {
    SingleFinger(SingleFingerGesture),
    TwoFinger(TwoFingerGesture),
}

impl GestureSession {
    /// Entity bound to this gesture, if the initial hit-test found one.
    pub fn entity(&self) -> Option<&EntityName> {
        match self {
            Self::SingleFinger(g) => g.entity.as_ref(),
            Self::TwoFinger(g) => g.entity.as_ref(),
        }
    }

    /// Whether the drag threshold has been crossed.
    pub fn translation_passed(&self) -> bool {
        match self {
            Self::SingleFinger(g) => g.translation_passed,
            Self::TwoFinger(g) => g.translation_passed,
        }
    }

    /// Whether the rotation threshold has been crossed (two-finger only).
    pub fn rotation_passed(&self) -> bool {
        match self {
            Self::SingleFinger(_) => false,
            Self::TwoFinger(g) => g.rotation_passed,
        }
    }
}

impl SingleFingerGesture {
    fn begin(touch: &Touch, ctx: &SessionContext) -> Self {
        let entity = ctx
            .frame
            .camera
            .screen_ray(touch.position)
            .and_then(|ray| ctx.entities.hit_test(&ray))
            .filter(|(e, _)| e.combination.is_moveable())
            .map(|(e, _)| e.name.clone());
        tracing::debug!(
            "[gesture] single-finger begin, hit: {}",
            entity.as_deref().unwrap_or("nothing")
        );
        Self {
            touch_id: touch.id,
            start_point: touch.position,
            current_point: touch.position,
            entity,
            translation_passed: false,
            drag_offset: Vec2::ZERO,
            moved_entity: false,
        }
    }

    fn update(&mut self, ctx: &mut SessionContext, resolver: &mut SpatialResolver) {
        let Some(name) = self.entity.clone() else {
            return;
        };
        if !self.translation_passed {
            let displacement = (self.current_point - self.start_point).length();
            if displacement < SINGLE_TRANSLATION_THRESHOLD {
                return;
            }
            self.translation_passed = true;
            // Lock the offset between finger and object so the first
            // translated frame lands exactly where the object already is.
            if let Some(entity) = ctx.entities.get(&name) {
                if let Some(projected) = ctx.frame.camera.project(entity.transform.position) {
                    self.drag_offset = self.current_point - projected;
                }
            }
        }
        drag_entity(
            ctx,
            resolver,
            &name,
            self.current_point - self.drag_offset,
            &mut self.moved_entity,
        );
    }
}

impl TwoFingerGesture {
    fn begin(first: &Touch, second: &Touch, ctx: &SessionContext) -> Self {
        let (a, b) = if first.id <= second.id {
            (first, second)
        } else {
            (second, first)
        };
        let entity = select_entity(a.position, b.position, ctx);
        tracing::debug!(
            "[gesture] two-finger begin, selected: {}",
            entity.as_deref().unwrap_or("nothing")
        );
        let pair = b.position - a.position;
        Self {
            touch_ids: [a.id, b.id],
            points: [a.position, b.position],
            manipulation_enabled: entity.is_some(),
            entity,
            start_midpoint: (a.position + b.position) * 0.5,
            initial_angle: pair.y.atan2(pair.x),
            translation_passed: false,
            rotation_passed: false,
            drag_offset: Vec2::ZERO,
            yaw_baseline: 0.0,
            angle_baseline: 0.0,
            moved_entity: false,
        }
    }

    fn matches(&self, touches: &[Touch]) -> bool {
        touches.len() == 2
            && touches.iter().all(|t| self.touch_ids.contains(&t.id))
            && touches[0].id != touches[1].id
    }

    fn track(&mut self, touches: &[Touch]) {
        for touch in touches {
            if touch.id == self.touch_ids[0] {
                self.points[0] = touch.position;
            } else if touch.id == self.touch_ids[1] {
                self.points[1] = touch.position;
            }
        }
    }

    fn update(&mut self, ctx: &mut SessionContext, resolver: &mut SpatialResolver) {
        if !self.manipulation_enabled {
            return;
        }
        let Some(name) = self.entity.clone() else {
            return;
        };
        let pair = self.points[1] - self.points[0];
        let midpoint = (self.points[0] + self.points[1]) * 0.5;

        // Rotation, with hysteresis against an engaged translation.
        let current_angle = pair.y.atan2(pair.x);
        let rotation_threshold = if self.translation_passed {
            ROTATION_THRESHOLD_AFTER_TRANSLATION
        } else {
            ROTATION_THRESHOLD
        };
        if !self.rotation_passed {
            let delta = math::wrap_angle(current_angle - self.initial_angle);
            if delta.abs() >= rotation_threshold {
                self.rotation_passed = true;
                // Re-baseline at the crossing: no angular jump.
                self.angle_baseline = current_angle;
                self.yaw_baseline = ctx
                    .entities
                    .get(&name)
                    .map_or(0.0, |e| e.transform.yaw());
            }
        }
        if self.rotation_passed {
            let turn = math::wrap_angle(current_angle - self.angle_baseline);
            if let Some(entity) = ctx.entities.get_mut(&name) {
                entity.transform.set_yaw(self.yaw_baseline - turn);
            }
        }

        // Translation, with hysteresis against an engaged rotation.
        let translation_threshold = if self.rotation_passed {
            TWO_TRANSLATION_THRESHOLD_AFTER_ROTATION
        } else {
            TWO_TRANSLATION_THRESHOLD
        };
        if !self.translation_passed {
            if (midpoint - self.start_midpoint).length() < translation_threshold {
                return;
            }
            self.translation_passed = true;
            if let Some(entity) = ctx.entities.get(&name) {
                if let Some(projected) = ctx.frame.camera.project(entity.transform.position) {
                    self.drag_offset = midpoint - projected;
                }
            }
        }
        drag_entity(
            ctx,
            resolver,
            &name,
            midpoint - self.drag_offset,
            &mut self.moved_entity,
        );
    }
}

/// Translates `name` toward the screen target through the resolver, with
/// the infinite-plane fallback enabled so the drag never loses the object.
fn drag_entity(
    ctx: &mut SessionContext,
    resolver: &mut SpatialResolver,
    name: &str,
    screen_target: Vec2,
    moved: &mut bool,
) {
    let reference = ctx.entities.get(name).map(|e| e.transform.position);
    let request = ResolveRequest {
        screen_point: screen_target,
        reference_position: reference,
        allow_infinite_plane: true,
        smooth: true,
    };
    if let Some(resolution) = resolver.resolve(&ctx.planes, &ctx.frame, &request) {
        if let Some(entity) = ctx.entities.get_mut(name) {
            entity.transform.position = resolution.position;
            *moved = true;
        }
    }
}

/// Two-finger entity selection: hit-test both fingers plus derived
/// midpoints and corners, and pick the entity that collects the most
/// hits. Guards against manipulating empty space on an ambiguous grab.
fn select_entity(a: Vec2, b: Vec2, ctx: &SessionContext) -> Option<EntityName> {
    let midpoint = (a + b) * 0.5;
    let samples = [
        a,
        b,
        midpoint,
        (a + midpoint) * 0.5,
        (b + midpoint) * 0.5,
        Vec2::new(a.x, b.y),
        Vec2::new(b.x, a.y),
    ];
    let mut votes: std::collections::BTreeMap<EntityName, usize> = std::collections::BTreeMap::new();
    for sample in samples {
        let hit = ctx
            .frame
            .camera
            .screen_ray(sample)
            .and_then(|ray| ctx.entities.hit_test(&ray))
            .filter(|(e, _)| e.combination.is_moveable());
        if let Some((entity, _)) = hit {
            *votes.entry(entity.name.clone()).or_insert(0) += 1;
        }
    }
    votes
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1))
        .map(|(name, _)| name)
}

/// Owns the active gesture session and applies touch deltas to it.
#[derive(Debug, Default)]
pub struct GestureEngine {
    active: Option<GestureSession>,
}

impl GestureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&GestureSession> {
        self.active.as_ref()
    }

    /// Applies one touch delta given the current live touch collection,
    /// returning the (possibly new) active session.
    pub fn handle_touches(
        &mut self,
        phase: TouchPhase,
        touches: &[Touch],
        ctx: &mut SessionContext,
        resolver: &mut SpatialResolver,
    ) -> Option<&GestureSession> {
        match touches.len() {
            1 => {
                let touch = touches[0];
                let same = matches!(
                    &self.active,
                    Some(GestureSession::SingleFinger(g)) if g.touch_id == touch.id
                );
                if same {
                    if let Some(GestureSession::SingleFinger(g)) = &mut self.active {
                        g.current_point = touch.position;
                        g.update(ctx, resolver);
                    }
                } else {
                    self.finish(ctx, resolver);
                    self.active = Some(GestureSession::SingleFinger(SingleFingerGesture::begin(
                        &touch, ctx,
                    )));
                }
            }
            2 => {
                let same = matches!(
                    &self.active,
                    Some(GestureSession::TwoFinger(g)) if g.matches(touches)
                );
                if same {
                    if let Some(GestureSession::TwoFinger(g)) = &mut self.active {
                        g.track(touches);
                        g.update(ctx, resolver);
                    }
                } else {
                    self.finish(ctx, resolver);
                    self.active = Some(GestureSession::TwoFinger(TwoFingerGesture::begin(
                        &touches[0],
                        &touches[1],
                        ctx,
                    )));
                }
            }
            _ => {
                // 0 or 3+ touches: no active gesture.
                if self.active.is_some() {
                    tracing::debug!("[gesture] {phase:?} ended session");
                }
                self.finish(ctx, resolver);
            }
        }
        self.active.as_ref()
    }

    /// Fixed-rate refresh driven by the render loop: re-evaluates the
    /// active session against the current camera so a held object stays
    /// under the fingers while the device moves.
    pub fn tick(&mut self, ctx: &mut SessionContext, resolver: &mut SpatialResolver) {
        match &mut self.active {
            Some(GestureSession::SingleFinger(g)) => g.update(ctx, resolver),
            Some(GestureSession::TwoFinger(g)) => g.update(ctx, resolver),
            None => {}
        }
    }

    /// Ends the active session: the manipulated entity is re-anchored at
    /// its final pose and the binding is cleared.
    fn finish(&mut self, ctx: &mut SessionContext, resolver: &mut SpatialResolver) {
        let Some(session) = self.active.take() else {
            return;
        };
        let rebind = match &session {
            // A drag moved the object off its anchor pose.
            GestureSession::SingleFinger(g) => g.moved_entity,
            GestureSession::TwoFinger(g) => g.moved_entity || g.rotation_passed,
        };
        if rebind {
            if let Some(name) = session.entity() {
                if let Some(entity) = ctx.entities.get_mut(name) {
                    ctx.anchors.rebind(entity);
                }
            }
        }
        resolver.reset_smoothing();
    }
}
