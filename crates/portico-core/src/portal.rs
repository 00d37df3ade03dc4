//! Portal-crossing detection.
//!
//! Each frame the session hit-tests the viewport center against the gate
//! geometry and feeds the resulting distance here. The side only toggles
//! when the gate was ahead on the previous frame *and* is still within
//! range now — the user has moved past the gate, not merely glanced near
//! it, so a single-frame graze never flips the state.

/// Distance in meters at which the user counts as at the gate.
pub const GATE_PROXIMITY: f32 = 0.1;

/// Which side of the portal the user is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySide {
    Outside,
    Inside,
}

impl BoundarySide {
    fn flipped(self) -> Self {
        match self {
            Self::Outside => Self::Inside,
            Self::Inside => Self::Outside,
        }
    }
}

#[derive(Debug)]
pub struct PortalBoundaryController {
    side: BoundarySide,
    /// The gate geometry was hit-tested on the previous frame.
    gate_ahead: bool,
}

impl PortalBoundaryController {
    pub fn new() -> Self {
        Self {
            side: BoundarySide::Outside,
            gate_ahead: false,
        }
    }

    pub fn side(&self) -> BoundarySide {
        self.side
    }

    /// Consumes this frame's gate hit-test distance (`None` when the gate
    /// was not hit at all). Returns the new side when a crossing happened.
    pub fn update(&mut self, gate_distance: Option<f32>) -> Option<BoundarySide> {
        let close = gate_distance.is_some_and(|d| d <= GATE_PROXIMITY);
        if self.gate_ahead && close {
            self.side = self.side.flipped();
            // Require the proximity to re-establish before another flip.
            self.gate_ahead = false;
            tracing::info!("[portal] crossed, now {:?}", self.side);
            return Some(self.side);
        }
        self.gate_ahead = gate_distance.is_some();
        None
    }
}

impl Default for PortalBoundaryController {
    fn default() -> Self {
        Self::new()
    }
}
