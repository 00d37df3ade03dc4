//! Portico Core Library
//!
//! Spatial-session logic for placing, tracking, persisting, and
//! manipulating virtual 3D objects, plus detection of the user crossing
//! the portal threshold. The host AR layer delivers plane/anchor/frame
//! events and touches, drives [`session::PorticoSession::tick`] from its
//! render loop, and drains anchor mutations back into its own anchor
//! store. Rendering, content sync, and audio live outside this crate.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod content;
pub mod entity;
pub mod gesture;
pub mod math;
pub mod plane;
pub mod planner;
pub mod portal;
pub mod reconciler;
pub mod resolver;
pub mod session;
pub mod worldmap;

pub use assets::{AssetError, AssetPipeline, AssetSource, PreparedAsset, StaticAssetSource};
pub use content::{AssetRef, ContentError, ContentManifest, ObjectDescriptor};
pub use entity::{
    AnchorId, CombinationState, DesiredAlignment, EntityName, EntityRegistry, FragmentRef,
    NodeHandle, Transform, VirtualEntity,
};
pub use gesture::{GestureEngine, GestureSession, Touch, TouchPhase};
pub use math::{Camera, Ray};
pub use plane::{PlaneAlignment, PlaneId, PlaneRecord, PlaneRegistry};
pub use planner::{LayoutArc, PlacementPlanner, PlaneRequirement};
pub use portal::{BoundarySide, PortalBoundaryController};
pub use reconciler::{AnchorReconciler, BootstrapMode, BOOTSTRAP_TIMEOUT};
pub use resolver::{ResolveRequest, Resolution, SpatialResolver};
pub use session::{
    AnchorLedger, AnchorOp, FrameSnapshot, PorticoSession, SessionContext, SessionEvent,
};
pub use worldmap::{MapError, SpatialMapSnapshot};
