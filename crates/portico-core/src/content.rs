//! Domain-layer object descriptors handed to a session at startup.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::entity::DesiredAlignment;

/// Reference to a renderable 3D asset owned by the content layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef(pub String);

/// One placeable object as described by the content layer. The session
/// turns each descriptor into a [`crate::entity::VirtualEntity`] once its
/// asset has been prepared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub name: String,
    pub asset: AssetRef,
    pub alignment: DesiredAlignment,
    /// Number of puzzle pieces this object splits into; 0 for a plain
    /// object with no fragments.
    pub fragment_count: u32,
    /// Footprint on the supporting surface, width x depth in meters.
    pub footprint: Vec2,
    pub half_extents: Vec3,
    /// Yaw offset compensating the asset's native forward axis, radians.
    pub forward_correction: f32,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asset: AssetRef(asset.into()),
            alignment: DesiredAlignment::Horizontal,
            fragment_count: 0,
            footprint: Vec2::splat(0.3),
            half_extents: Vec3::splat(0.15),
            forward_correction: 0.0,
        }
    }
}

/// Ordered object list for one session, plus the distinguished portal
/// pseudo-object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentManifest {
    pub objects: Vec<ObjectDescriptor>,
    pub portal: Option<ObjectDescriptor>,
}

impl ContentManifest {
    pub fn new(objects: Vec<ObjectDescriptor>, portal: Option<ObjectDescriptor>) -> Self {
        Self { objects, portal }
    }

    /// Total number of descriptors, portal included.
    pub fn len(&self) -> usize {
        self.objects.len() + usize::from(self.portal.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All descriptors in placement order, portal first when present.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectDescriptor> {
        self.portal.iter().chain(self.objects.iter())
    }

    /// Parses a manifest from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        serde_json::from_str(json).map_err(ContentError::Parse)
    }

    /// Serializes the manifest to JSON.
    pub fn to_json(&self) -> Result<String, ContentError> {
        serde_json::to_string_pretty(self).map_err(ContentError::Serialize)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to parse content manifest: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize content manifest: {0}")]
    Serialize(#[source] serde_json::Error),
}
