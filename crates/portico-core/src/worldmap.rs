//! Persisted spatial-map snapshots.
//!
//! The relocalizable map itself is an opaque blob owned by the host
//! session; this crate only carries it around and answers one question
//! about it: "does this map already contain an anchor for entity X".

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted spatial map plus the companion anchor-name table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMapSnapshot {
    pub title: String,
    pub captured_at: DateTime<Utc>,
    /// Name of the portal entity captured in this map, if any.
    pub portal_name: Option<String>,
    /// Opaque relocalizable world-map blob from the host session.
    pub blob: Vec<u8>,
    /// Names of the entities whose anchors the blob contains. Used purely
    /// as a membership test during bootstrapping.
    pub anchor_names: BTreeSet<String>,
}

impl SpatialMapSnapshot {
    pub fn new(title: impl Into<String>, blob: Vec<u8>) -> Self {
        Self {
            title: title.into(),
            captured_at: Utc::now(),
            portal_name: None,
            blob,
            anchor_names: BTreeSet::new(),
        }
    }

    /// Membership test: does the persisted map already anchor this entity?
    pub fn contains(&self, entity_name: &str) -> bool {
        self.anchor_names.contains(entity_name)
    }

    /// Whether the map carries no anchors at all.
    pub fn is_blank(&self) -> bool {
        self.anchor_names.is_empty()
    }

    /// Compact binary encoding for persistence.
    pub fn encode(&self) -> Result<Vec<u8>, MapError> {
        postcard::to_allocvec(self).map_err(MapError::Encode)
    }

    /// Decodes a snapshot previously produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, MapError> {
        postcard::from_bytes(bytes).map_err(MapError::Decode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("failed to encode spatial map snapshot: {0}")]
    Encode(#[source] postcard::Error),

    #[error("failed to decode spatial map snapshot: {0}")]
    Decode(#[source] postcard::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut map = SpatialMapSnapshot::new("gallery", vec![1, 2, 3]);
        map.anchor_names.insert("vase".to_string());
        map.portal_name = Some("portal".to_string());

        assert!(map.contains("vase"));
        assert!(!map.contains("mask"));
        assert!(!map.is_blank());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut map = SpatialMapSnapshot::new("gallery", vec![0xde, 0xad, 0xbe, 0xef]);
        map.anchor_names.insert("vase".to_string());
        map.anchor_names.insert("mask".to_string());

        let bytes = map.encode().unwrap();
        let back = SpatialMapSnapshot::decode(&bytes).unwrap();
        assert_eq!(map, back);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(SpatialMapSnapshot::decode(&[0xff]).is_err());
    }
}
