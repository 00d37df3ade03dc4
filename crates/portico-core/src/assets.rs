//! Background asset preparation.
//!
//! Newly discovered entities need their 3D assets warmed up before a node
//! can be inserted into the scene. Preparation runs on one dedicated
//! worker thread (a serial queue) so it never blocks frame delivery;
//! completions are drained synchronously on the main tick and inserted
//! there.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use glam::Vec3;
use parking_lot::Mutex;

use crate::content::AssetRef;
use crate::entity::NodeHandle;

/// A scene node readied by the asset source, plus the measurements the
/// session needs for hit-testing.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAsset {
    pub node: NodeHandle,
    pub half_extents: Vec3,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("asset could not be prepared: {0}")]
    Unreadable(String),
}

/// Host-provided loader. Runs on the pipeline's worker thread.
pub trait AssetSource: Send + 'static {
    fn prepare(&mut self, asset: &AssetRef) -> Result<PreparedAsset, AssetError>;
}

type Completion = (AssetRef, Result<PreparedAsset, AssetError>);

/// Serial background preparation queue. Requests are processed in order
/// on one worker thread; finished assets wait in a shared bin until the
/// main thread drains them.
pub struct AssetPipeline {
    sender: Option<mpsc::Sender<AssetRef>>,
    ready: Arc<Mutex<Vec<Completion>>>,
    worker: Option<JoinHandle<()>>,
}

impl AssetPipeline {
    pub fn spawn(mut source: impl AssetSource) -> Self {
        let (sender, receiver) = mpsc::channel::<AssetRef>();
        let ready = Arc::new(Mutex::new(Vec::new()));
        let bin = Arc::clone(&ready);
        let worker = thread::spawn(move || {
            while let Ok(asset) = receiver.recv() {
                let result = source.prepare(&asset);
                bin.lock().push((asset, result));
            }
        });
        Self {
            sender: Some(sender),
            ready,
            worker: Some(worker),
        }
    }

    /// Queues an asset for preparation.
    pub fn request(&self, asset: AssetRef) {
        if let Some(sender) = &self.sender {
            if sender.send(asset).is_err() {
                tracing::warn!("[assets] worker thread is gone, request dropped");
            }
        }
    }

    /// Takes every completion that has finished since the last drain.
    /// Called from the main tick.
    pub fn drain_ready(&self) -> Vec<Completion> {
        std::mem::take(&mut *self.ready.lock())
    }
}

impl Drop for AssetPipeline {
    fn drop(&mut self) {
        // Closing the channel lets the worker run off the end of its loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// In-memory asset source backed by a fixed table. The host's production
/// source wraps its real scene loader; tests and headless runs use this.
#[derive(Debug, Default, Clone)]
pub struct StaticAssetSource {
    assets: HashMap<AssetRef, PreparedAsset>,
}

impl StaticAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: impl Into<String>, prepared: PreparedAsset) {
        self.assets.insert(AssetRef(asset.into()), prepared);
    }
}

impl AssetSource for StaticAssetSource {
    fn prepare(&mut self, asset: &AssetRef) -> Result<PreparedAsset, AssetError> {
        self.assets
            .get(asset)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(asset.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_for_completions(pipeline: &AssetPipeline, count: usize) -> Vec<Completion> {
        let mut done = Vec::new();
        for _ in 0..200 {
            done.extend(pipeline.drain_ready());
            if done.len() >= count {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done
    }

    #[test]
    fn test_prepare_known_asset() {
        let mut source = StaticAssetSource::new();
        source.insert(
            "vase.scn",
            PreparedAsset {
                node: NodeHandle(7),
                half_extents: Vec3::splat(0.2),
            },
        );
        let pipeline = AssetPipeline::spawn(source);
        pipeline.request(AssetRef("vase.scn".to_string()));

        let done = wait_for_completions(&pipeline, 1);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].1.as_ref().unwrap().node, NodeHandle(7));
    }

    #[test]
    fn test_missing_asset_reports_error() {
        let pipeline = AssetPipeline::spawn(StaticAssetSource::new());
        pipeline.request(AssetRef("nope.scn".to_string()));

        let done = wait_for_completions(&pipeline, 1);
        assert_eq!(done.len(), 1);
        assert!(matches!(done[0].1, Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_requests_complete_in_order() {
        let mut source = StaticAssetSource::new();
        for (i, name) in ["a.scn", "b.scn", "c.scn"].iter().enumerate() {
            source.insert(
                *name,
                PreparedAsset {
                    node: NodeHandle(i as u64),
                    half_extents: Vec3::splat(0.1),
                },
            );
        }
        let pipeline = AssetPipeline::spawn(source);
        for name in ["a.scn", "b.scn", "c.scn"] {
            pipeline.request(AssetRef(name.to_string()));
        }

        let done = wait_for_completions(&pipeline, 3);
        let order: Vec<_> = done.iter().map(|(a, _)| a.0.clone()).collect();
        assert_eq!(order, vec!["a.scn", "b.scn", "c.scn"]);
    }
}
