//! Published scene state.
//!
//! The sampling loop is the single writer: every completed tick builds a new
//! `SceneSnapshot` and swaps it in as a whole. Readers clone the current
//! `Arc` and can never see detections from one tick paired with
//! relationships from another.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use serde::Serialize;

use crate::detect::Detection;
use crate::spatial::Relationship;

/// Immutable result of one sampling tick.
#[derive(Clone, Debug, Serialize)]
pub struct SceneSnapshot {
    pub detections: Vec<Detection>,
    pub relationships: Vec<Relationship>,
    /// Wall-clock time of the tick; `None` until the first tick completes.
    pub captured_at: Option<SystemTime>,
    /// Sampler tick counter (0 for the initial empty snapshot).
    pub sequence: u64,
    pub camera_active: bool,
    pub processing_active: bool,
}

impl SceneSnapshot {
    /// Snapshot exposed before any tick has completed.
    pub fn empty() -> Self {
        Self {
            detections: Vec::new(),
            relationships: Vec::new(),
            captured_at: None,
            sequence: 0,
            camera_active: false,
            processing_active: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Copy of this snapshot with different status flags.
    pub fn with_status(&self, camera_active: bool, processing_active: bool) -> Self {
        Self {
            camera_active,
            processing_active,
            ..self.clone()
        }
    }

    /// Milliseconds since the Unix epoch at capture, for JSON consumers.
    pub fn captured_at_ms(&self) -> Option<u128> {
        self.captured_at
            .and_then(|at| at.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
    }
}

impl Default for SceneSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Single-slot holder for the current snapshot, plus optional listeners.
pub struct SnapshotCell {
    current: RwLock<Arc<SceneSnapshot>>,
    subscribers: Mutex<Vec<Sender<Arc<SceneSnapshot>>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(SceneSnapshot::empty())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Current snapshot. The read lock is held only to clone the `Arc`.
    pub fn load(&self) -> Arc<SceneSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current snapshot and notify listeners.
    pub fn publish(&self, snapshot: SceneSnapshot) -> Arc<SceneSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        snapshot
    }

    /// Receive every snapshot published from now on. Dropping the receiver
    /// unsubscribes on the next publish.
    pub fn subscribe(&self) -> Receiver<Arc<SceneSnapshot>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn snapshot_with(classes: &[&str], sequence: u64) -> SceneSnapshot {
        let detections = classes
            .iter()
            .map(|c| Detection::new(*c, 0.9, BoundingBox::new(0, 0, 10, 10).unwrap()).unwrap())
            .collect();
        SceneSnapshot {
            detections,
            relationships: Vec::new(),
            captured_at: Some(SystemTime::now()),
            sequence,
            camera_active: true,
            processing_active: true,
        }
    }

    #[test]
    fn starts_empty_and_inactive() {
        let cell = SnapshotCell::new();
        let snap = cell.load();
        assert!(snap.is_empty());
        assert!(snap.relationships.is_empty());
        assert!(snap.captured_at.is_none());
        assert!(!snap.camera_active);
        assert!(!snap.processing_active);
    }

    #[test]
    fn publish_replaces_wholesale() {
        let cell = SnapshotCell::new();
        let before = cell.load();
        cell.publish(snapshot_with(&["cup"], 1));
        let after = cell.load();

        assert!(before.is_empty());
        assert_eq!(after.detections.len(), 1);
        assert_eq!(after.sequence, 1);
    }

    #[test]
    fn subscribers_receive_and_get_pruned() {
        let cell = SnapshotCell::new();
        let rx = cell.subscribe();
        let dropped = cell.subscribe();
        drop(dropped);

        cell.publish(snapshot_with(&["cup", "book"], 4));
        let got = rx.recv().unwrap();
        assert_eq!(got.sequence, 4);
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn with_status_keeps_content() {
        let snap = snapshot_with(&["cup"], 2);
        let stopped = snap.with_status(true, false);
        assert_eq!(stopped.detections, snap.detections);
        assert!(!stopped.processing_active);
        assert!(stopped.camera_active);
    }

    #[test]
    fn serializes_for_prompt_consumers() {
        let snap = snapshot_with(&["cup"], 1);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["detections"][0]["class"], "cup");
        assert_eq!(json["camera_active"], true);
        assert!(snap.captured_at_ms().is_some());
    }
}
