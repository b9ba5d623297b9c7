//! Lifecycle controller.
//!
//! `VisionController` owns the frame source and the sampler for its whole
//! life and toggles them with explicit start/stop calls. Ordering rules:
//! processing needs an active camera, and stopping the camera stops
//! processing first.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::config::VisionConfig;
use crate::describe::{describe_detections, describe_scene, ObjectSummary};
use crate::detect::{shared, Detection, DetectorBackend, SharedDetector};
use crate::frame::Frame;
use crate::ingest::{CameraInfo, DeviceOpener, FrameSource};
use crate::sampler::{SamplerStats, SceneSampler};
use crate::scene::{SceneSnapshot, SnapshotCell};
use crate::spatial::Relationship;

/// One-shot analysis of a caller-supplied frame.
#[derive(Clone, Debug, Serialize)]
pub struct SceneAnalysis {
    pub detections: Vec<Detection>,
    pub relationships: Vec<Relationship>,
    pub summary: ObjectSummary,
    pub description: String,
}

pub struct VisionController {
    config: VisionConfig,
    frames: Arc<FrameSource>,
    sampler: SceneSampler,
    snapshots: Arc<SnapshotCell>,
    detector: Mutex<Option<SharedDetector>>,
    /// Serializes start/stop so ordering checks cannot interleave.
    lifecycle: Mutex<()>,
}

impl VisionController {
    pub fn new(config: VisionConfig) -> Self {
        Self::build(config, FrameSource::new())
    }

    /// Controller whose camera is opened through `opener`.
    pub fn with_opener(config: VisionConfig, opener: DeviceOpener) -> Self {
        Self::build(config, FrameSource::with_opener(opener))
    }

    fn build(config: VisionConfig, frames: FrameSource) -> Self {
        let snapshots = Arc::new(SnapshotCell::new());
        let sampler = SceneSampler::new(config.sampler_settings(), snapshots.clone());
        sampler.set_interval(config.sampling.interval_secs);
        Self {
            config,
            frames: Arc::new(frames),
            sampler,
            snapshots,
            detector: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Install the detector used by the next `start_processing`.
    pub fn set_detector<B: DetectorBackend + 'static>(&self, backend: B) {
        self.set_detector_shared(shared(backend));
    }

    pub fn set_detector_shared(&self, detector: SharedDetector) {
        let name = detector
            .lock()
            .map(|backend| backend.name())
            .unwrap_or("unknown");
        *self.detector.lock().unwrap_or_else(PoisonError::into_inner) = Some(detector);
        if self.sampler.is_running() {
            log::info!(
                "detector {} installed; takes effect when processing restarts",
                name
            );
        } else {
            log::info!("detector {} installed", name);
        }
    }

    pub fn start_camera(&self) -> Result<()> {
        let _lifecycle = self.lock_lifecycle();
        self.frames.start(self.config.camera.clone())
    }

    /// Stop processing, then the camera.
    pub fn stop_camera(&self) {
        let _lifecycle = self.lock_lifecycle();
        self.sampler.stop();
        self.frames.stop();
    }

    pub fn start_processing(&self) -> Result<()> {
        let _lifecycle = self.lock_lifecycle();
        let detector = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector slot lock poisoned"))?
            .clone();
        self.sampler.start(
            detector,
            self.frames.clone(),
            self.sampler.interval().as_secs_f64(),
        )
    }

    pub fn stop_processing(&self) {
        let _lifecycle = self.lock_lifecycle();
        self.sampler.stop();
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_camera_active(&self) -> bool {
        self.frames.is_active()
    }

    pub fn is_processing(&self) -> bool {
        self.sampler.is_running()
    }

    /// Latest published snapshot with the current status flags.
    pub fn get_snapshot(&self) -> Arc<SceneSnapshot> {
        let snapshot = self.snapshots.load();
        let camera_active = self.frames.is_active();
        let processing_active = self.sampler.is_running();
        if snapshot.camera_active == camera_active
            && snapshot.processing_active == processing_active
        {
            snapshot
        } else {
            Arc::new(snapshot.with_status(camera_active, processing_active))
        }
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> Receiver<Arc<SceneSnapshot>> {
        self.snapshots.subscribe()
    }

    pub fn set_processing_interval(&self, interval_secs: f64) {
        self.sampler.set_interval(interval_secs);
    }

    pub fn camera_info(&self) -> CameraInfo {
        self.frames.info()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.latest_frame()
    }

    pub fn sampler_stats(&self) -> SamplerStats {
        self.sampler.stats()
    }

    /// Run detection and relationship analysis on `frame` outside the
    /// sampling loop. Nothing is published.
    pub fn analyze_frame(&self, frame: &Frame) -> Result<SceneAnalysis> {
        let detector = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector slot lock poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("no detector configured"))?;
        let pass = self.sampler.pipeline().analyze(&detector, frame)?;
        let summary = ObjectSummary::from_detections(&pass.detections);
        let description = describe_detections(&pass.detections, &pass.relationships);
        Ok(SceneAnalysis {
            detections: pass.detections,
            relationships: pass.relationships,
            summary,
            description,
        })
    }

    /// Sentence describing the current snapshot.
    pub fn describe_current(&self) -> String {
        describe_scene(&self.get_snapshot())
    }

    pub fn shutdown(&self) {
        self.stop_camera();
    }
}

impl Drop for VisionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{RawDetection, ScriptedBackend};
    use crate::spatial::RelationKind;

    fn config(device: &str) -> VisionConfig {
        let mut cfg = VisionConfig::default();
        cfg.camera.device = device.to_string();
        cfg.camera.width = 16;
        cfg.camera.height = 16;
        cfg.camera.target_fps = 50;
        cfg.sampling.interval_secs = 0.1;
        cfg
    }

    fn tv_and_remote() -> ScriptedBackend {
        ScriptedBackend::constant(vec![
            RawDetection::new("tv", 0.9, [100, 100, 500, 400]),
            RawDetection::new("remote", 0.8, [200, 200, 250, 230]),
        ])
    }

    #[test]
    fn snapshot_flags_track_lifecycle() {
        let controller = VisionController::new(config("stub://living_room"));
        let snap = controller.get_snapshot();
        assert!(snap.is_empty());
        assert!(!snap.camera_active && !snap.processing_active);

        controller.start_camera().unwrap();
        let snap = controller.get_snapshot();
        assert!(snap.camera_active);
        assert!(!snap.processing_active);

        controller.stop_camera();
        assert!(!controller.get_snapshot().camera_active);
    }

    #[test]
    fn processing_requires_camera_and_detector() {
        let controller = VisionController::new(config("stub://living_room"));
        controller.set_detector(tv_and_remote());
        assert!(controller.start_processing().is_err());

        let bare = VisionController::new(config("stub://living_room"));
        bare.start_camera().unwrap();
        assert!(bare.start_processing().is_err());
        assert!(!bare.is_processing());
    }

    #[test]
    fn stop_camera_stops_processing_first() {
        let controller = VisionController::new(config("stub://living_room"));
        controller.set_detector(tv_and_remote());
        controller.start_camera().unwrap();
        controller.start_processing().unwrap();
        assert!(controller.is_processing());

        controller.stop_camera();
        assert!(!controller.is_processing());
        assert!(!controller.is_camera_active());
        controller.stop_processing();
    }

    #[test]
    fn analyze_frame_reports_relationships() {
        let controller = VisionController::new(config("stub://unused"));
        assert!(controller
            .analyze_frame(&Frame::filled(4, 4, [0, 0, 0], 1))
            .is_err());

        controller.set_detector(tv_and_remote());
        let analysis = controller
            .analyze_frame(&Frame::filled(4, 4, [0, 0, 0], 1))
            .unwrap();
        assert_eq!(analysis.summary.total_objects, 2);
        assert_eq!(analysis.relationships.len(), 1);
        assert_eq!(analysis.relationships[0].kind, RelationKind::Contains);
        assert!(analysis.description.contains("the tv contains the remote"));
        assert!(controller.get_snapshot().is_empty());
    }

    #[test]
    fn describe_current_before_first_tick() {
        let controller = VisionController::new(config("stub://unused"));
        assert_eq!(controller.describe_current(), "I don't see any objects.");
    }

    #[test]
    fn set_processing_interval_is_clamped() {
        let controller = VisionController::new(config("stub://unused"));
        controller.set_processing_interval(0.0);
        assert_eq!(controller.sampler.interval().as_millis(), 100);
    }

    #[test]
    fn concurrent_stop_camera_never_strands_processing() {
        let controller = Arc::new(VisionController::new(config("stub://living_room")));
        controller.set_detector(tv_and_remote());
        for _ in 0..10 {
            controller.start_camera().unwrap();
            let starter = {
                let controller = controller.clone();
                std::thread::spawn(move || {
                    let _ = controller.start_processing();
                })
            };
            controller.stop_camera();
            starter.join().unwrap();

            assert!(!controller.is_camera_active());
            assert!(!controller.is_processing());
            controller.stop_processing();
        }
    }
}
