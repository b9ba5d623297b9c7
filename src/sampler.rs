//! Periodic scene sampling.
//!
//! The sampling loop copies the latest frame, runs the detector on it,
//! derives spatial relationships and publishes the result as one
//! `SceneSnapshot`. A tick that fails anywhere publishes nothing, so the
//! previous snapshot stays visible.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use crate::detect::{Detection, RawDetection, SharedDetector};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::scene::{SceneSnapshot, SnapshotCell};
use crate::spatial::{Relationship, RelationshipEngine, SpatialSettings};
use crate::worker::{Worker, JOIN_TIMEOUT, PAUSE_SLICE};

/// Shortest allowed sampling interval.
pub const MIN_INTERVAL_SECS: f64 = 0.1;
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_MAX_OBJECTS: usize = 20;

/// Detection filtering and relationship thresholds applied on every tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerSettings {
    pub min_confidence: f32,
    pub max_objects: usize,
    pub spatial: SpatialSettings,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_objects: DEFAULT_MAX_OBJECTS,
            spatial: SpatialSettings::default(),
        }
    }
}

/// Tick counters since the sampler was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub published: u64,
    /// Ticks with no frame available yet.
    pub skipped: u64,
    /// Ticks abandoned because detection failed.
    pub failed: u64,
}

#[derive(Default)]
struct TickCounters {
    published: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Detections and relationships produced from a single frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionPass {
    pub detections: Vec<Detection>,
    pub relationships: Vec<Relationship>,
}

/// Detection filtering plus the relationship engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScenePipeline {
    settings: SamplerSettings,
    engine: RelationshipEngine,
}

impl ScenePipeline {
    pub fn new(settings: SamplerSettings) -> Self {
        Self {
            settings,
            engine: RelationshipEngine::new(settings.spatial),
        }
    }

    pub fn settings(&self) -> SamplerSettings {
        self.settings
    }

    /// Run `detector` on `frame` and derive relationships.
    pub fn analyze(&self, detector: &SharedDetector, frame: &Frame) -> Result<DetectionPass> {
        let raw = run_detector(detector, frame)?;
        let detections = self.select(raw)?;
        let relationships = self.engine.compute(&detections);
        Ok(DetectionPass {
            detections,
            relationships,
        })
    }

    /// Validate raw output, drop low-confidence records, keep the most
    /// confident `max_objects`.
    pub fn select(&self, raw: Vec<RawDetection>) -> Result<Vec<Detection>> {
        let mut detections = raw
            .into_iter()
            .map(Detection::try_from)
            .collect::<Result<Vec<_>>>()
            .context("detector returned malformed output")?;
        detections.retain(|d| d.confidence() >= self.settings.min_confidence);
        detections.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
        detections.truncate(self.settings.max_objects);
        Ok(detections)
    }
}

/// Call the detector, converting a panic into an error.
///
/// The panic is caught while the guard is still held so the mutex is not
/// poisoned and the detector stays usable for later ticks.
pub fn run_detector(detector: &SharedDetector, frame: &Frame) -> Result<Vec<RawDetection>> {
    let mut backend = detector
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    let name = backend.name();
    match panic::catch_unwind(AssertUnwindSafe(|| backend.detect(frame))) {
        Ok(result) => result.with_context(|| format!("detector {} failed", name)),
        Err(payload) => Err(anyhow!(
            "detector {} panicked: {}",
            name,
            panic_message(payload.as_ref())
        )),
    }
}

/// Run the detector's warm-up hook, converting a panic into an error.
pub fn warm_up_detector(detector: &SharedDetector) -> Result<()> {
    let mut backend = detector
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    let name = backend.name();
    match panic::catch_unwind(AssertUnwindSafe(|| backend.warm_up())) {
        Ok(result) => result.with_context(|| format!("warm up detector {}", name)),
        Err(payload) => Err(anyhow!(
            "detector {} panicked during warm-up: {}",
            name,
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn interval_millis(interval_secs: f64) -> u64 {
    let secs = if interval_secs.is_finite() {
        interval_secs.max(MIN_INTERVAL_SECS)
    } else {
        DEFAULT_INTERVAL_SECS
    };
    (secs * 1000.0).round() as u64
}

/// Drives the periodic detect-and-publish loop.
pub struct SceneSampler {
    pipeline: ScenePipeline,
    snapshots: Arc<SnapshotCell>,
    interval_ms: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
    running: AtomicBool,
    counters: Arc<TickCounters>,
    sequence: Arc<AtomicU64>,
}

impl SceneSampler {
    pub fn new(settings: SamplerSettings, snapshots: Arc<SnapshotCell>) -> Self {
        Self {
            pipeline: ScenePipeline::new(settings),
            snapshots,
            interval_ms: Arc::new(AtomicU64::new(interval_millis(DEFAULT_INTERVAL_SECS))),
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
            counters: Arc::new(TickCounters::default()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pipeline(&self) -> ScenePipeline {
        self.pipeline
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCell> {
        &self.snapshots
    }

    /// Start the sampling loop.
    ///
    /// Fails without spawning anything if the camera is inactive, no
    /// detector is supplied, or the detector's warm-up fails. Succeeds
    /// without side effects if already running.
    pub fn start(
        &self,
        detector: Option<SharedDetector>,
        frames: Arc<FrameSource>,
        interval_secs: f64,
    ) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            log::warn!("scene sampling is already running");
            return Ok(());
        }
        if !frames.is_active() {
            bail!("camera is not active; start the camera before processing");
        }
        let detector = detector.ok_or_else(|| anyhow!("no detector configured"))?;
        warm_up_detector(&detector)?;

        self.set_interval(interval_secs);
        let sampling = SamplingLoop {
            pipeline: self.pipeline,
            detector,
            frames,
            snapshots: self.snapshots.clone(),
            interval_ms: self.interval_ms.clone(),
            counters: self.counters.clone(),
            sequence: self.sequence.clone(),
        };
        *worker = Some(Worker::spawn("scene-sampler", move |shutdown| {
            sampling.run(&shutdown)
        })?);
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "scene sampling started (interval {} ms)",
            self.interval_ms.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// Stop the sampling loop. No-op when not running.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = worker.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        current.stop(JOIN_TIMEOUT);
        log::info!("scene sampling stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Change the sampling cadence. Applies to a running loop on its next
    /// scheduling check. Values below 0.1 s are raised to 0.1 s.
    pub fn set_interval(&self, interval_secs: f64) {
        let millis = interval_millis(interval_secs);
        self.interval_ms.store(millis, Ordering::Relaxed);
        log::debug!("sampling interval set to {} ms", millis);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            published: self.counters.published.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SceneSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SamplingLoop {
    pipeline: ScenePipeline,
    detector: SharedDetector,
    frames: Arc<FrameSource>,
    snapshots: Arc<SnapshotCell>,
    interval_ms: Arc<AtomicU64>,
    counters: Arc<TickCounters>,
    sequence: Arc<AtomicU64>,
}

impl SamplingLoop {
    fn run(&self, shutdown: &AtomicBool) {
        let mut last_tick: Option<Instant> = None;
        while !shutdown.load(Ordering::SeqCst) {
            let interval = Duration::from_millis(self.interval_ms.load(Ordering::Relaxed));
            if let Some(last) = last_tick {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    std::thread::sleep((interval - elapsed).min(PAUSE_SLICE));
                    continue;
                }
            }
            last_tick = Some(Instant::now());
            self.tick(shutdown);
        }
        log::debug!("sampling loop exited");
    }

    fn tick(&self, shutdown: &AtomicBool) {
        let Some(frame) = self.frames.latest_frame() else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            log::debug!("no frame available yet; skipping tick");
            return;
        };

        let pass = match self.pipeline.analyze(&self.detector, &frame) {
            Ok(pass) => pass,
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("scene tick on frame {} abandoned: {:#}", frame.sequence, err);
                return;
            }
        };
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!(
            "tick {}: {} detections, {} relationships (frame {})",
            sequence,
            pass.detections.len(),
            pass.relationships.len(),
            frame.sequence
        );
        self.snapshots.publish(SceneSnapshot {
            detections: pass.detections,
            relationships: pass.relationships,
            captured_at: Some(SystemTime::now()),
            sequence,
            camera_active: self.frames.is_active(),
            processing_active: true,
        });
        self.counters.published.fetch_add(1, Ordering::Relaxed);
    }
}
