use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{default_opener, CaptureDevice, CaptureSettings, DeviceOpener};
use crate::frame::Frame;
use crate::worker::{pause, Worker, JOIN_TIMEOUT};

/// Delay before retrying after a failed device read.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Snapshot of camera state for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct CameraInfo {
    pub active: bool,
    pub device: Option<String>,
    pub requested_resolution: Option<(u32, u32)>,
    pub resolution: Option<(u32, u32)>,
    pub target_fps: Option<u32>,
    pub frames_captured: u64,
    pub read_failures: u64,
    pub healthy: bool,
}

#[derive(Default)]
struct CaptureCounters {
    frames: AtomicU64,
    read_failures: AtomicU64,
}

struct CaptureSession {
    worker: Worker,
    settings: CaptureSettings,
    label: String,
    resolution: (u32, u32),
    started_at: Instant,
}

/// Owns the capture device and the single-slot latest-frame buffer.
///
/// Only the capture loop writes the slot; every read hands out a copy.
pub struct FrameSource {
    opener: DeviceOpener,
    slot: Arc<Mutex<Option<Frame>>>,
    session: Mutex<Option<CaptureSession>>,
    active: AtomicBool,
    counters: Arc<CaptureCounters>,
}

impl FrameSource {
    pub fn new() -> Self {
        Self::with_opener(default_opener())
    }

    /// Use a custom device factory instead of id-based dispatch.
    pub fn with_opener(opener: DeviceOpener) -> Self {
        Self {
            opener,
            slot: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
            active: AtomicBool::new(false),
            counters: Arc::new(CaptureCounters::default()),
        }
    }

    /// Open the device and start the capture loop.
    ///
    /// Succeeds without side effects if already capturing. If the device
    /// cannot be opened no loop is spawned and the source stays inactive.
    pub fn start(&self, settings: CaptureSettings) -> Result<()> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))?;
        if let Some(current) = session.as_ref() {
            log::warn!("camera {} is already active", current.label);
            return Ok(());
        }

        let device = (self.opener)(&settings)
            .with_context(|| format!("failed to open camera device {}", settings.device))?;
        let label = device.label().to_string();
        let resolution = device.resolution();

        let slot = self.slot.clone();
        let counters = self.counters.clone();
        let target_fps = settings.target_fps;
        let worker = Worker::spawn("capture-loop", move |shutdown| {
            capture_loop(device, slot, counters, target_fps, shutdown)
        })?;

        log::info!(
            "camera {} started at {}x{} (requested {}x{} @ {}fps)",
            label,
            resolution.0,
            resolution.1,
            settings.width,
            settings.height,
            settings.target_fps
        );
        *session = Some(CaptureSession {
            worker,
            settings,
            label,
            resolution,
            started_at: Instant::now(),
        });
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the capture loop and drop the buffered frame. No-op when idle.
    pub fn stop(&self) {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = session.take() else {
            return;
        };
        self.active.store(false, Ordering::SeqCst);
        current.worker.stop(JOIN_TIMEOUT);
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        log::info!("camera {} stopped", current.label);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Copy of the most recent frame, or `None` if nothing has been captured
    /// since the camera started.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn info(&self) -> CameraInfo {
        let frames_captured = self.counters.frames.load(Ordering::Relaxed);
        let read_failures = self.counters.read_failures.load(Ordering::Relaxed);
        let latest_age = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|frame| frame.captured_at().elapsed());

        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match session.as_ref() {
            Some(current) => {
                let grace = health_grace(current.settings.target_fps);
                let healthy = match latest_age {
                    Some(age) => age <= grace,
                    None => current.started_at.elapsed() <= grace,
                };
                CameraInfo {
                    active: true,
                    device: Some(current.label.clone()),
                    requested_resolution: Some((current.settings.width, current.settings.height)),
                    resolution: Some(current.resolution),
                    target_fps: Some(current.settings.target_fps),
                    frames_captured,
                    read_failures,
                    healthy,
                }
            }
            None => CameraInfo {
                active: false,
                device: None,
                requested_resolution: None,
                resolution: None,
                target_fps: None,
                frames_captured,
                read_failures,
                healthy: false,
            },
        }
    }
}

impl Default for FrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    slot: Arc<Mutex<Option<Frame>>>,
    counters: Arc<CaptureCounters>,
    target_fps: u32,
    shutdown: Arc<AtomicBool>,
) {
    let frame_interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);
    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();
        match device.read_frame() {
            Ok(frame) => {
                {
                    let mut latest = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    // Checked under the slot lock so a stopped loop never
                    // overwrites the slot after `stop` cleared it.
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    *latest = Some(frame);
                }
                counters.frames.fetch_add(1, Ordering::Relaxed);
                let elapsed = started.elapsed();
                if elapsed < frame_interval {
                    pause(frame_interval - elapsed, &shutdown);
                }
            }
            Err(err) => {
                counters.read_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("failed to read frame from {}: {:#}", device.label(), err);
                pause(READ_RETRY_DELAY, &shutdown);
            }
        }
    }
    log::debug!("capture loop for {} exited", device.label());
}

fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
