//! Frame ingestion.
//!
//! A `FrameSource` drives one `CaptureDevice` on a background loop and keeps
//! the most recent frame in a single slot. Devices are selected by id:
//!
//! - `stub://<name>`: synthetic device (always available, used in tests)
//! - `/dev/videoN` or a bare index `N`: V4L2 device (feature: ingest-v4l2)
//! - `image:<path>`: still image served repeatedly (feature: ingest-image)
//!
//! Devices MUST NOT:
//! - Store captured frames to disk
//! - Forward frames over the network

mod source;
#[cfg(feature = "ingest-image")]
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::frame::Frame;

pub use source::{CameraInfo, FrameSource};
pub use synthetic::SyntheticDevice;

/// Requested capture parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CaptureSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// An opened capture device.
///
/// `read_frame` may block until the device delivers. A returned error is
/// treated as transient by the capture loop.
pub trait CaptureDevice: Send {
    /// Human-readable device label for logs.
    fn label(&self) -> &str;

    /// Resolution actually negotiated with the device.
    fn resolution(&self) -> (u32, u32);

    /// Capture the next frame.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Factory used by `FrameSource::start` to open a device.
pub type DeviceOpener =
    Arc<dyn Fn(&CaptureSettings) -> Result<Box<dyn CaptureDevice>> + Send + Sync>;

/// Default opener: dispatches on the device id scheme.
pub fn default_opener() -> DeviceOpener {
    Arc::new(open_device)
}

/// Open the device named by `settings.device`.
pub fn open_device(settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>> {
    let id = settings.device.trim();
    if id.is_empty() {
        return Err(anyhow!("capture device id must not be empty"));
    }
    if id.starts_with("stub://") {
        return Ok(Box::new(SyntheticDevice::open(settings)?));
    }
    if let Some(path) = id.strip_prefix("image:") {
        return open_still(path, settings);
    }
    let node = match id.parse::<u32>() {
        Ok(index) => format!("/dev/video{}", index),
        Err(_) => id.to_string(),
    };
    open_v4l2(&node, settings)
}

#[cfg(feature = "ingest-image")]
fn open_still(path: &str, _settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>> {
    Ok(Box::new(still::StillImageDevice::open(path)?))
}

#[cfg(not(feature = "ingest-image"))]
fn open_still(path: &str, _settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>> {
    Err(anyhow!(
        "still-image device {} requires the ingest-image feature",
        path
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(node: &str, settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>> {
    Ok(Box::new(v4l2::V4l2Device::open(node, settings)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(node: &str, _settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>> {
    Err(anyhow!(
        "capture device {} requires the ingest-v4l2 feature",
        node
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(device: &str) -> CaptureSettings {
        CaptureSettings {
            device: device.to_string(),
            width: 32,
            height: 24,
            target_fps: 10,
        }
    }

    #[test]
    fn opens_synthetic_devices() {
        let mut device = open_device(&settings("stub://desk")).unwrap();
        assert_eq!(device.resolution(), (32, 24));
        let frame = device.read_frame().unwrap();
        assert_eq!(frame.width, 32);
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn rejects_empty_ids() {
        assert!(open_device(&settings("  ")).is_err());
    }

    #[test]
    fn offline_stub_fails_to_open() {
        assert!(open_device(&settings("stub://offline")).is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn hardware_ids_need_the_v4l2_feature() {
        let err = open_device(&settings("0")).err().unwrap();
        assert!(err.to_string().contains("/dev/video0"));
    }
}
