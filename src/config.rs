use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::ingest::CaptureSettings;
use crate::sampler::{
    SamplerSettings, DEFAULT_INTERVAL_SECS, DEFAULT_MAX_OBJECTS, DEFAULT_MIN_CONFIDENCE,
    MIN_INTERVAL_SECS,
};
use crate::spatial::{
    SpatialSettings, DEFAULT_ALIGNMENT_TOLERANCE_PX, DEFAULT_PROXIMITY_THRESHOLD_PX,
};

const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;
const MAX_TARGET_FPS: u32 = 120;

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    camera: Option<CameraConfigFile>,
    sampling: Option<SamplingConfigFile>,
    spatial: Option<SpatialConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    interval_secs: Option<f64>,
    min_confidence: Option<f32>,
    max_objects: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SpatialConfigFile {
    proximity_threshold_px: Option<f64>,
    alignment_tolerance_px: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionConfig {
    pub camera: CaptureSettings,
    pub sampling: SamplingConfig,
    pub spatial: SpatialSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub interval_secs: f64,
    pub min_confidence: f32,
    pub max_objects: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self::from_file(VisionConfigFile::default())
    }
}

impl VisionConfig {
    /// Load from the file named by `VISION_CONFIG` (if set), then apply
    /// `VISION_*` env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VisionConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let sampling = file.sampling.unwrap_or_default();
        let spatial = file.spatial.unwrap_or_default();
        Self {
            camera: CaptureSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            },
            sampling: SamplingConfig {
                interval_secs: sampling.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
                min_confidence: sampling.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                max_objects: sampling.max_objects.unwrap_or(DEFAULT_MAX_OBJECTS),
            },
            spatial: SpatialSettings {
                proximity_threshold_px: spatial
                    .proximity_threshold_px
                    .unwrap_or(DEFAULT_PROXIMITY_THRESHOLD_PX),
                alignment_tolerance_px: spatial
                    .alignment_tolerance_px
                    .unwrap_or(DEFAULT_ALIGNMENT_TOLERANCE_PX),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("VISION_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(fps) = std::env::var("VISION_TARGET_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_TARGET_FPS must be an integer frame rate"))?;
        }
        if let Ok(interval) = std::env::var("VISION_INTERVAL_SECS") {
            self.sampling.interval_secs = interval
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_INTERVAL_SECS must be a number of seconds"))?;
        }
        if let Ok(confidence) = std::env::var("VISION_MIN_CONFIDENCE") {
            self.sampling.min_confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_MIN_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(max_objects) = std::env::var("VISION_MAX_OBJECTS") {
            self.sampling.max_objects = max_objects
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_MAX_OBJECTS must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let camera = &self.camera;
        if camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if camera.width == 0 || camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if camera.width > MAX_WIDTH || camera.height > MAX_HEIGHT {
            return Err(anyhow!(
                "camera resolution {}x{} exceeds {}x{}",
                camera.width,
                camera.height,
                MAX_WIDTH,
                MAX_HEIGHT
            ));
        }
        if !(1..=MAX_TARGET_FPS).contains(&camera.target_fps) {
            return Err(anyhow!(
                "camera target_fps must be between 1 and {}",
                MAX_TARGET_FPS
            ));
        }

        let confidence = self.sampling.min_confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("sampling min_confidence must be between 0 and 1"));
        }
        if self.sampling.max_objects == 0 {
            return Err(anyhow!("sampling max_objects must be at least 1"));
        }
        if !self.sampling.interval_secs.is_finite() {
            return Err(anyhow!("sampling interval_secs must be a finite number"));
        }
        if self.sampling.interval_secs < MIN_INTERVAL_SECS {
            log::warn!(
                "sampling interval {}s is below the {}s floor; clamping",
                self.sampling.interval_secs,
                MIN_INTERVAL_SECS
            );
            self.sampling.interval_secs = MIN_INTERVAL_SECS;
        }

        for (name, value) in [
            ("proximity_threshold_px", self.spatial.proximity_threshold_px),
            ("alignment_tolerance_px", self.spatial.alignment_tolerance_px),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow!("spatial {} must be a positive number", name));
            }
        }
        Ok(())
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            min_confidence: self.sampling.min_confidence,
            max_objects: self.sampling.max_objects,
            spatial: self.spatial,
        }
    }
}

fn read_config_file(path: &Path) -> Result<VisionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: VisionConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
