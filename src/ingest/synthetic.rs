//! Synthetic capture device (`stub://`).
//!
//! Produces a moving test pattern at the requested resolution. A few
//! reserved names simulate faulty hardware:
//!
//! - `stub://offline`: the device cannot be opened
//! - `stub://flaky`: every third read fails
//! - `stub://frozen`: opens, but every read fails

use anyhow::{anyhow, Result};

use super::{CaptureDevice, CaptureSettings};
use crate::frame::{Frame, RGB_CHANNELS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Behaviour {
    Healthy,
    Flaky,
    Frozen,
}

pub struct SyntheticDevice {
    label: String,
    width: u32,
    height: u32,
    behaviour: Behaviour,
    reads: u64,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticDevice {
    pub fn open(settings: &CaptureSettings) -> Result<Self> {
        let name = settings
            .device
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a synthetic device id: {}", settings.device))?;
        let behaviour = match name {
            "offline" => {
                return Err(anyhow!("failed to open capture device {}", settings.device));
            }
            "flaky" => Behaviour::Flaky,
            "frozen" => Behaviour::Frozen,
            _ => Behaviour::Healthy,
        };
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!("synthetic device needs a non-zero resolution"));
        }
        log::info!(
            "SyntheticDevice: opened {} ({}x{})",
            settings.device,
            settings.width,
            settings.height
        );
        Ok(Self {
            label: settings.device.clone(),
            width: settings.width,
            height: settings.height,
            behaviour,
            reads: 0,
            frame_count: 0,
            scene_state: 0,
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.width as usize * self.height as usize * RGB_CHANNELS;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl CaptureDevice for SyntheticDevice {
    fn label(&self) -> &str {
        &self.label
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.reads += 1;
        match self.behaviour {
            Behaviour::Frozen => return Err(anyhow!("{}: no frame delivered", self.label)),
            Behaviour::Flaky if self.reads % 3 == 0 => {
                return Err(anyhow!("{}: transient read error", self.label));
            }
            _ => {}
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Frame::new(pixels, self.width, self.height, self.frame_count))
    }
}
