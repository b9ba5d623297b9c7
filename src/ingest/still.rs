//! Still-image capture device (`image:<path>`).
//!
//! Decodes one local image at open time and serves it as every frame. Handy
//! for running the pipeline against a fixed scene without a camera.

use anyhow::{anyhow, Context, Result};

use super::CaptureDevice;
use crate::frame::Frame;

pub struct StillImageDevice {
    label: String,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl StillImageDevice {
    pub fn open(path: &str) -> Result<Self> {
        if path.contains("://") {
            return Err(anyhow!(
                "still-image device only supports local paths (no URL schemes)"
            ));
        }
        let decoded = image::open(path)
            .with_context(|| format!("decode still image {}", path))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        log::info!("StillImageDevice: loaded {} ({}x{})", path, width, height);
        Ok(Self {
            label: format!("image:{}", path),
            pixels: decoded.into_raw(),
            width,
            height,
            frame_count: 0,
        })
    }
}

impl CaptureDevice for StillImageDevice {
    fn label(&self) -> &str {
        &self.label
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        Ok(Frame::new(
            self.pixels.clone(),
            self.width,
            self.height,
            self.frame_count,
        ))
    }
}
