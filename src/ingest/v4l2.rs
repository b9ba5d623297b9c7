//! V4L2 capture device.
//!
//! Opens a local device node (e.g. `/dev/video0`), negotiates packed RGB at
//! the requested resolution and frame rate, and streams through a small mmap
//! buffer ring. The device is released when the value is dropped.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use super::{CaptureDevice, CaptureSettings};
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Device {
    node: String,
    state: V4l2State,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub fn open(node: &str, settings: &CaptureSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device =
            v4l::Device::with_path(node).with_context(|| format!("open v4l2 device {}", node))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Device: failed to set format on {}: {}", node, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Device: failed to set fps on {}: {}", node, err);
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Device: opened {} ({}x{})",
            node,
            format.width,
            format.height
        );
        Ok(Self {
            node: node.to_string(),
            state,
            frame_count: 0,
            active_width: format.width,
            active_height: format.height,
        })
    }
}

impl CaptureDevice for V4l2Device {
    fn label(&self) -> &str {
        &self.node
    }

    fn resolution(&self) -> (u32, u32) {
        (self.active_width, self.active_height)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let pixels = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .with_context(|| format!("capture v4l2 frame from {}", self.node))?;

        self.frame_count += 1;
        Ok(Frame::new(
            pixels,
            self.active_width,
            self.active_height,
            self.frame_count,
        ))
    }
}
