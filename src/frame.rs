//! Captured frame container.
//!
//! A `Frame` is the unit that moves from the capture loop to the sampling
//! loop. It owns its pixels outright: cloning a frame produces an independent
//! buffer, so a detector working on a copy never observes a camera write in
//! progress.

use std::fmt;
use std::time::Instant;

/// Bytes per pixel of the packed RGB8 layout every device produces.
pub const RGB_CHANNELS: usize = 3;

/// One captured frame (packed RGB8, row-major).
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Per-source capture counter, starting at 1.
    pub sequence: u64,

    /// Monotonic capture instant.
    captured_at: Instant,
}

impl Frame {
    /// Create a frame from packed RGB8 pixels.
    ///
    /// Buffers shorter than `width * height * 3` are accepted as-is; devices
    /// that deliver compressed or padded payloads hand them through untouched
    /// and the detector decides what to do with them.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Solid-colour frame, mostly useful for tests and synthetic devices.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * RGB_CHANNELS);
        for _ in 0..pixel_count {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Milliseconds since capture.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }

    /// RGB value at `(x, y)`, or `None` when out of bounds or the payload is
    /// not a full RGB8 image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        let px = self.data.get(offset..offset + RGB_CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

// Pixel payloads are large; keep them out of debug output.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_an_independent_copy() {
        let frame = Frame::filled(4, 2, [10, 20, 30], 1);
        let copy = frame.clone();
        drop(frame);
        assert_eq!(copy.byte_len(), 4 * 2 * 3);
        assert_eq!(copy.pixel(3, 1), Some([10, 20, 30]));
    }

    #[test]
    fn pixel_lookup_is_bounds_checked() {
        let frame = Frame::filled(2, 2, [1, 2, 3], 7);
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, 2), None);

        let short = Frame::new(vec![0u8; 5], 2, 2, 1);
        assert_eq!(short.pixel(1, 1), None);
    }

    #[test]
    fn debug_output_omits_pixels() {
        let frame = Frame::filled(640, 480, [0, 0, 0], 3);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("sequence: 3"));
        assert!(rendered.len() < 200);
    }
}
