use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Object detector capability.
///
/// The model behind this trait is opaque to the engine; only the output shape
/// matters. Implementations receive a frame copy owned by the sampling loop
/// and must not retain it beyond the call.
///
/// Returning `Err` (or panicking) abandons the current tick. The previously
/// published scene stays in place.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once when processing starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A detector shared between the controller and the sampling loop.
///
/// Wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub type SharedDetector = Arc<Mutex<dyn DetectorBackend>>;

/// Wrap a backend for sharing.
pub fn shared<B: DetectorBackend + 'static>(backend: B) -> SharedDetector {
    Arc::new(Mutex::new(backend))
}
