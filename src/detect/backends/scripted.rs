use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// One scripted detector response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Emit(Vec<RawDetection>),
    Fail(String),
    Panic(String),
}

/// Scripted backend for tests and synthetic runs.
///
/// Replays its steps in order, one per `detect` call, and wraps around after
/// the last one. Frame contents are ignored.
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    cursor: usize,
    calls: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit the same detections on every call.
    pub fn constant(detections: Vec<RawDetection>) -> Self {
        Self::new(vec![ScriptStep::Emit(detections)])
    }

    /// Shared counter of `detect` invocations, readable after the backend has
    /// been moved into a sampler.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.steps.is_empty() {
            return Ok(Vec::new());
        }
        let step = self.steps[self.cursor % self.steps.len()].clone();
        self.cursor = (self.cursor + 1) % self.steps.len();
        match step {
            ScriptStep::Emit(detections) => Ok(detections),
            ScriptStep::Fail(reason) => Err(anyhow!("scripted detector failure: {}", reason)),
            ScriptStep::Panic(reason) => panic!("scripted detector panic: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_backend_cycles_through_steps() {
        let mut backend = ScriptedBackend::new(vec![
            ScriptStep::Emit(vec![RawDetection::new("cup", 0.9, [0, 0, 10, 10])]),
            ScriptStep::Fail("lens cap".to_string()),
        ]);
        let counter = backend.call_counter();
        let frame = Frame::filled(2, 2, [0, 0, 0], 1);

        let r1 = backend.detect(&frame).unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].class, "cup");

        let r2 = backend.detect(&frame);
        assert!(r2.unwrap_err().to_string().contains("lens cap"));

        let r3 = backend.detect(&frame).unwrap();
        assert_eq!(r3.len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_script_detects_nothing() {
        let mut backend = ScriptedBackend::new(vec![]);
        let frame = Frame::filled(1, 1, [0, 0, 0], 1);
        assert!(backend.detect(&frame).unwrap().is_empty());
    }
}
