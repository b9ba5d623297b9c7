//! Scene Vision Engine
//!
//! Real-time vision sampling for a conversational assistant. A camera is
//! captured continuously, an object detector runs on a fixed cadence, and each
//! tick's detections are turned into qualitative spatial relationships
//! ("the cup is to the left of the laptop") published as one immutable
//! snapshot.
//!
//! # Architecture
//!
//! Two background loops cooperate:
//!
//! 1. **Capture loop** (`ingest::FrameSource`): reads frames from a
//!    `CaptureDevice` and keeps only the latest one.
//! 2. **Sampling loop** (`sampler::SceneSampler`): copies the latest frame,
//!    runs the `DetectorBackend`, computes relationships with
//!    `spatial::RelationshipEngine` and publishes a `scene::SceneSnapshot`.
//!
//! `controller::VisionController` owns both and enforces start/stop ordering.
//! Consumers read snapshots through `get_snapshot()` or `subscribe()`.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB frames
//! - `ingest`: capture devices and the latest-frame source
//! - `detect`: detector capability and detection types
//! - `spatial`: pairwise relationship rules
//! - `sampler`: periodic detect-and-publish loop
//! - `scene`: snapshot type and publication cell
//! - `describe`: object summaries and sentences
//! - `controller`: lifecycle coordination
//! - `config`: file + env configuration

pub mod config;
pub mod controller;
pub mod describe;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod sampler;
pub mod scene;
pub mod spatial;
pub mod worker;

pub use config::VisionConfig;
pub use controller::{SceneAnalysis, VisionController};
pub use describe::{describe_detections, describe_scene, ObjectSummary};
pub use detect::{
    shared, BoundingBox, Detection, DetectorBackend, RawDetection, ScriptStep, ScriptedBackend,
    SharedDetector,
};
pub use frame::Frame;
pub use ingest::{CameraInfo, CaptureDevice, CaptureSettings, FrameSource};
pub use sampler::{SamplerSettings, SamplerStats, SceneSampler};
pub use scene::{SceneSnapshot, SnapshotCell};
pub use spatial::{RelationKind, Relationship, RelationshipEngine, SpatialSettings};
