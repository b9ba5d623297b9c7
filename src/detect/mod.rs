mod backend;
mod backends;
mod result;

pub use backend::{shared, DetectorBackend, SharedDetector};
pub use backends::{ScriptStep, ScriptedBackend};
pub use result::{BoundingBox, Detection, RawDetection};
