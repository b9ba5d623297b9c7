pub mod scripted;

pub use scripted::{ScriptStep, ScriptedBackend};
