//! Scan orchestration: the smart controller, the progress stream, and the
//! engine that owns per-process scan state.

mod controller;
mod engine;
mod progress;

pub use controller::{ScanLayer, SmartController};
pub use engine::Engine;
pub use progress::{ProgressEvent, ProgressSender};
