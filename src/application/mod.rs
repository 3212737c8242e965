//! Application layer: iteration orchestration.

pub mod controller;
pub mod snapshot;

pub use controller::{ControllerDeps, IterationController};
pub use snapshot::snapshot_codebase;
