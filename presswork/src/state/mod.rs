//! Per-job item state tracking.

mod tracker;

pub use tracker::{ItemStateTracker, TrackerSnapshot};
