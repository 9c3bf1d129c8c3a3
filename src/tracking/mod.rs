//! Experiment tracking
//!
//! The pipeline reports each backend training through [`ExperimentTracker`].
//! Tracker failures are logged, never fatal.

mod tracker;

pub use tracker::{ExperimentTracker, InMemoryTracker, JsonlTracker, NoopTracker, RunStatus, TrackingEntry};
