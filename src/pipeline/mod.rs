//! Training pipeline orchestration
//!
//! Stages run in a fixed sequence, each consuming only its predecessor's
//! output: ingestion, validation, preprocessing, training (fan-out over
//! backends), evaluation and selection (fan-in), then persistence.
//! Run bookkeeping travels in an explicit [`RunContext`].

mod context;
mod runner;

pub use context::{CancellationToken, EventLevel, RunContext, RunEvent, RunLog, Stage};
pub use runner::{PipelineOutcome, TrainedSummary, TrainingLog, TrainingPipeline};
