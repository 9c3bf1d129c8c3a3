//! churnpipe - Churn model training pipeline
//!
//! Turns a raw tabular customer dataset into a validated, preprocessed,
//! multi-model-trained, evaluated and selected churn classifier with
//! reproducible artifacts.
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`data`] - Loading and stratified train/test splitting
//! - [`validation`] - Feature schema and rule-based validation reports
//! - [`preprocessing`] - Train-only fitted scaling and category encoding
//! - [`training`] - Pluggable model backends and the parallel trainer
//! - [`evaluation`] - Held-out metrics and the selection policy
//!
//! ## Infrastructure
//! - [`config`] - YAML / JSON pipeline configuration
//! - [`artifacts`] - Versioned, checksummed artifact store
//! - [`tracking`] - Experiment tracking sinks
//! - [`pipeline`] - Run context and stage orchestration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Pipeline stages
pub mod data;
pub mod validation;
pub mod preprocessing;
pub mod training;
pub mod evaluation;

// Infrastructure
pub mod config;
pub mod artifacts;
pub mod tracking;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{PipelineError, Result};

/// Prelude for common imports
pub mod prelude {
    pub use crate::artifacts::{ArtifactKind, ArtifactRef, ArtifactStore};
    pub use crate::config::PipelineConfig;
    pub use crate::data::{DataIngestor, DataSource, Dataset, Record, RecordId, Split, Value};
    pub use crate::error::{PipelineError, Result};
    pub use crate::evaluation::{
        Candidate, EvaluationMetrics, Evaluator, MetricName, SelectionPolicy, SelectionResult, Selector,
    };
    pub use crate::pipeline::{CancellationToken, PipelineOutcome, RunContext, TrainingPipeline};
    pub use crate::preprocessing::{FeatureMatrix, PreprocessingArtifact, PreprocessingConfig, Preprocessor};
    pub use crate::tracking::{ExperimentTracker, InMemoryTracker, JsonlTracker, TrackingEntry};
    pub use crate::training::{BackendConfig, ModelBackend, ModelTrainer, TrainedModel};
    pub use crate::validation::{FeatureSchema, FeatureSpec, RunValidation, SchemaValidator, ValidationReport};
}
