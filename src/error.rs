//! Error types for the churn training pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline.
///
/// Every variant except [`PipelineError::BackendTraining`] is fatal for a run and
/// maps to its own process exit status through [`PipelineError::exit_code`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Validation failed: {train_failures} failing rule(s) on train, {test_failures} on test")]
    ValidationFailure {
        train_failures: usize,
        test_failures: usize,
    },

    #[error("Preprocessing error: {0}")]
    Preprocessing(String),

    #[error("Backend '{backend}' failed to train: {reason}")]
    BackendTraining { backend: String, reason: String },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Run cancelled after stage '{stage}'")]
    Cancelled { stage: String },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Shorthand for a backend-local failure.
    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::BackendTraining {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::Ingestion(_) => 3,
            PipelineError::ValidationFailure { .. } => 4,
            PipelineError::Preprocessing(_) => 5,
            PipelineError::Training(_) => 6,
            PipelineError::Persistence(_) => 7,
            PipelineError::Cancelled { .. } => 8,
            PipelineError::BackendTraining { .. }
            | PipelineError::Data(_)
            | PipelineError::Serialization(_)
            | PipelineError::ModelNotFitted
            | PipelineError::Io(_) => 1,
        }
    }

    /// Whether the error aborts a run. Only single-backend failures are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::BackendTraining { .. })
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::Data(format!("invalid shape: {}", err))
    }
}
