//! Data preprocessing module
//!
//! Provides deterministic, serializable feature transforms fit on the training
//! split only:
//! - Missing value imputation (mean, median)
//! - Feature scaling (standard, min-max, robust)
//! - One-hot categorical encoding with an unknown bucket

mod config;
mod encoder;
mod pipeline;
mod scaler;

pub use config::PreprocessingConfig;
pub use encoder::{CategoryEncoder, UNKNOWN_CATEGORY};
pub use pipeline::{FeatureMatrix, FeatureTransform, PreprocessingArtifact, Preprocessor};
pub use scaler::{impute_value, ImputeStrategy, Scaler, ScalerParams, ScalerType};
