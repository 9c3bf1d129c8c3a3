//! Preprocessing configuration

use serde::{Deserialize, Serialize};
use super::{ImputeStrategy, ScalerType};

/// Configuration for feature preprocessing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Type of scaler to use for numeric features
    pub scaler: ScalerType,

    /// Strategy for filling missing numeric values
    pub numeric_imputation: ImputeStrategy,
}

impl PreprocessingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set scaler type
    pub fn with_scaler(mut self, scaler: ScalerType) -> Self {
        self.scaler = scaler;
        self
    }

    /// Builder method to set numeric impute strategy
    pub fn with_numeric_impute(mut self, strategy: ImputeStrategy) -> Self {
        self.numeric_imputation = strategy;
        self
    }
}
