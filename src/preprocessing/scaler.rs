//! Feature scaling and numeric imputation

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerType {
    /// Standard scaling (z-score normalization): (x - mean) / std
    #[default]
    Standard,
    /// Min-Max scaling: (x - min) / (max - min)
    #[serde(alias = "min_max")]
    MinMax,
    /// Robust scaling using median and IQR
    Robust,
}

/// Strategy for filling missing numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    #[default]
    Mean,
    Median,
}

/// Parameters of a fitted scaler: `(x - center) / scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    /// mean, min, or median
    pub center: f64,
    /// std, range, or IQR; never zero
    pub scale: f64,
}

impl ScalerParams {
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }

    pub fn invert(&self, value: f64) -> f64 {
        value * self.scale + self.center
    }
}

/// Feature scaler for a single numeric column
#[derive(Debug, Clone, Copy)]
pub struct Scaler {
    scaler_type: ScalerType,
}

impl Scaler {
    /// Create a new scaler
    pub fn new(scaler_type: ScalerType) -> Self {
        Self { scaler_type }
    }

    /// Fit on the observed (non-missing) values of one column
    pub fn fit(&self, feature: &str, values: &[f64]) -> Result<ScalerParams> {
        let ca = observed(feature, values)?;

        let (center, scale) = match self.scaler_type {
            ScalerType::Standard => {
                let mean = ca.mean().unwrap_or(0.0);
                let std = ca.std(1).unwrap_or(1.0);
                (mean, std)
            }
            ScalerType::MinMax => {
                let min = ca.min().unwrap_or(0.0);
                let max = ca.max().unwrap_or(1.0);
                (min, max - min)
            }
            ScalerType::Robust => {
                let median = ca.median().unwrap_or(0.0);
                let q1 = quantile(&ca, 0.25)?.unwrap_or(0.0);
                let q3 = quantile(&ca, 0.75)?.unwrap_or(1.0);
                (median, q3 - q1)
            }
        };

        Ok(ScalerParams {
            center,
            scale: if scale == 0.0 || !scale.is_finite() { 1.0 } else { scale },
        })
    }
}

/// Fill value for missing entries of one column, computed from its observed values
pub fn impute_value(feature: &str, values: &[f64], strategy: ImputeStrategy) -> Result<f64> {
    let ca = observed(feature, values)?;
    let fill = match strategy {
        ImputeStrategy::Mean => ca.mean(),
        ImputeStrategy::Median => ca.median(),
    };
    fill.ok_or_else(|| no_rows(feature))
}

fn observed(feature: &str, values: &[f64]) -> Result<Float64Chunked> {
    if values.is_empty() {
        return Err(no_rows(feature));
    }
    Ok(Float64Chunked::from_slice(feature.into(), values))
}

fn quantile(ca: &Float64Chunked, q: f64) -> Result<Option<f64>> {
    ca.quantile(q, QuantileMethod::Linear)
        .map_err(|e| PipelineError::Preprocessing(e.to_string()))
}

fn no_rows(feature: &str) -> PipelineError {
    PipelineError::Preprocessing(format!("feature '{}' has no usable rows in the training split", feature))
}
