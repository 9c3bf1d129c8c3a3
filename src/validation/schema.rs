//! Declared feature schema

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declared type of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Numeric,
    Categorical,
}

/// Declaration for one feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    /// Inclusive lower bound for numeric values
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric values
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed categories; `None` accepts any category
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// A non-nullable column tolerates no missing values
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Per-column override of the validator's default null-rate threshold
    #[serde(default)]
    pub max_null_rate: Option<f64>,
}

fn default_nullable() -> bool {
    true
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feature_type: FeatureType::Numeric,
            min: None,
            max: None,
            categories: None,
            nullable: true,
            max_null_rate: None,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            feature_type: FeatureType::Categorical,
            ..Self::numeric(name)
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_null_rate(mut self, rate: f64) -> Self {
        self.max_null_rate = Some(rate);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Effective null-rate threshold given the validator default
    pub fn null_rate_threshold(&self, default: f64) -> f64 {
        if !self.nullable {
            0.0
        } else {
            self.max_null_rate.unwrap_or(default)
        }
    }
}

/// Immutable set of feature declarations, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Build a schema, rejecting duplicate names and inverted ranges
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self> {
        if features.is_empty() {
            return Err(PipelineError::Config("schema declares no features".to_string()));
        }
        let mut seen = HashSet::new();
        for spec in &features {
            if !seen.insert(spec.name.as_str()) {
                return Err(PipelineError::Config(format!("feature '{}' declared twice", spec.name)));
            }
            if let (Some(min), Some(max)) = (spec.min, spec.max) {
                if min > max {
                    return Err(PipelineError::Config(format!(
                        "feature '{}' has min {} greater than max {}",
                        spec.name, min, max
                    )));
                }
            }
            if let Some(rate) = spec.max_null_rate {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(PipelineError::Config(format!(
                        "feature '{}' has max_null_rate {} outside [0, 1]",
                        spec.name, rate
                    )));
                }
            }
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn numeric_features(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter().filter(|f| f.feature_type == FeatureType::Numeric)
    }

    pub fn categorical_features(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter().filter(|f| f.feature_type == FeatureType::Categorical)
    }
}
