//! Pipeline configuration
//!
//! A run is described by one [`PipelineConfig`] loaded from YAML or JSON.
//! Every section has defaults except the required keys checked by
//! [`PipelineConfig::validate`]; unknown keys are ignored.

use crate::data::{DataIngestor, DataSource, TargetParser};
use crate::error::{PipelineError, Result};
use crate::evaluation::{EvaluationConfig, SelectionPolicy};
use crate::preprocessing::PreprocessingConfig;
use crate::training::{BackendConfig, TrainingConfig};
use crate::validation::{FeatureSchema, FeatureSpec, ValidationPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Raw data location and target definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: Option<PathBuf>,
    pub target: String,
    /// Raw target value treated as the positive class
    pub positive_label: Option<String>,
    /// Identifier columns removed at ingestion
    pub drop_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Train fraction
    pub ratio: f64,
    /// Stratification column; the target when unset
    pub stratify_on: Option<String>,
    pub seed: u64,
    /// Allowed class-ratio deviation between a split and the source
    pub tolerance: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            stratify_on: None,
            seed: 42,
            tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub features: Vec<FeatureSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub output_dir: Option<PathBuf>,
    /// Nest every run under `runs/<run_id>` instead of overwriting
    pub versioned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// JSON-lines file; defaults to `<output_dir>/tracking.jsonl`
    pub path: Option<PathBuf>,
}

/// Complete description of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub schema: SchemaConfig,
    pub validation: ValidationPolicy,
    pub preprocessing: PreprocessingConfig,
    /// Candidate backends; declaration order is the final selection tie-break
    pub backends: Vec<BackendConfig>,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub selection: SelectionPolicy,
    pub artifacts: ArtifactsConfig,
    pub tracking: TrackingConfig,
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::Config(format!("{} must be in [0, 1], got {}", name, value)));
    }
    Ok(())
}

impl PipelineConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read configuration {}: {}", path.display(), e))
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(PipelineError::Config(format!(
                "unsupported configuration format '{}' (expected yaml, yml or json)",
                other
            ))),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::Config(format!("invalid YAML configuration: {}", e)))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PipelineError::Config(format!("invalid JSON configuration: {}", e)))
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data.path = Some(path.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts.output_dir = Some(dir.into());
        self
    }

    /// Fail fast on missing required keys and invalid values
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.data.path.is_none() {
            missing.push("data.path");
        }
        if self.data.target.trim().is_empty() {
            missing.push("data.target");
        }
        if self.schema.features.is_empty() {
            missing.push("schema.features");
        }
        if self.backends.is_empty() {
            missing.push("backends");
        }
        if self.artifacts.output_dir.is_none() {
            missing.push("artifacts.output_dir");
        }
        if !missing.is_empty() {
            return Err(PipelineError::Config(format!("missing required key(s): {}", missing.join(", "))));
        }

        if !(self.split.ratio > 0.0 && self.split.ratio < 1.0) {
            return Err(PipelineError::Config(format!(
                "split.ratio must be in (0, 1), got {}",
                self.split.ratio
            )));
        }
        unit_interval("split.tolerance", self.split.tolerance)?;
        unit_interval("evaluation.decision_threshold", self.evaluation.decision_threshold)?;
        unit_interval("validation.max_null_rate", self.validation.max_null_rate)?;
        unit_interval("validation.min_positive_rate", self.validation.min_positive_rate)?;
        unit_interval("validation.max_positive_rate", self.validation.max_positive_rate)?;
        if self.validation.min_positive_rate > self.validation.max_positive_rate {
            return Err(PipelineError::Config(format!(
                "validation.min_positive_rate {} exceeds max_positive_rate {}",
                self.validation.min_positive_rate, self.validation.max_positive_rate
            )));
        }
        for (metric, minimum) in &self.selection.thresholds {
            unit_interval(&format!("selection.thresholds.{}", metric), *minimum)?;
        }

        let mut names = HashSet::new();
        for backend in &self.backends {
            if !names.insert(backend.name()) {
                return Err(PipelineError::Config(format!("backend '{}' declared twice", backend.name())));
            }
        }

        if self.schema.features.iter().any(|f| f.name == self.data.target) {
            return Err(PipelineError::Config(format!(
                "target '{}' is also declared as a feature",
                self.data.target
            )));
        }
        if self.data.drop_columns.contains(&self.data.target) {
            return Err(PipelineError::Config(format!(
                "target '{}' is listed in data.drop_columns",
                self.data.target
            )));
        }
        if self.training.max_workers == Some(0) {
            return Err(PipelineError::Config("training.max_workers must be at least 1".to_string()));
        }

        // duplicate features and inverted ranges
        self.feature_schema().map(|_| ())
    }

    pub fn feature_schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::new(self.schema.features.clone())
    }

    pub fn data_source(&self) -> Result<DataSource> {
        self.data
            .path
            .clone()
            .map(DataSource::Path)
            .ok_or_else(|| PipelineError::Config("missing required key: data.path".to_string()))
    }

    pub fn output_dir(&self) -> Result<&Path> {
        self.artifacts
            .output_dir
            .as_deref()
            .ok_or_else(|| PipelineError::Config("missing required key: artifacts.output_dir".to_string()))
    }

    pub fn tracking_path(&self) -> Result<PathBuf> {
        match &self.tracking.path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.output_dir()?.join("tracking.jsonl")),
        }
    }

    pub fn stratify_on(&self) -> Option<&str> {
        self.split.stratify_on.as_deref()
    }

    pub fn ingestor(&self) -> DataIngestor {
        let parser = TargetParser {
            positive_label: self.data.positive_label.clone(),
        };
        DataIngestor::new(self.data.target.clone())
            .with_drop_columns(self.data.drop_columns.clone())
            .with_target_parser(parser)
            .with_seed(self.split.seed)
            .with_tolerance(self.split.tolerance)
    }
}
