//! Pluggable model backends

use super::lightgbm::{LightGBMClassifier, LightGBMConfig};
use super::linear_models::{LogisticRegression, LogisticRegressionConfig};
use super::random_forest::{RandomForest, RandomForestConfig};
use super::xgboost::{XGBoostClassifier, XGBoostConfig};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Capability every candidate backend implements.
///
/// Implementations must not mutate shared state: the trainer calls `fit`
/// concurrently for all backends against the same read-only matrix.
pub trait ModelBackend: Send + Sync {
    /// Stable backend identifier, used in artifact paths and reports
    fn name(&self) -> &str;

    /// Hyperparameter configuration reported to the tracker
    fn hyperparameters(&self) -> serde_json::Value;

    /// Fit on a preprocessed training matrix with 0/1 labels
    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedModel>;
}

/// Fitted state of one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum FittedModel {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostClassifier),
    #[serde(rename = "lightgbm")]
    LightGBM(LightGBMClassifier),
}

impl FittedModel {
    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            FittedModel::LogisticRegression(m) => m.predict_proba(x),
            FittedModel::RandomForest(m) => m.predict_proba(x),
            FittedModel::XGBoost(m) => m.predict_proba(x),
            FittedModel::LightGBM(m) => m.predict_proba(x),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            FittedModel::LogisticRegression(_) => "logistic_regression",
            FittedModel::RandomForest(_) => "random_forest",
            FittedModel::XGBoost(_) => "xgboost",
            FittedModel::LightGBM(_) => "lightgbm",
        }
    }
}

/// A successfully trained candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub backend: String,
    /// Position of the backend in the configuration
    pub declaration_index: usize,
    pub hyperparameters: serde_json::Value,
    pub model: FittedModel,
    pub n_features: usize,
    pub training_secs: f64,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(PipelineError::Data(format!(
                "model '{}' expects {} features, got {}",
                self.backend,
                self.n_features,
                x.ncols()
            )));
        }
        self.model.predict_proba(x)
    }
}

/// Backend entry of the configuration, tagged by `backend`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    LogisticRegression(LogisticRegressionConfig),
    RandomForest(RandomForestConfig),
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostConfig),
    #[serde(rename = "lightgbm")]
    LightGBM(LightGBMConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::LogisticRegression(_) => "logistic_regression",
            BackendConfig::RandomForest(_) => "random_forest",
            BackendConfig::XGBoost(_) => "xgboost",
            BackendConfig::LightGBM(_) => "lightgbm",
        }
    }

    /// Instantiate the backend described by this entry
    pub fn build(&self) -> Arc<dyn ModelBackend> {
        match self {
            BackendConfig::LogisticRegression(c) => Arc::new(c.clone()),
            BackendConfig::RandomForest(c) => Arc::new(c.clone()),
            BackendConfig::XGBoost(c) => Arc::new(c.clone()),
            BackendConfig::LightGBM(c) => Arc::new(c.clone()),
        }
    }

    /// All four backends with default hyperparameters, in canonical order
    pub fn defaults() -> Vec<BackendConfig> {
        vec![
            BackendConfig::LogisticRegression(LogisticRegressionConfig::default()),
            BackendConfig::RandomForest(RandomForestConfig::default()),
            BackendConfig::XGBoost(XGBoostConfig::default()),
            BackendConfig::LightGBM(LightGBMConfig::default()),
        ]
    }
}

/// Reject inputs no binary classifier can learn from
pub(crate) fn check_binary_inputs(backend: &str, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(PipelineError::backend(backend, "training set is empty"));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::backend(
            backend,
            format!("x has {} rows but y has {} labels", x.nrows(), y.len()),
        ));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::backend(backend, "feature matrix contains non-finite values"));
    }
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(PipelineError::backend(backend, "labels must be 0 or 1"));
    }
    let positives = y.iter().filter(|&&v| v == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(PipelineError::backend(backend, "training labels contain a single class"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_backend_config_yaml() {
        let yaml = r#"
- backend: logistic_regression
  class_weight: balanced
- backend: random_forest
  n_estimators: 10
  max_features: sqrt
- backend: xgboost
  scale_pos_weight: 3.0
  unknown_key: ignored
- backend: lightgbm
"#;
        let configs: Vec<BackendConfig> = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = configs.iter().map(BackendConfig::name).collect();
        assert_eq!(names, vec!["logistic_regression", "random_forest", "xgboost", "lightgbm"]);
        match &configs[2] {
            BackendConfig::XGBoost(c) => assert_eq!(c.scale_pos_weight, 3.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_names_match() {
        for config in BackendConfig::defaults() {
            assert_eq!(config.build().name(), config.name());
        }
    }

    #[test]
    fn test_check_binary_inputs() {
        let x = array![[0.0], [1.0]];
        assert!(check_binary_inputs("b", &x, &array![0.0, 1.0]).is_ok());
        assert!(check_binary_inputs("b", &x, &array![1.0, 1.0]).is_err());
        assert!(check_binary_inputs("b", &x, &array![0.0, 2.0]).is_err());
        assert!(check_binary_inputs("b", &array![[f64::NAN], [1.0]], &array![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_fitted_model_json_roundtrip() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let fitted = LogisticRegressionConfig::default().fit(&x, &y).unwrap();
        let json = serde_json::to_string(&fitted).unwrap();
        let restored: FittedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.algorithm(), "logistic_regression");
        assert_eq!(restored.predict_proba(&x).unwrap(), fitted.predict_proba(&x).unwrap());
    }
}
