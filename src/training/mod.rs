//! Model training module
//!
//! Provides the pluggable backend contract and four binary classifiers:
//! - Logistic regression (L2 gradient descent, optional balanced weights)
//! - Random forest
//! - XGBoost-style second-order boosting
//! - LightGBM-style leaf-wise boosting with GOSS
//!
//! [`ModelTrainer`] fans training out over a bounded rayon pool and isolates
//! per-backend failures.

mod backend;
mod trainer;
pub mod decision_tree;
pub mod lightgbm;
pub mod linear_models;
pub mod random_forest;
pub mod xgboost;

pub use backend::{BackendConfig, FittedModel, ModelBackend, TrainedModel};
pub use decision_tree::{DecisionTree, TreeNode};
pub use lightgbm::{LightGBMClassifier, LightGBMConfig};
pub use linear_models::{ClassWeight, LogisticRegression, LogisticRegressionConfig};
pub use random_forest::{MaxFeatures, RandomForest, RandomForestConfig};
pub use trainer::{BackendFailure, ModelTrainer, TrainingOutcome};
pub use xgboost::{XGBoostClassifier, XGBoostConfig};

use serde::{Deserialize, Serialize};

/// Seed used by the randomized backends when `random_state` is unset
pub const DEFAULT_SEED: u64 = 42;

/// Trainer settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Upper bound on concurrently training backends; `None` uses available cores
    pub max_workers: Option<usize>,
}
