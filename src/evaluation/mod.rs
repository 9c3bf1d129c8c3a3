//! Held-out evaluation and selection policy
//!
//! [`Evaluator`] scores each trained candidate on the test split and
//! [`Selector`] ranks the candidates under a [`SelectionPolicy`].

mod metrics;
mod selector;

pub use metrics::{roc_auc, ConfusionMatrix, EvaluationMetrics, Evaluator, MetricName};
pub use selector::{Candidate, RankedCandidate, SelectionPolicy, SelectionResult, Selector};

use serde::{Deserialize, Serialize};

/// Evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Probability at or above which a row is predicted positive
    pub decision_threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { decision_threshold: 0.5 }
    }
}
