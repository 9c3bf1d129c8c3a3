//! Held-out classification metrics

use crate::error::{PipelineError, Result};
use crate::preprocessing::FeatureMatrix;
use crate::training::TrainedModel;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Metric identifiers usable in a selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Accuracy,
    Precision,
    Recall,
    F1,
    #[serde(alias = "auc", alias = "auc_roc")]
    RocAuc,
    Specificity,
    Sensitivity,
}

impl MetricName {
    pub const ALL: [MetricName; 7] = [
        MetricName::Accuracy,
        MetricName::Precision,
        MetricName::Recall,
        MetricName::F1,
        MetricName::RocAuc,
        MetricName::Specificity,
        MetricName::Sensitivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Accuracy => "accuracy",
            MetricName::Precision => "precision",
            MetricName::Recall => "recall",
            MetricName::F1 => "f1",
            MetricName::RocAuc => "roc_auc",
            MetricName::Specificity => "specificity",
            MetricName::Sensitivity => "sensitivity",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        MetricName::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .or(match key.as_str() {
                "auc" | "auc_roc" => Some(MetricName::RocAuc),
                _ => None,
            })
            .ok_or_else(|| PipelineError::Config(format!("unknown metric '{}'", s)))
    }
}

/// Confusion-matrix counts at the decision threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<f64>, proba: &Array1<f64>, threshold: f64) -> Self {
        let mut cm = Self::default();
        for (t, p) in y_true.iter().zip(proba.iter()) {
            match (*t > 0.5, *p >= threshold) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fixed metric record for one model on the held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub specificity: f64,
    pub sensitivity: f64,
    pub confusion: ConfusionMatrix,
    pub threshold: f64,
    pub n_samples: usize,
}

impl EvaluationMetrics {
    /// Compute every metric from true labels and positive-class probabilities
    pub fn compute(y_true: &Array1<f64>, proba: &Array1<f64>, threshold: f64) -> Result<Self> {
        if y_true.len() != proba.len() {
            return Err(PipelineError::Data(format!(
                "{} labels but {} predictions",
                y_true.len(),
                proba.len()
            )));
        }

        let confusion = ConfusionMatrix::from_predictions(y_true, proba, threshold);
        let ConfusionMatrix { tp, fp, tn, fn_ } = confusion;

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            accuracy: ratio(tp + tn, confusion.total()),
            precision,
            recall,
            f1,
            roc_auc: roc_auc(y_true, proba),
            specificity: ratio(tn, tn + fp),
            sensitivity: recall,
            confusion,
            threshold,
            n_samples: y_true.len(),
        })
    }

    pub fn get(&self, metric: MetricName) -> f64 {
        match metric {
            MetricName::Accuracy => self.accuracy,
            MetricName::Precision => self.precision,
            MetricName::Recall => self.recall,
            MetricName::F1 => self.f1,
            MetricName::RocAuc => self.roc_auc,
            MetricName::Specificity => self.specificity,
            MetricName::Sensitivity => self.sensitivity,
        }
    }
}

/// Area under the ROC curve by the rank-sum statistic.
///
/// Tied scores share their average rank. A label vector with a single class
/// yields 0.5.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based: the tie group spans start+1 ..= end
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        pos_rank_sum += avg_rank * order[start..end].iter().filter(|&&i| y_true[i] > 0.5).count() as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

/// Scores trained models on the held-out split
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Evaluator {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::Config(format!(
                "decision threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, model: &TrainedModel, test: &FeatureMatrix) -> Result<EvaluationMetrics> {
        let proba = model.predict_proba(&test.x)?;
        let metrics = EvaluationMetrics::compute(&test.y, &proba, self.threshold)?;
        debug!(
            backend = %model.backend,
            roc_auc = metrics.roc_auc,
            f1 = metrics.f1,
            recall = metrics.recall,
            precision = metrics.precision,
            "Evaluated candidate"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let proba = array![0.9, 0.2, 0.8, 0.4, 0.1, 0.7, 0.6, 0.3];

        let m = EvaluationMetrics::compute(&y_true, &proba, 0.5).unwrap();
        assert_eq!(m.confusion, ConfusionMatrix { tp: 3, fp: 1, tn: 3, fn_: 1 });
        assert_eq!(m.accuracy, 0.75);
        assert_eq!(m.precision, 0.75);
        assert_eq!(m.recall, 0.75);
        assert_eq!(m.specificity, 0.75);
        assert_eq!(m.sensitivity, m.recall);
        assert!((m.f1 - 0.75).abs() < 1e-12);
        // one discordant pair (0.4 vs 0.6) out of 16
        assert!((m.roc_auc - 15.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_changes_confusion() {
        let y_true = array![1.0, 0.0];
        let proba = array![0.4, 0.3];
        assert_eq!(EvaluationMetrics::compute(&y_true, &proba, 0.5).unwrap().recall, 0.0);
        assert_eq!(EvaluationMetrics::compute(&y_true, &proba, 0.35).unwrap().recall, 1.0);
    }

    #[test]
    fn test_auc_ties_and_single_class() {
        assert_eq!(roc_auc(&array![1.0, 0.0], &array![0.5, 0.5]), 0.5);
        assert_eq!(roc_auc(&array![1.0, 1.0], &array![0.2, 0.9]), 0.5);
        assert_eq!(roc_auc(&array![0.0, 1.0], &array![0.1, 0.9]), 1.0);
        assert_eq!(roc_auc(&array![1.0, 0.0], &array![0.1, 0.9]), 0.0);
    }

    #[test]
    fn test_zero_denominators() {
        let m = EvaluationMetrics::compute(&array![0.0, 0.0], &array![0.1, 0.2], 0.5).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.specificity, 1.0);
        assert_eq!(m.roc_auc, 0.5);
    }

    #[test]
    fn test_metric_name_parse() {
        assert_eq!("ROC_AUC".parse::<MetricName>().unwrap(), MetricName::RocAuc);
        assert_eq!("auc".parse::<MetricName>().unwrap(), MetricName::RocAuc);
        assert_eq!("f1".parse::<MetricName>().unwrap(), MetricName::F1);
        assert!("logloss".parse::<MetricName>().is_err());
    }
}
