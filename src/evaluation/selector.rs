//! Candidate ranking and model selection

use super::metrics::{EvaluationMetrics, MetricName};
use crate::error::{PipelineError, Result};
use crate::training::TrainedModel;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// How candidates are ranked and which minimums they must meet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    pub primary: MetricName,
    pub secondary: MetricName,
    /// Minimum value per metric; every entry must hold for a candidate to comply
    pub thresholds: BTreeMap<MetricName, f64>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            primary: MetricName::RocAuc,
            secondary: MetricName::F1,
            thresholds: BTreeMap::new(),
        }
    }
}

impl SelectionPolicy {
    pub fn with_primary(mut self, metric: MetricName) -> Self {
        self.primary = metric;
        self
    }

    pub fn with_secondary(mut self, metric: MetricName) -> Self {
        self.secondary = metric;
        self
    }

    pub fn with_threshold(mut self, metric: MetricName, minimum: f64) -> Self {
        self.thresholds.insert(metric, minimum);
        self
    }

    /// Thresholds the metrics fall short of, in metric order
    pub fn unmet(&self, metrics: &EvaluationMetrics) -> Vec<MetricName> {
        self.thresholds
            .iter()
            .filter(|(metric, minimum)| !(metrics.get(**metric) >= **minimum))
            .map(|(metric, _)| *metric)
            .collect()
    }
}

/// A trained model paired with its held-out metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub backend: String,
    pub declaration_index: usize,
    pub metrics: EvaluationMetrics,
}

impl Candidate {
    pub fn from_model(model: &TrainedModel, metrics: EvaluationMetrics) -> Self {
        Self {
            backend: model.backend.clone(),
            declaration_index: model.declaration_index,
            metrics,
        }
    }
}

/// One row of the audit ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// 1-based position
    pub rank: usize,
    pub backend: String,
    pub declaration_index: usize,
    pub metrics: EvaluationMetrics,
    pub meets_thresholds: bool,
    pub unmet_thresholds: Vec<MetricName>,
}

/// Final output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected_backend: String,
    pub selected_index: usize,
    pub metrics: EvaluationMetrics,
    pub policy: SelectionPolicy,
    /// No candidate met every threshold
    pub below_target: bool,
    pub ranking: Vec<RankedCandidate>,
}

impl SelectionResult {
    pub fn selected(&self) -> Option<&RankedCandidate> {
        self.ranking.first()
    }
}

/// Descending order with NaN last
fn desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Applies a [`SelectionPolicy`] to a candidate set
#[derive(Debug, Clone, Default)]
pub struct Selector {
    policy: SelectionPolicy,
}

impl Selector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Rank every candidate and pick the first.
    ///
    /// Compliant candidates rank ahead of non-compliant ones, then by primary
    /// metric, secondary metric and declaration order. When nobody complies the
    /// best-by-primary candidate is still selected and flagged `below_target`.
    pub fn select(&self, candidates: &[Candidate]) -> Result<SelectionResult> {
        if candidates.is_empty() {
            return Err(PipelineError::Training("no candidates to select from".to_string()));
        }

        let primary = self.policy.primary;
        let secondary = self.policy.secondary;

        let mut rows: Vec<(Vec<MetricName>, &Candidate)> =
            candidates.iter().map(|c| (self.policy.unmet(&c.metrics), c)).collect();

        rows.sort_by(|(unmet_a, a), (unmet_b, b)| {
            unmet_a
                .is_empty()
                .cmp(&unmet_b.is_empty())
                .reverse()
                .then_with(|| desc(a.metrics.get(primary), b.metrics.get(primary)))
                .then_with(|| desc(a.metrics.get(secondary), b.metrics.get(secondary)))
                .then_with(|| a.declaration_index.cmp(&b.declaration_index))
        });

        let ranking: Vec<RankedCandidate> = rows
            .into_iter()
            .enumerate()
            .map(|(i, (unmet, c))| RankedCandidate {
                rank: i + 1,
                backend: c.backend.clone(),
                declaration_index: c.declaration_index,
                metrics: c.metrics.clone(),
                meets_thresholds: unmet.is_empty(),
                unmet_thresholds: unmet,
            })
            .collect();

        let best = &ranking[0];
        let below_target = !best.meets_thresholds;
        if below_target {
            warn!(
                backend = %best.backend,
                unmet = ?best.unmet_thresholds,
                "No candidate meets every threshold; selecting best by {}",
                primary
            );
        } else {
            info!(backend = %best.backend, score = best.metrics.get(primary), metric = %primary, "Selected model");
        }

        Ok(SelectionResult {
            selected_backend: best.backend.clone(),
            selected_index: best.declaration_index,
            metrics: best.metrics.clone(),
            policy: self.policy.clone(),
            below_target,
            ranking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::metrics::ConfusionMatrix;

    fn metrics(roc_auc: f64, f1: f64, recall: f64) -> EvaluationMetrics {
        EvaluationMetrics {
            accuracy: 0.8,
            precision: 0.7,
            recall,
            f1,
            roc_auc,
            specificity: 0.8,
            sensitivity: recall,
            confusion: ConfusionMatrix::default(),
            threshold: 0.5,
            n_samples: 100,
        }
    }

    fn candidate(backend: &str, index: usize, m: EvaluationMetrics) -> Candidate {
        Candidate {
            backend: backend.to_string(),
            declaration_index: index,
            metrics: m,
        }
    }

    #[test]
    fn test_compliant_beats_higher_primary() {
        let policy = SelectionPolicy::default().with_threshold(MetricName::Recall, 0.8);
        let result = Selector::new(policy)
            .select(&[
                candidate("a", 0, metrics(0.95, 0.8, 0.6)),
                candidate("b", 1, metrics(0.85, 0.7, 0.9)),
            ])
            .unwrap();

        assert_eq!(result.selected_backend, "b");
        assert!(!result.below_target);
        assert_eq!(result.ranking[1].unmet_thresholds, vec![MetricName::Recall]);
    }

    #[test]
    fn test_below_target_still_selects() {
        let policy = SelectionPolicy::default().with_threshold(MetricName::RocAuc, 0.99);
        let result = Selector::new(policy)
            .select(&[
                candidate("a", 0, metrics(0.7, 0.8, 0.6)),
                candidate("b", 1, metrics(0.9, 0.7, 0.9)),
            ])
            .unwrap();

        assert_eq!(result.selected_backend, "b");
        assert!(result.below_target);
        assert_eq!(result.ranking.len(), 2);
    }

    #[test]
    fn test_tie_breaks() {
        let selector = Selector::default();
        let tied_primary = [
            candidate("a", 0, metrics(0.9, 0.6, 0.5)),
            candidate("b", 1, metrics(0.9, 0.7, 0.5)),
        ];
        assert_eq!(selector.select(&tied_primary).unwrap().selected_backend, "b");

        let identical = [
            candidate("late", 3, metrics(0.9, 0.7, 0.5)),
            candidate("early", 1, metrics(0.9, 0.7, 0.5)),
        ];
        let first = selector.select(&identical).unwrap();
        assert_eq!(first.selected_backend, "early");
        assert_eq!(first, selector.select(&identical).unwrap());
    }

    #[test]
    fn test_nan_sorts_last() {
        let result = Selector::default()
            .select(&[
                candidate("nan", 0, metrics(f64::NAN, 0.9, 0.9)),
                candidate("ok", 1, metrics(0.6, 0.5, 0.5)),
            ])
            .unwrap();
        assert_eq!(result.selected_backend, "ok");
    }

    #[test]
    fn test_empty_candidates() {
        assert!(matches!(Selector::default().select(&[]), Err(PipelineError::Training(_))));
    }

    #[test]
    fn test_policy_yaml() {
        let policy: SelectionPolicy = serde_yaml::from_str(
            "primary: f1\nthresholds:\n  recall: 0.8\n  auc: 0.85\n",
        )
        .unwrap();
        assert_eq!(policy.primary, MetricName::F1);
        assert_eq!(policy.secondary, MetricName::F1);
        assert_eq!(policy.thresholds.get(&MetricName::RocAuc), Some(&0.85));
    }
}
