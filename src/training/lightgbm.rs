//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! Key differences from standard/XGBoost-style gradient boosting:
//! - Leaf-wise (best-first) tree growth instead of level-wise
//! - Gradient-based One-Side Sampling (GOSS): keeps top gradients, samples low
//!   gradients and amplifies them by `(1 - top_rate) / other_rate`

use super::backend::{check_binary_inputs, FittedModel, ModelBackend};
use super::decision_tree::pick_best;
use super::DEFAULT_SEED;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGBMConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    /// GOSS: fraction of rows with the largest gradients always kept
    pub top_rate: f64,
    /// GOSS: fraction of rows sampled from the rest
    pub other_rate: f64,
    /// Weight applied to positive-class gradients and hessians
    pub scale_pos_weight: f64,
    pub random_state: Option<u64>,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            top_rate: 0.2,
            other_rate: 0.1,
            scale_pos_weight: 1.0,
            random_state: Some(DEFAULT_SEED),
        }
    }
}

impl ModelBackend for LightGBMConfig {
    fn name(&self) -> &str {
        "lightgbm"
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedModel> {
        let mut model = LightGBMClassifier::new(self.clone());
        model.fit(x, y)?;
        Ok(FittedModel::LightGBM(model))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum GrownNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<GrownNode>,
        right: Box<GrownNode>,
    },
}

impl GrownNode {
    fn score(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                GrownNode::Leaf(value) => return *value,
                GrownNode::Split { feature, threshold, left, right } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Weighted logistic-loss derivatives for one boosting round
struct Gradients {
    g: Vec<f64>,
    h: Vec<f64>,
}

impl Gradients {
    fn logistic(margin: &Array1<f64>, y: &Array1<f64>, weights: &[f64]) -> Self {
        let (g, h) = margin
            .iter()
            .zip(y.iter())
            .zip(weights)
            .map(|((&m, &label), &w)| {
                let p = sigmoid(m);
                (w * (p - label), w * (p * (1.0 - p)).max(1e-16))
            })
            .unzip();
        Self { g, h }
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &i| (g + self.g[i], h + self.h[i]))
    }

    fn amplify(&mut self, rows: &[usize], factor: f64) {
        for &i in rows {
            self.g[i] *= factor;
            self.h[i] *= factor;
        }
    }
}

fn regularized_weight(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let shrunk = if g.abs() <= alpha { 0.0 } else { g - alpha * g.signum() };
    let denom = h + lambda;
    if denom <= 0.0 {
        0.0
    } else {
        -shrunk / denom
    }
}

fn structure_score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 {
        0.0
    } else {
        g * g / denom
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Expandable leaf waiting in the best-first queue
struct Frontier {
    node: usize,
    split: Split,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // highest gain first; equal gains pop the older node first
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .total_cmp(&other.split.gain)
            .then_with(|| other.node.cmp(&self.node))
    }
}

enum Slot {
    Leaf(Vec<usize>),
    Internal { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Best-first tree growth bounded by `max_leaves` and `max_depth`
struct LeafWiseGrower<'a> {
    x: &'a Array2<f64>,
    grads: &'a Gradients,
    features: Vec<usize>,
    config: &'a LightGBMConfig,
    min_child: usize,
}

impl LeafWiseGrower<'_> {
    fn grow(&self, rows: &[usize]) -> GrownNode {
        if rows.len() < self.min_child * 2 {
            return self.leaf(rows);
        }
        let depth_limit = self.config.max_depth.unwrap_or(usize::MAX);

        let mut slots = vec![Slot::Leaf(rows.to_vec())];
        let mut depths = vec![0usize];
        let mut queue = BinaryHeap::new();
        if let Some(split) = self.best_split(rows) {
            queue.push(Frontier { node: 0, split });
        }

        let mut leaves = 1;
        while leaves < self.config.max_leaves {
            let Some(Frontier { node, split }) = queue.pop() else {
                break;
            };
            let depth = depths[node];
            if depth >= depth_limit {
                continue;
            }

            let (left, right) = (slots.len(), slots.len() + 1);
            slots[node] = Slot::Internal {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            leaves += 1;

            for (child, child_rows) in [(left, &split.left), (right, &split.right)] {
                if depth + 1 < depth_limit && child_rows.len() >= self.min_child * 2 {
                    if let Some(next) = self.best_split(child_rows) {
                        queue.push(Frontier { node: child, split: next });
                    }
                }
            }
            slots.push(Slot::Leaf(split.left));
            slots.push(Slot::Leaf(split.right));
            depths.extend([depth + 1, depth + 1]);
        }

        self.assemble(&slots, 0)
    }

    fn assemble(&self, slots: &[Slot], idx: usize) -> GrownNode {
        match &slots[idx] {
            Slot::Leaf(rows) => self.leaf(rows),
            Slot::Internal { feature, threshold, left, right } => GrownNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: Box::new(self.assemble(slots, *left)),
                right: Box::new(self.assemble(slots, *right)),
            },
        }
    }

    fn leaf(&self, rows: &[usize]) -> GrownNode {
        let (g, h) = self.grads.sums(rows);
        GrownNode::Leaf(regularized_weight(g, h, self.config.reg_lambda, self.config.reg_alpha))
    }

    fn best_split(&self, rows: &[usize]) -> Option<Split> {
        let candidates: Vec<Split> = self
            .features
            .par_iter()
            .filter_map(|&feature| self.scan_feature(rows, feature))
            .collect();
        pick_best(candidates, |c| c.gain)
    }

    fn scan_feature(&self, rows: &[usize], feature: usize) -> Option<Split> {
        let column = self.x.column(feature);
        let mut order = rows.to_vec();
        order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

        let lambda = self.config.reg_lambda;
        let (g_total, h_total) = self.grads.sums(rows);
        let parent = structure_score(g_total, h_total, lambda);

        let (mut g_left, mut h_left) = (0.0, 0.0);
        let mut best: Option<(usize, f64, f64)> = None;
        for pos in 1..order.len() {
            let prev = order[pos - 1];
            g_left += self.grads.g[prev];
            h_left += self.grads.h[prev];

            if pos < self.min_child || order.len() - pos < self.min_child {
                continue;
            }
            let (lo, hi) = (column[prev], column[order[pos]]);
            if lo == hi {
                continue;
            }
            let gain = structure_score(g_left, h_left, lambda)
                + structure_score(g_total - g_left, h_total - h_left, lambda)
                - parent;
            if gain > best.map_or(0.0, |b| b.2) {
                best = Some((pos, (lo + hi) / 2.0, gain));
            }
        }

        let (pos, threshold, gain) = best?;
        let right = order.split_off(pos);
        Some(Split {
            feature,
            threshold,
            gain,
            left: order,
            right,
        })
    }
}

/// Rows chosen by gradient-based one-side sampling
struct GossSample {
    rows: Vec<usize>,
    /// The first `n_top` rows are the large-gradient rows, kept unweighted
    n_top: usize,
    /// Factor `(1 - top_rate) / other_rate` for the sampled small-gradient rows
    amplification: f64,
}

fn goss(gradients: &[f64], top_rate: f64, other_rate: f64, rng: &mut Xoshiro256PlusPlus) -> GossSample {
    let n = gradients.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = ((n as f64 * other_rate).ceil() as usize).min(n - n_top);

    let mut by_magnitude: Vec<usize> = (0..n).collect();
    by_magnitude.sort_by(|&a, &b| gradients[b].abs().total_cmp(&gradients[a].abs()).then(a.cmp(&b)));
    let mut rest = by_magnitude.split_off(n_top);
    rest.shuffle(rng);
    by_magnitude.extend_from_slice(&rest[..n_other]);

    GossSample {
        rows: by_magnitude,
        n_top,
        amplification: if other_rate > 0.0 { (1.0 - top_rate) / other_rate } else { 1.0 },
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Leaf-wise boosted classifier over the logistic loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMClassifier {
    pub config: LightGBMConfig,
    trees: Vec<GrownNode>,
    base_prediction: f64,
    n_features: usize,
}

impl LightGBMClassifier {
    pub fn new(config: LightGBMConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_binary_inputs("lightgbm", x, y)?;
        if self.config.scale_pos_weight <= 0.0 {
            return Err(PipelineError::backend("lightgbm", "scale_pos_weight must be positive"));
        }
        let (n_rows, n_features) = x.dim();
        let config = &self.config;

        let prior = y.mean().unwrap_or(0.5).clamp(1e-7, 1.0 - 1e-7);
        let base_prediction = (prior / (1.0 - prior)).ln();
        let weights: Vec<f64> = y.iter().map(|&v| if v > 0.5 { config.scale_pos_weight } else { 1.0 }).collect();
        let use_goss = config.top_rate + config.other_rate < 1.0;
        let n_cols = ((n_features as f64 * config.colsample_bytree).ceil() as usize).clamp(1, n_features.max(1));

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.random_state.unwrap_or(DEFAULT_SEED));
        let mut margin = Array1::from_elem(n_rows, base_prediction);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let mut grads = Gradients::logistic(&margin, y, &weights);

            let rows = if use_goss {
                let sample = goss(&grads.g, config.top_rate, config.other_rate, &mut rng);
                grads.amplify(&sample.rows[sample.n_top..], sample.amplification);
                sample.rows
            } else if config.subsample < 1.0 {
                let k = ((n_rows as f64 * config.subsample).ceil() as usize).clamp(1, n_rows);
                rand::seq::index::sample(&mut rng, n_rows, k).into_vec()
            } else {
                (0..n_rows).collect()
            };

            let mut features = rand::seq::index::sample(&mut rng, n_features, n_cols.min(n_features)).into_vec();
            features.sort_unstable();

            let tree = LeafWiseGrower {
                x,
                grads: &grads,
                features,
                config,
                min_child: config.min_child_samples.max(1),
            }
            .grow(&rows);

            for (m, row) in margin.iter_mut().zip(x.rows()) {
                *m += config.learning_rate * tree.score(row);
            }
            trees.push(tree);
        }

        self.base_prediction = base_prediction;
        self.trees = trees;
        self.n_features = n_features;
        Ok(())
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(PipelineError::ModelNotFitted);
        }
        let eta = self.config.learning_rate;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| sigmoid(self.trees.iter().fold(self.base_prediction, |m, t| m + eta * t.score(row))))
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| (i as f64) / 100.0).collect()).unwrap();
        let y = Array1::from_vec((0..100).map(|i| if i < 50 { 0.0 } else { 1.0 }).collect());
        (x, y)
    }

    #[test]
    fn test_lightgbm_classifier() {
        let (x, y) = make_classification_data();
        let config = LightGBMConfig { n_estimators: 30, max_leaves: 8, min_child_samples: 2, ..Default::default() };
        let mut model = LightGBMClassifier::new(config);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        let acc = proba
            .iter()
            .zip(y.iter())
            .filter(|(&p, &t)| (if p >= 0.5 { 1.0 } else { 0.0 }) == t)
            .count() as f64
            / 100.0;
        assert!(acc > 0.7, "Accuracy too low: {}", acc);
    }

    #[test]
    fn test_lightgbm_predict_proba_bounds() {
        let (x, y) = make_classification_data();
        let config = LightGBMConfig { n_estimators: 10, max_leaves: 8, min_child_samples: 2, ..Default::default() };
        let mut model = LightGBMClassifier::new(config);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 100);
        assert!(proba.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_base_prediction_finite_for_rare_positives() {
        let x = Array2::from_shape_vec((50, 1), (0..50).map(f64::from).collect()).unwrap();
        let y = Array1::from_vec((0..50).map(|i| if i == 49 { 1.0 } else { 0.0 }).collect());
        let mut model = LightGBMClassifier::new(LightGBMConfig { n_estimators: 3, min_child_samples: 1, ..Default::default() });
        model.fit(&x, &y).unwrap();
        assert!(model.base_prediction.is_finite());
    }

    #[test]
    fn test_goss_amplification() {
        let gradients = vec![0.9, -0.1, 0.05, -0.8, 0.02, 0.01, 0.3, -0.2, 0.04, 0.03];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let sample = goss(&gradients, 0.2, 0.2, &mut rng);
        assert_eq!(sample.n_top, 2);
        assert_eq!(&sample.rows[..2], &[0, 3]);
        assert_eq!(sample.rows.len(), 4);
        assert!((sample.amplification - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_rejected() {
        let (x, _) = make_classification_data();
        let y = Array1::zeros(100);
        let err = LightGBMClassifier::new(LightGBMConfig::default()).fit(&x, &y).unwrap_err();
        assert!(matches!(err, PipelineError::BackendTraining { .. }));
    }
}
