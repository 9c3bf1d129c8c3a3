//! Decision tree implementation (binary classification, Gini impurity)

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the fraction of positive samples
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<'_, f64>) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Best-scoring candidate; ties keep the earliest candidate so results do not
/// depend on scheduling.
pub(crate) fn pick_best<T>(candidates: Vec<T>, gain: impl Fn(&T) -> f64) -> Option<T> {
    let mut best: Option<T> = None;
    for candidate in candidates {
        let better = match &best {
            None => true,
            Some(current) => gain(&candidate) > gain(current),
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Decision tree classifier producing positive-class probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered at each split, drawn at random; `None` uses all
    pub max_features: Option<usize>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Fit the tree; `rng` drives per-split feature sampling
    pub fn fit<R: Rng>(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut R) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::Data(format!(
                "x has {} rows but y has {} labels",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(PipelineError::Training("cannot fit a tree on zero samples".to_string()));
        }

        self.n_features = n_features;
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|imp| *imp /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut R,
    ) -> TreeNode {
        let n_samples = indices.len();
        let positives = indices.iter().filter(|&&i| y[i] > 0.5).count();
        let value = positives as f64 / n_samples.max(1) as f64;

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || positives == 0
            || positives == n_samples;

        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        let features = self.sample_features(rng);
        let parent_impurity = gini(positives, n_samples);

        let Some((feature_idx, threshold, gain)) = self.find_best_split(x, y, indices, &features, parent_impurity) else {
            return TreeNode::Leaf { value, n_samples };
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature_idx]] <= threshold);

        if left_indices.len() < self.min_samples_leaf || right_indices.len() < self.min_samples_leaf {
            return TreeNode::Leaf { value, n_samples };
        }

        importances[feature_idx] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    fn sample_features<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        let k = self.max_features.unwrap_or(self.n_features).clamp(1, self.n_features.max(1));
        if k >= self.n_features {
            return (0..self.n_features).collect();
        }
        let mut features = index::sample(rng, self.n_features, k).into_vec();
        features.sort_unstable();
        features
    }

    /// Scan each candidate feature in sorted order, accumulating class counts
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len();
        let total_pos = indices.iter().filter(|&&i| y[i] > 0.5).count();

        let per_feature: Vec<(usize, f64, f64)> = features
            .par_iter()
            .filter_map(|&feature_idx| {
                let mut sorted: Vec<(f64, bool)> = indices
                    .iter()
                    .map(|&i| (x[[i, feature_idx]], y[i] > 0.5))
                    .collect();
                sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<(f64, f64)> = None;
                let mut left_pos = 0usize;

                for pos in 0..n - 1 {
                    if sorted[pos].1 {
                        left_pos += 1;
                    }
                    if sorted[pos].0 == sorted[pos + 1].0 {
                        continue;
                    }
                    let left_n = pos + 1;
                    let right_n = n - left_n;
                    if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                        continue;
                    }
                    let weighted = (left_n as f64 * gini(left_pos, left_n)
                        + right_n as f64 * gini(total_pos - left_pos, right_n))
                        / n as f64;
                    let gain = parent_impurity - weighted;
                    if gain > best.map_or(0.0, |b| b.1) {
                        best = Some(((sorted[pos].0 + sorted[pos + 1].0) / 2.0, gain));
                    }
                }

                best.map(|(threshold, gain)| (feature_idx, threshold, gain))
            })
            .collect();

        pick_best(per_feature, |c| c.2)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(x.rows().into_iter().map(|row| root.predict(row)).collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}
