//! Random Forest implementation

use super::backend::{check_binary_inputs, FittedModel, ModelBackend};
use super::decision_tree::DecisionTree;
use super::DEFAULT_SEED;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(12),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: Some(DEFAULT_SEED),
        }
    }
}

impl ModelBackend for RandomForestConfig {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedModel> {
        let mut model = RandomForest::new(self.clone());
        model.fit(x, y)?;
        Ok(FittedModel::RandomForest(model))
    }
}

/// Random Forest classifier; probability is the mean leaf positive fraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub config: RandomForestConfig,
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_binary_inputs("random_forest", x, y)?;
        if self.config.n_estimators == 0 {
            return Err(PipelineError::backend("random_forest", "n_estimators must be positive"));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;
        let max_features = self.config.max_features.resolve(n_features);
        let base_seed = self.config.random_state.unwrap_or(DEFAULT_SEED);
        let config = &self.config;

        // Build trees in parallel, one seeded stream per tree
        let trees = (0..config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample_indices: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_max_depth(config.max_depth)
                    .with_min_samples_split(config.min_samples_split)
                    .with_min_samples_leaf(config.min_samples_leaf)
                    .with_max_features(Some(max_features));
                tree.fit(&x_boot, &y_boot, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| PipelineError::backend("random_forest", e.to_string()))?;

        self.trees = trees;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for imp in self.trees.iter().filter_map(DecisionTree::feature_importances) {
            for (acc, &val) in total.iter_mut().zip(imp.iter()) {
                *acc += val;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array1::zeros(x.nrows());
        for p in &per_tree {
            proba += p;
        }
        Ok(proba / per_tree.len() as f64)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
