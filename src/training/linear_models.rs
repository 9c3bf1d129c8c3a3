//! Linear models for binary classification

use super::backend::{check_binary_inputs, FittedModel, ModelBackend};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Class weighting applied to the loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every sample counts equally
    #[default]
    Uniform,
    /// Weight each class by `n / (2 * n_class)`
    Balanced,
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    pub fit_intercept: bool,
    pub class_weight: ClassWeight,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            fit_intercept: true,
            class_weight: ClassWeight::Uniform,
        }
    }
}

impl ModelBackend for LogisticRegressionConfig {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedModel> {
        let mut model = LogisticRegression::new(self.clone());
        model.fit(x, y)?;
        Ok(FittedModel::LogisticRegression(model))
    }
}

/// Logistic Regression trained by full-batch gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub config: LogisticRegressionConfig,
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Iterations run by the last fit
    pub n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(LogisticRegressionConfig::default())
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self {
            config,
            coefficients: None,
            intercept: None,
            n_iter: 0,
        }
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.config.class_weight = class_weight;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn sample_weights(&self, y: &Array1<f64>) -> Array1<f64> {
        match self.config.class_weight {
            ClassWeight::Uniform => Array1::ones(y.len()),
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
                let neg = n - pos;
                let w_pos = n / (2.0 * pos);
                let w_neg = n / (2.0 * neg);
                y.mapv(|v| if v > 0.5 { w_pos } else { w_neg })
            }
        }
    }

    /// Fit the model using gradient descent
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_binary_inputs("logistic_regression", x, y)?;

        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();
        let sample_weights = self.sample_weights(y);

        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;

        let lr = self.config.learning_rate;
        let alpha = self.config.alpha;
        self.n_iter = 0;

        for _ in 0..self.config.max_iter {
            self.n_iter += 1;
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = (&predictions - y) * &sample_weights;
            let dw = (x.t().dot(&errors) / n_samples) + (alpha * &weights);
            let db = if self.config.fit_intercept { errors.sum() / n_samples } else { 0.0 };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if !grad_norm.is_finite() {
                return Err(PipelineError::backend("logistic_regression", "gradient diverged"));
            }
            if grad_norm < self.config.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);

        Ok(self)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        let intercept = self.intercept.unwrap_or(0.0);

        let linear = x.dot(coefficients) + intercept;
        Ok(Self::sigmoid(&linear))
    }
}
