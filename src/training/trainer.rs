//! Fan-out training of all configured backends on a bounded worker pool

use super::backend::{BackendConfig, ModelBackend, TrainedModel};
use crate::error::{PipelineError, Result};
use crate::preprocessing::FeatureMatrix;
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn};

/// A backend that failed to train; excluded from selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: String,
    pub declaration_index: usize,
    pub hyperparameters: serde_json::Value,
    pub reason: String,
    pub duration_secs: f64,
}

/// Result of training every backend, in declaration order
#[derive(Debug, Clone, Default)]
pub struct TrainingOutcome {
    pub models: Vec<TrainedModel>,
    pub failures: Vec<BackendFailure>,
}

impl TrainingOutcome {
    /// Fail with a training error when no backend produced a model
    pub fn ensure_candidates(&self) -> Result<()> {
        if self.models.is_empty() {
            let reasons: Vec<String> = self
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.backend, f.reason))
                .collect();
            return Err(PipelineError::Training(format!(
                "no usable candidate, all {} backend(s) failed [{}]",
                self.failures.len(),
                reasons.join("; ")
            )));
        }
        Ok(())
    }
}

enum Attempt {
    Trained(TrainedModel),
    Failed(BackendFailure),
}

/// Trains a set of backends independently against one training matrix
pub struct ModelTrainer {
    backends: Vec<Arc<dyn ModelBackend>>,
    max_workers: Option<usize>,
}

impl ModelTrainer {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>) -> Self {
        Self {
            backends,
            max_workers: None,
        }
    }

    pub fn from_configs(configs: &[BackendConfig]) -> Self {
        Self::new(configs.iter().map(BackendConfig::build).collect())
    }

    /// Upper bound on concurrently training backends; defaults to available cores
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    fn pool_size(&self) -> usize {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        self.max_workers.unwrap_or(cores).min(self.backends.len()).max(1)
    }

    /// Train every backend and keep per-backend failures.
    ///
    /// Returns only after every backend has finished or failed.
    pub fn train_each(&self, train: &FeatureMatrix) -> Result<TrainingOutcome> {
        if self.backends.is_empty() {
            return Err(PipelineError::Training("no backends configured".to_string()));
        }

        let workers = self.pool_size();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("churnpipe-train-{}", i))
            .build()
            .map_err(|e| PipelineError::Training(format!("cannot start worker pool: {}", e)))?;

        info!(backends = self.backends.len(), workers, rows = train.n_rows(), "Training backends");

        let attempts: Vec<Attempt> = pool.install(|| {
            self.backends
                .par_iter()
                .enumerate()
                .map(|(index, backend)| fit_one(index, backend.as_ref(), train))
                .collect()
        });

        let mut outcome = TrainingOutcome::default();
        for attempt in attempts {
            match attempt {
                Attempt::Trained(model) => outcome.models.push(model),
                Attempt::Failed(failure) => outcome.failures.push(failure),
            }
        }
        Ok(outcome)
    }

    /// Train every backend; fails when none succeeds
    pub fn train_all(&self, train: &FeatureMatrix) -> Result<TrainingOutcome> {
        let outcome = self.train_each(train)?;
        outcome.ensure_candidates()?;
        Ok(outcome)
    }
}

fn fit_one(index: usize, backend: &dyn ModelBackend, train: &FeatureMatrix) -> Attempt {
    let name = backend.name().to_string();
    let _span = info_span!("train_backend", backend = %name).entered();
    let hyperparameters = backend.hyperparameters();
    let start = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| backend.fit(&train.x, &train.y)))
        .unwrap_or_else(|payload| Err(PipelineError::backend(&name, panic_reason(payload.as_ref()))))
        .and_then(|model| {
            let proba = model.predict_proba(&train.x)?;
            if proba.iter().any(|p| !p.is_finite()) {
                return Err(PipelineError::backend(&name, "training-set probabilities are not finite"));
            }
            Ok(model)
        });
    let duration_secs = start.elapsed().as_secs_f64();

    match result {
        Ok(model) => {
            info!(backend = %name, duration_secs, "Backend trained");
            Attempt::Trained(TrainedModel {
                backend: name,
                declaration_index: index,
                hyperparameters,
                model,
                n_features: train.n_features(),
                training_secs: duration_secs,
                trained_at: Utc::now(),
            })
        }
        Err(err) => {
            let reason = match err {
                PipelineError::BackendTraining { reason, .. } => reason,
                other => other.to_string(),
            };
            warn!(backend = %name, duration_secs, reason = %reason, "Backend failed to train");
            Attempt::Failed(BackendFailure {
                backend: name,
                declaration_index: index,
                hyperparameters,
                reason,
                duration_secs,
            })
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
