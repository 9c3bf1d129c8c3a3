//! Stage orchestration

use super::context::{RunContext, RunEvent, Stage};
use crate::artifacts::{ArtifactRef, ArtifactStore};
use crate::config::PipelineConfig;
use crate::data::{DataSource, Split};
use crate::error::{PipelineError, Result};
use crate::evaluation::{Candidate, Evaluator, SelectionResult, Selector};
use crate::preprocessing::Preprocessor;
use crate::tracking::{ExperimentTracker, JsonlTracker, NoopTracker, RunStatus, TrackingEntry};
use crate::training::{BackendFailure, ModelBackend, ModelTrainer, TrainedModel};
use crate::validation::{FeatureSchema, RunValidation, SchemaValidator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// Persisted record of everything after validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Terminal error, if the run failed
    pub error: Option<String>,
    pub trained: Vec<TrainedSummary>,
    pub failures: Vec<BackendFailure>,
    pub events: Vec<RunEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedSummary {
    pub backend: String,
    pub declaration_index: usize,
    pub hyperparameters: serde_json::Value,
    pub training_secs: f64,
}

impl From<&TrainedModel> for TrainedSummary {
    fn from(model: &TrainedModel) -> Self {
        Self {
            backend: model.backend.clone(),
            declaration_index: model.declaration_index,
            hyperparameters: model.hyperparameters.clone(),
            training_secs: model.training_secs,
        }
    }
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub output_dir: PathBuf,
    pub validation: RunValidation,
    pub selection: SelectionResult,
    pub failures: Vec<BackendFailure>,
    pub artifacts: Vec<ArtifactRef>,
    pub events: Vec<RunEvent>,
}

/// Bookkeeping shared by the post-validation stages, persisted on every exit
#[derive(Default)]
struct Progress {
    trained: Vec<TrainedSummary>,
    failures: Vec<BackendFailure>,
}

/// Runs ingestion, validation, preprocessing, training, evaluation and
/// selection, then persists the artifacts.
pub struct TrainingPipeline {
    config: Arc<PipelineConfig>,
    tracker: Arc<dyn ExperimentTracker>,
    backends: Option<Vec<Arc<dyn ModelBackend>>>,
}

impl TrainingPipeline {
    /// Validate `config` and set up the configured tracker
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let pipeline = Self::untracked(config)?;
        if pipeline.config.tracking.enabled {
            let tracker = JsonlTracker::open(pipeline.config.tracking_path()?)?;
            return Ok(pipeline.with_tracker(Arc::new(tracker)));
        }
        Ok(pipeline)
    }

    /// Validate `config` without opening any tracking sink
    pub fn untracked(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            tracker: Arc::new(NoopTracker),
            backends: None,
        })
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Train these backends instead of the configured ones
    pub fn with_backends(mut self, backends: Vec<Arc<dyn ModelBackend>>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    /// Fresh context bound to this pipeline's configuration
    pub fn context(&self) -> RunContext {
        RunContext::new(Arc::clone(&self.config))
    }

    /// Run against the configured data path
    pub fn run(&self, ctx: &RunContext) -> Result<PipelineOutcome> {
        let source = ctx.config.data_source()?;
        self.run_source(ctx, source)
    }

    /// Ingest and validate only; a failing verdict is returned, not raised
    pub fn validate(&self, ctx: &RunContext, source: &DataSource) -> Result<(Split, RunValidation)> {
        let config = &ctx.config;
        let schema = config.feature_schema()?;

        let split = stage(ctx, Stage::Ingestion, || {
            config.ingestor().ingest(source, config.split.ratio, config.stratify_on())
        })?;
        ctx.checkpoint(Stage::Ingestion)?;

        let validation = stage(ctx, Stage::Validation, || Ok(validate_split(config, &schema, &split)))?;
        Ok((split, validation))
    }

    pub fn run_source(&self, ctx: &RunContext, source: DataSource) -> Result<PipelineOutcome> {
        let span = info_span!("pipeline_run", run_id = %ctx.run_id);
        let _enter = span.enter();
        info!(backends = self.backend_count(ctx), "Starting training run");

        let config = &ctx.config;
        let store = ArtifactStore::for_run(config.output_dir()?, &ctx.run_id, config.artifacts.versioned);

        let (split, validation) = self.validate(ctx, &source)?;
        let validation_ref = store.save_validation(&validation)?;
        if !validation.passed {
            let err = PipelineError::ValidationFailure {
                train_failures: validation.train.blocking_failures(),
                test_failures: validation.test.blocking_failures(),
            };
            ctx.log.error(Stage::Validation, err.to_string());
            error!(report = %validation_ref.path.display(), "{}", err);
            return Err(err);
        }
        ctx.checkpoint(Stage::Validation)?;

        let mut progress = Progress::default();
        let result = self.train_and_select(ctx, &store, &split, &mut progress);

        let log = TrainingLog {
            run_id: ctx.run_id.clone(),
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            error: result.as_ref().err().map(|e| e.to_string()),
            trained: progress.trained,
            failures: progress.failures.clone(),
            events: ctx.log.events(),
        };
        let saved_log = store.save_training_log(&log);

        let (selection, mut artifacts) = match result {
            Ok(done) => done,
            Err(err) => {
                if let Err(save_err) = saved_log {
                    warn!(error = %save_err, "Could not persist training log");
                }
                return Err(err);
            }
        };
        artifacts.insert(0, validation_ref);
        artifacts.push(saved_log?);

        info!(
            selected = %selection.selected_backend,
            below_target = selection.below_target,
            candidates = selection.ranking.len(),
            failed = progress.failures.len(),
            "Run complete"
        );

        Ok(PipelineOutcome {
            run_id: ctx.run_id.clone(),
            output_dir: store.root().to_path_buf(),
            validation,
            selection,
            failures: progress.failures,
            artifacts,
            events: ctx.log.events(),
        })
    }

    fn backend_count(&self, ctx: &RunContext) -> usize {
        self.backends.as_ref().map(Vec::len).unwrap_or(ctx.config.backends.len())
    }

    fn trainer(&self, ctx: &RunContext) -> ModelTrainer {
        let trainer = match &self.backends {
            Some(backends) => ModelTrainer::new(backends.clone()),
            None => ModelTrainer::from_configs(&ctx.config.backends),
        };
        trainer.with_max_workers(ctx.config.training.max_workers)
    }

    fn train_and_select(
        &self,
        ctx: &RunContext,
        store: &ArtifactStore,
        split: &Split,
        progress: &mut Progress,
    ) -> Result<(SelectionResult, Vec<ArtifactRef>)> {
        let config = &ctx.config;
        let schema = config.feature_schema()?;

        // an unversioned root may still hold the previous run's models
        store.clear_run_outputs()?;

        let preprocessor = Preprocessor::new(schema, config.preprocessing.clone());
        let (artifact, train, test) = stage(ctx, Stage::Preprocessing, || {
            let artifact = preprocessor.fit(&split.train)?;
            let train = preprocessor.transform(&split.train, &artifact)?;
            let test = preprocessor.transform(&split.test, &artifact)?;
            Ok((artifact, train, test))
        })?;
        let mut artifacts = vec![store.save_preprocessor(&artifact)?];
        ctx.checkpoint(Stage::Preprocessing)?;

        let trainer = self.trainer(ctx);
        let outcome = stage(ctx, Stage::Training, || trainer.train_each(&train))?;
        for failure in &outcome.failures {
            ctx.log.warn(Stage::Training, format!("{} failed: {}", failure.backend, failure.reason));
            self.track(ctx, failed_entry(ctx, failure));
        }
        progress.failures = outcome.failures.clone();
        progress.trained = outcome.models.iter().map(TrainedSummary::from).collect();
        outcome.ensure_candidates()?;
        ctx.checkpoint(Stage::Training)?;

        let evaluator = Evaluator::new(config.evaluation.decision_threshold)?;
        let mut evaluated: Vec<(&TrainedModel, Candidate)> = Vec::with_capacity(outcome.models.len());
        stage(ctx, Stage::Evaluation, || {
            for model in &outcome.models {
                match evaluator.evaluate(model, &test) {
                    Ok(metrics) => evaluated.push((model, Candidate::from_model(model, metrics))),
                    Err(err) => {
                        let failure = BackendFailure {
                            backend: model.backend.clone(),
                            declaration_index: model.declaration_index,
                            hyperparameters: model.hyperparameters.clone(),
                            reason: format!("evaluation failed: {}", err),
                            duration_secs: model.training_secs,
                        };
                        warn!(backend = %model.backend, reason = %failure.reason, "Candidate excluded");
                        ctx.log.warn(Stage::Evaluation, failure.reason.clone());
                        self.track(ctx, failed_entry(ctx, &failure));
                        progress.failures.push(failure);
                    }
                }
            }
            if evaluated.is_empty() {
                return Err(PipelineError::Training("no candidate could be evaluated".to_string()));
            }
            Ok(())
        })?;
        ctx.checkpoint(Stage::Evaluation)?;

        let candidates: Vec<Candidate> = evaluated.iter().map(|(_, c)| c.clone()).collect();
        let selector = Selector::new(config.selection.clone());
        let selection = stage(ctx, Stage::Selection, || selector.select(&candidates))?;
        ctx.checkpoint(Stage::Selection)?;

        stage(ctx, Stage::Persistence, || {
            let models: Vec<&TrainedModel> = evaluated.iter().map(|(model, _)| *model).collect();
            let model_refs = store.save_models(&models)?;
            let selection_ref = match store.save_selection(&selection) {
                Ok(saved) => saved,
                Err(err) => {
                    if let Err(cleanup) = store.discard_models() {
                        warn!(error = %cleanup, "Could not remove models of a failed run");
                    }
                    return Err(err);
                }
            };

            for ((model, candidate), model_ref) in evaluated.iter().zip(model_refs) {
                self.track(
                    ctx,
                    TrackingEntry {
                        run_id: ctx.run_id.clone(),
                        backend: model.backend.clone(),
                        params: model.hyperparameters.clone(),
                        metrics: Some(candidate.metrics.clone()),
                        artifact: Some(model_ref.clone()),
                        duration_secs: model.training_secs,
                        status: RunStatus::Finished,
                        error: None,
                        logged_at: Utc::now(),
                    },
                );
                artifacts.push(model_ref);
            }
            artifacts.push(selection_ref);
            Ok(())
        })?;

        Ok((selection, artifacts))
    }

    fn track(&self, ctx: &RunContext, entry: TrackingEntry) {
        if let Err(err) = self.tracker.log(&entry) {
            warn!(tracker = self.tracker.name(), backend = %entry.backend, error = %err, "Tracker rejected entry");
            ctx.log.warn(Stage::Persistence, format!("tracker '{}' failed: {}", self.tracker.name(), err));
        }
    }
}

fn validate_split(config: &PipelineConfig, schema: &FeatureSchema, split: &Split) -> RunValidation {
    let validator = SchemaValidator::new(config.validation.clone());
    RunValidation::new(
        validator.validate(&split.train, schema, "train"),
        validator.validate(&split.test, schema, "test"),
    )
}

fn failed_entry(ctx: &RunContext, failure: &BackendFailure) -> TrackingEntry {
    TrackingEntry {
        run_id: ctx.run_id.clone(),
        backend: failure.backend.clone(),
        params: failure.hyperparameters.clone(),
        metrics: None,
        artifact: None,
        duration_secs: failure.duration_secs,
        status: RunStatus::Failed,
        error: Some(failure.reason.clone()),
        logged_at: Utc::now(),
    }
}

/// Run one stage inside its span, recording timing and failure in the run log
fn stage<T, F>(ctx: &RunContext, stage: Stage, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let span = info_span!("stage", stage = %stage);
    let _enter = span.enter();
    ctx.log.info(stage, "started");
    let start = Instant::now();

    let result = f();
    let duration_secs = start.elapsed().as_secs_f64();
    match &result {
        Ok(_) => {
            info!(stage = %stage, duration_secs, "Stage finished");
            ctx.log.finished(stage, duration_secs);
        }
        Err(err) => {
            error!(stage = %stage, duration_secs, error = %err, "Stage failed");
            ctx.log.error(stage, err.to_string());
        }
    }
    result
}
