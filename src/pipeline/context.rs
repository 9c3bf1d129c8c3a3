//! Per-run state passed explicitly through every stage

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Validation,
    Preprocessing,
    Training,
    Evaluation,
    Selection,
    Persistence,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Validation => "validation",
            Stage::Preprocessing => "preprocessing",
            Stage::Training => "training",
            Stage::Evaluation => "evaluation",
            Stage::Selection => "selection",
            Stage::Persistence => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Cooperative cancellation flag, checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// One entry of the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub level: EventLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Append-only event sink owned by one run; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, stage: Stage, level: EventLevel, message: String, duration_secs: Option<f64>) {
        self.events.lock().push(RunEvent {
            at: Utc::now(),
            stage,
            level,
            message,
            duration_secs,
        });
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>) {
        self.push(stage, EventLevel::Info, message.into(), None);
    }

    pub fn warn(&self, stage: Stage, message: impl Into<String>) {
        self.push(stage, EventLevel::Warn, message.into(), None);
    }

    pub fn error(&self, stage: Stage, message: impl Into<String>) {
        self.push(stage, EventLevel::Error, message.into(), None);
    }

    pub fn finished(&self, stage: Stage, duration_secs: f64) {
        self.push(stage, EventLevel::Info, "finished".to_string(), Some(duration_secs));
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Identifiers, configuration, log sink and cancellation for one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub config: Arc<PipelineConfig>,
    pub started_at: DateTime<Utc>,
    pub log: RunLog,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        let started_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            run_id: format!("{}-{}", started_at.format("%Y%m%dT%H%M%SZ"), &suffix[..8]),
            config,
            started_at,
            log: RunLog::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stop before the next stage when cancellation was requested
    pub fn checkpoint(&self, completed: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(run_id = %self.run_id, stage = %completed, "Run cancelled");
            self.log.warn(completed, "cancelled after stage");
            return Err(PipelineError::Cancelled {
                stage: completed.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        let config = Arc::new(PipelineConfig::default());
        let a = RunContext::new(Arc::clone(&config));
        let b = RunContext::new(config);
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.with_run_id("fixed").run_id, "fixed");
    }

    #[test]
    fn test_checkpoint() {
        let ctx = RunContext::new(Arc::new(PipelineConfig::default()));
        assert!(ctx.checkpoint(Stage::Ingestion).is_ok());

        let token = ctx.cancel.clone();
        token.cancel();
        match ctx.checkpoint(Stage::Training) {
            Err(PipelineError::Cancelled { stage }) => assert_eq!(stage, "training"),
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert_eq!(ctx.log.events().last().map(|e| e.level), Some(EventLevel::Warn));
    }

    #[test]
    fn test_log_shared_between_clones() {
        let log = RunLog::new();
        let other = log.clone();
        other.info(Stage::Ingestion, "loaded");
        log.finished(Stage::Ingestion, 0.5);
        assert_eq!(log.len(), 2);
        assert_eq!(other.events()[1].duration_secs, Some(0.5));
    }
}
