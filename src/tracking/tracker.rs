//! Experiment tracker backends

use crate::artifacts::ArtifactRef;
use crate::error::{PipelineError, Result};
use crate::evaluation::EvaluationMetrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Outcome of one backend within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    Failed,
}

/// One backend training, as reported to a tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub run_id: String,
    pub backend: String,
    pub params: serde_json::Value,
    pub metrics: Option<EvaluationMetrics>,
    pub artifact: Option<ArtifactRef>,
    pub duration_secs: f64,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// Sink for per-backend params, metrics and artifact references.
///
/// The pipeline never reads tracker storage back.
pub trait ExperimentTracker: Send + Sync {
    fn log(&self, entry: &TrackingEntry) -> Result<()>;

    /// Short label for log output
    fn name(&self) -> &str;
}

/// Appends one JSON object per line to a file
pub struct JsonlTracker {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlTracker {
    /// Open (or create) `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Persistence(format!("cannot create tracker directory {}: {}", parent.display(), e))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::Persistence(format!("cannot open tracker file {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back; used by tests and tooling
    pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<TrackingEntry>> {
        let file = File::open(path.as_ref())?;
        BufReader::new(file)
            .lines()
            .filter(|line| line.as_ref().map(|l| !l.trim().is_empty()).unwrap_or(true))
            .map(|line| Ok(serde_json::from_str(&line?)?))
            .collect()
    }
}

impl ExperimentTracker for JsonlTracker {
    fn log(&self, entry: &TrackingEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)
            .and_then(|_| file.flush())
            .map_err(|e| PipelineError::Persistence(format!("cannot append to {}: {}", self.path.display(), e)))
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

/// Keeps entries in memory
#[derive(Default)]
pub struct InMemoryTracker {
    entries: Mutex<Vec<TrackingEntry>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TrackingEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ExperimentTracker for InMemoryTracker {
    fn log(&self, entry: &TrackingEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Discards every entry
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn log(&self, _entry: &TrackingEntry) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn entry(backend: &str, status: RunStatus) -> TrackingEntry {
        TrackingEntry {
            run_id: "run-1".to_string(),
            backend: backend.to_string(),
            params: serde_json::json!({"alpha": 0.01}),
            metrics: None,
            artifact: None,
            duration_secs: 0.25,
            status,
            error: None,
            logged_at: Utc::now(),
        }
    }

    #[test]
    fn test_jsonl_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/tracking.jsonl");

        let tracker = JsonlTracker::open(&path).unwrap();
        tracker.log(&entry("logistic_regression", RunStatus::Finished)).unwrap();
        tracker.log(&entry("xgboost", RunStatus::Failed)).unwrap();
        drop(tracker);

        // reopening appends rather than truncating
        JsonlTracker::open(&path)
            .unwrap()
            .log(&entry("lightgbm", RunStatus::Finished))
            .unwrap();

        let entries = JsonlTracker::read_entries(&path).unwrap();
        let backends: Vec<&str> = entries.iter().map(|e| e.backend.as_str()).collect();
        assert_eq!(backends, vec!["logistic_regression", "xgboost", "lightgbm"]);
        assert_eq!(entries[1].status, RunStatus::Failed);
    }

    #[test]
    fn test_concurrent_logging() {
        let tracker = Arc::new(InMemoryTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.log(&entry(&format!("b{}", i), RunStatus::Finished)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.len(), 4);
    }

    #[test]
    fn test_noop() {
        assert!(NoopTracker.log(&entry("x", RunStatus::Finished)).is_ok());
    }
}
