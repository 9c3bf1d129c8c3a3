//! Filesystem artifact store

use super::envelope::{ArtifactEnvelope, ArtifactKind, ArtifactRef};
use crate::error::{PipelineError, Result};
use crate::evaluation::SelectionResult;
use crate::preprocessing::PreprocessingArtifact;
use crate::training::TrainedModel;
use crate::validation::RunValidation;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

fn persistence(context: &str, path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Persistence(format!("{} {}: {}", context, path.display(), err))
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(persistence("cannot remove", path, e)),
        _ => Ok(()),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(persistence("cannot remove", path, e)),
        _ => Ok(()),
    }
}

/// Writes and reads run artifacts under one root directory.
///
/// Layout:
/// ```text
/// <root>/preprocessing/preprocessor.json
/// <root>/models/<backend>.model.json
/// <root>/reports/{validation_report,selection_result,training_log}.json
/// ```
/// Each write lands in a temporary sibling and is renamed into place, so a
/// reader never observes a partial file. Writers to the same path are
/// serialized. The model set is staged as a whole and swapped in as one
/// directory.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store for one run; versioned runs nest under `runs/<run_id>`
    pub fn for_run(output_dir: &Path, run_id: &str, versioned: bool) -> Self {
        if versioned {
            Self::new(output_dir.join("runs").join(run_id))
        } else {
            Self::new(output_dir)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn preprocessor_path(&self) -> PathBuf {
        self.root.join("preprocessing").join("preprocessor.json")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn model_path(&self, backend: &str) -> PathBuf {
        self.models_dir().join(model_file_name(backend))
    }

    pub fn report_path(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join("reports").join(format!("{}.json", kind))
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wrap `value` in an envelope and write it atomically to `path`
    pub fn write<T: Serialize>(&self, kind: ArtifactKind, path: &Path, value: &T) -> Result<ArtifactRef> {
        let envelope = ArtifactEnvelope::wrap(kind, value)?;

        let parent = path
            .parent()
            .ok_or_else(|| persistence("artifact path has no parent", path, "invalid path"))?;
        fs::create_dir_all(parent).map_err(|e| persistence("cannot create directory for", path, e))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| persistence("artifact path has no file name", path, "invalid path"))?;
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let lock = self.lock_for(path);
        let _guard = lock.lock();

        let written = (|| -> std::io::Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &envelope)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();

        if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(persistence("cannot write", path, e));
        }

        debug!(kind = %kind, path = %path.display(), "Artifact written");
        Ok(ArtifactRef {
            kind,
            path: path.to_path_buf(),
            sha256: envelope.sha256,
            backend: None,
        })
    }

    /// Read `path`, verify the envelope and decode its payload
    pub fn read<T: DeserializeOwned>(&self, kind: ArtifactKind, path: &Path) -> Result<T> {
        let file = File::open(path).map_err(|e| persistence("cannot open", path, e))?;
        let envelope: ArtifactEnvelope = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| persistence("malformed artifact", path, e))?;
        envelope.unwrap_payload(kind)
    }

    pub fn save_preprocessor(&self, artifact: &PreprocessingArtifact) -> Result<ArtifactRef> {
        self.write(ArtifactKind::Preprocessor, &self.preprocessor_path(), artifact)
    }

    pub fn load_preprocessor(&self) -> Result<PreprocessingArtifact> {
        self.read(ArtifactKind::Preprocessor, &self.preprocessor_path())
    }

    fn write_model(&self, path: &Path, model: &TrainedModel) -> Result<ArtifactRef> {
        let mut artifact = self.write(ArtifactKind::Model, path, model)?;
        artifact.backend = Some(model.backend.clone());
        Ok(artifact)
    }

    /// Replace `models/` with exactly `models`.
    ///
    /// The files are written into a hidden staging directory that is renamed
    /// over `models/` once every write succeeded; on failure the previous
    /// directory is left as it was and the staging directory is removed.
    pub fn save_models(&self, models: &[&TrainedModel]) -> Result<Vec<ArtifactRef>> {
        let target = self.models_dir();
        let staging = self.root.join(format!(".models.{}.tmp", Uuid::new_v4().simple()));

        let staged = (|| -> Result<Vec<ArtifactRef>> {
            fs::create_dir_all(&staging).map_err(|e| persistence("cannot create directory", &staging, e))?;
            let refs = models
                .iter()
                .map(|model| self.write_model(&staging.join(model_file_name(&model.backend)), model))
                .collect::<Result<Vec<_>>>()?;
            remove_dir_if_exists(&target)?;
            fs::rename(&staging, &target).map_err(|e| persistence("cannot move models into", &target, e))?;
            Ok(refs)
        })();

        match staged {
            Ok(refs) => Ok(refs
                .into_iter()
                .zip(models)
                .map(|(mut artifact, model)| {
                    artifact.path = self.model_path(&model.backend);
                    artifact
                })
                .collect()),
            Err(err) => {
                let _ = fs::remove_dir_all(&staging);
                Err(err)
            }
        }
    }

    /// Remove every persisted model
    pub fn discard_models(&self) -> Result<()> {
        remove_dir_if_exists(&self.models_dir())
    }

    /// Remove the models and selection a previous run left under this root,
    /// so whatever is on disk belongs to the preprocessor written next
    pub fn clear_run_outputs(&self) -> Result<()> {
        self.discard_models()?;
        remove_file_if_exists(&self.report_path(ArtifactKind::SelectionResult))
    }

    pub fn load_model(&self, backend: &str) -> Result<TrainedModel> {
        self.read(ArtifactKind::Model, &self.model_path(backend))
    }

    pub fn save_validation(&self, validation: &RunValidation) -> Result<ArtifactRef> {
        self.write(
            ArtifactKind::ValidationReport,
            &self.report_path(ArtifactKind::ValidationReport),
            validation,
        )
    }

    pub fn save_selection(&self, selection: &SelectionResult) -> Result<ArtifactRef> {
        self.write(
            ArtifactKind::SelectionResult,
            &self.report_path(ArtifactKind::SelectionResult),
            selection,
        )
    }

    pub fn load_selection(&self) -> Result<SelectionResult> {
        self.read(ArtifactKind::SelectionResult, &self.report_path(ArtifactKind::SelectionResult))
    }

    pub fn save_training_log<T: Serialize>(&self, log: &T) -> Result<ArtifactRef> {
        self.write(ArtifactKind::TrainingLog, &self.report_path(ArtifactKind::TrainingLog), log)
    }
}

fn model_file_name(backend: &str) -> String {
    format!("{}.model.json", backend)
}
