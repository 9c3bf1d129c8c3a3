//! Self-describing artifact file format

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Format tag written into every artifact
pub const ARTIFACT_FORMAT: &str = "churnpipe-artifact";

/// Bumped whenever a payload layout changes incompatibly
pub const FORMAT_VERSION: u32 = 1;

/// What an artifact file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Preprocessor,
    Model,
    ValidationReport,
    SelectionResult,
    TrainingLog,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Preprocessor => "preprocessor",
            ArtifactKind::Model => "model",
            ArtifactKind::ValidationReport => "validation_report",
            ArtifactKind::SelectionResult => "selection_result",
            ArtifactKind::TrainingLog => "training_log",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Hex SHA-256 of `data`
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Versioned wrapper around a JSON payload.
///
/// The checksum covers the compact serialization of `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub format: String,
    pub format_version: u32,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
    pub sha256: String,
    pub payload: serde_json::Value,
}

impl ArtifactEnvelope {
    pub fn wrap<T: Serialize>(kind: ArtifactKind, value: &T) -> Result<Self> {
        let payload = serde_json::to_value(value)?;
        let sha256 = compute_sha256(&serde_json::to_vec(&payload)?);
        Ok(Self {
            format: ARTIFACT_FORMAT.to_string(),
            format_version: FORMAT_VERSION,
            kind,
            created_at: Utc::now(),
            sha256,
            payload,
        })
    }

    /// Check format, version, kind and checksum
    pub fn verify(&self, expected: ArtifactKind) -> Result<()> {
        if self.format != ARTIFACT_FORMAT {
            return Err(PipelineError::Persistence(format!("unrecognized artifact format '{}'", self.format)));
        }
        if self.format_version != FORMAT_VERSION {
            return Err(PipelineError::Persistence(format!(
                "artifact format version {} is not supported (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.kind != expected {
            return Err(PipelineError::Persistence(format!(
                "expected a {} artifact, found {}",
                expected, self.kind
            )));
        }
        let actual = compute_sha256(&serde_json::to_vec(&self.payload)?);
        if actual != self.sha256 {
            return Err(PipelineError::Persistence(format!(
                "checksum mismatch for {} artifact",
                self.kind
            )));
        }
        Ok(())
    }

    pub fn unwrap_payload<T: DeserializeOwned>(self, expected: ArtifactKind) -> Result<T> {
        self.verify(expected)?;
        serde_json::from_value(self.payload)
            .map_err(|e| PipelineError::Persistence(format!("malformed {} payload: {}", expected, e)))
    }
}

/// Reference to a persisted artifact, handed to the tracker and the run outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}
