//! Artifact persistence
//!
//! Every artifact is a pretty-printed JSON [`ArtifactEnvelope`] carrying a
//! format tag, a format version and a SHA-256 of its payload, so a serving
//! process written in anything that reads JSON can load it.

mod envelope;
mod store;

pub use envelope::{compute_sha256, ArtifactEnvelope, ArtifactKind, ArtifactRef, ARTIFACT_FORMAT, FORMAT_VERSION};
pub use store::ArtifactStore;
