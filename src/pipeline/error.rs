use thiserror::Error;

use super::StageId;
use crate::config::ConfigError;
use crate::signal::SignalError;
use crate::tle::TleError;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    #[error("Artifact {path} digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

impl SnapshotError {
    /// IO and encoding failures may go away on another attempt; a missing or
    /// altered artifact will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SnapshotError::Io(_) | SnapshotError::Yaml(_) | SnapshotError::Json(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tle(#[from] TleError),
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("{stage} has no input in memory", stage = .0.label())]
    MissingInput(StageId),
    #[error("No reference epoch: nothing loaded and none configured")]
    NoReferenceEpoch,
    #[error("{stage} cannot run on its own", stage = .0.label())]
    NotIndependent(StageId),
    #[error("No usable snapshot of {stage} in run {1}", stage = .0.label())]
    NoSnapshot(StageId, String),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Snapshot(e) => e.is_transient(),
            PipelineError::Tle(TleError::FileRead(_)) => true,
            _ => false,
        }
    }
}
