use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::Display;

use super::gate::GateVerdict;
use super::recovery::RecoveryPlan;
use super::{RunState, SnapshotError, StageId};

pub fn generate_run_id(start: DateTime<Utc>) -> String {
    format!("{}_{}", start.format("%Y%m%dT%H%M%SZ"), uuid::Uuid::new_v4())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A stage artifact on disk, named relative to the run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotStatus {
    Passed,
    Degraded,
    Failed,
}

impl SnapshotStatus {
    /// Later stages may build on this snapshot.
    pub fn is_usable(self) -> bool {
        self != SnapshotStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub run_id: String,
    pub stage: StageId,
    pub attempt: u32,
    pub status: SnapshotStatus,
    pub verdict: GateVerdict,
    pub output: Option<ArtifactRef>,
    pub input_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub state: RunState,
    pub input_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub snapshots: Vec<StageSnapshot>,
    pub recovery_plans: Vec<RecoveryPlan>,
}

impl RunLog {
    pub fn new(run_id: String, input_fingerprint: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            state: RunState::Pending,
            input_fingerprint,
            started_at: now,
            updated_at: now,
            completed_at: None,
            snapshots: Vec::new(),
            recovery_plans: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        write_atomic(path, serde_yaml::to_string(self)?.as_bytes())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Per-run directory holding stage artifacts, the latest snapshot of each
/// stage and the run log.
///
/// ```text
/// <state_dir>/runs/<run_id>/
///     run_log.yaml
///     stage_<n>.yaml   latest snapshot of stage n
///     stage_<n>.json   artifact of stage n (stages 2 to 6)
/// ```
pub struct SnapshotManager {
    run_dir: PathBuf,
    run_log: RunLog,
}

impl SnapshotManager {
    pub fn run_dir_for(state_dir: &Path, run_id: &str) -> PathBuf {
        state_dir.join("runs").join(run_id)
    }

    /// Opens the run directory, continuing its log if one exists.
    pub fn open(
        state_dir: &Path,
        run_id: &str,
        input_fingerprint: &str,
    ) -> Result<Self, SnapshotError> {
        let run_dir = Self::run_dir_for(state_dir, run_id);
        fs::create_dir_all(&run_dir)?;

        let log_path = run_dir.join("run_log.yaml");
        let run_log = if log_path.exists() {
            RunLog::load(&log_path)?
        } else {
            let log = RunLog::new(run_id.to_string(), input_fingerprint.to_string());
            log.save(&log_path)?;
            log
        };

        Ok(Self { run_dir, run_log })
    }

    pub fn load_run_log(state_dir: &Path, run_id: &str) -> Result<RunLog, SnapshotError> {
        RunLog::load(&Self::run_dir_for(state_dir, run_id).join("run_log.yaml"))
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    fn run_log_path(&self) -> PathBuf {
        self.run_dir.join("run_log.yaml")
    }

    fn snapshot_path(&self, stage: StageId) -> PathBuf {
        self.run_dir.join(format!("stage_{}.yaml", stage.number()))
    }

    fn artifact_name(stage: StageId) -> String {
        format!("stage_{}.json", stage.number())
    }

    pub fn write_artifact<T: Serialize>(
        &self,
        stage: StageId,
        value: &T,
    ) -> Result<ArtifactRef, SnapshotError> {
        let bytes = serde_json::to_vec(value)?;
        let name = Self::artifact_name(stage);
        write_atomic(&self.run_dir.join(&name), &bytes)?;
        Ok(ArtifactRef {
            path: name,
            sha256: sha256_hex(&bytes),
            bytes: bytes.len(),
        })
    }

    /// Reads an artifact back, refusing it if its digest changed.
    pub fn load_artifact<T: DeserializeOwned>(
        &self,
        reference: &ArtifactRef,
    ) -> Result<T, SnapshotError> {
        let path = self.run_dir.join(&reference.path);
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.display().to_string()));
        }
        let bytes = fs::read(&path)?;
        let actual = sha256_hex(&bytes);
        if actual != reference.sha256 {
            return Err(SnapshotError::DigestMismatch {
                path: reference.path.clone(),
                expected: reference.sha256.clone(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Latest snapshot written for `stage`, if any.
    pub fn latest(&self, stage: StageId) -> Result<Option<StageSnapshot>, SnapshotError> {
        let path = self.snapshot_path(stage);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_yaml::from_str(&content)?))
    }

    /// Writes the stage's latest snapshot and retires the snapshots of the
    /// stages after it, which were built on the previous output.
    pub fn record(&mut self, snapshot: StageSnapshot) -> Result<(), SnapshotError> {
        write_atomic(
            &self.snapshot_path(snapshot.stage),
            serde_yaml::to_string(&snapshot)?.as_bytes(),
        )?;
        if let Some(next) = snapshot.stage.next() {
            for later in next.through_end() {
                let path = self.snapshot_path(later);
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
        }
        self.run_log.snapshots.push(snapshot);
        self.touch()
    }

    pub fn record_plan(&mut self, plan: RecoveryPlan) -> Result<(), SnapshotError> {
        self.run_log.recovery_plans.push(plan);
        self.touch()
    }

    pub fn set_state(&mut self, state: RunState) -> Result<(), SnapshotError> {
        if matches!(state, RunState::Completed | RunState::Aborted { .. }) {
            self.run_log.completed_at = Some(Utc::now());
        } else {
            self.run_log.completed_at = None;
        }
        self.run_log.state = state;
        self.touch()
    }

    pub fn set_fingerprint(&mut self, input_fingerprint: &str) -> Result<(), SnapshotError> {
        self.run_log.input_fingerprint = input_fingerprint.to_string();
        self.touch()
    }

    fn touch(&mut self) -> Result<(), SnapshotError> {
        self.run_log.updated_at = Utc::now();
        self.run_log.save(&self.run_log_path())
    }
}
