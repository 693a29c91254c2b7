mod controller;
mod error;
mod fingerprint;
pub mod gate;
pub mod recovery;
pub mod snapshot;
mod stage;

pub use controller::{Controller, RunOptions, RunReport, RunState, RunStatus};
pub use error::{PipelineError, SnapshotError};
pub use fingerprint::input_fingerprint;
pub use gate::{GateCheck, GateVerdict, Gatekeeper, Severity};
pub use recovery::{RecoveryAction, RecoveryManager, RecoveryPlan};
pub use snapshot::{
    generate_run_id, ArtifactRef, RunLog, SnapshotManager, SnapshotStatus, StageSnapshot,
};
pub use stage::{StageId, UnknownStage};
