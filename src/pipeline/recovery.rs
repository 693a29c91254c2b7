use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::gate::{GateCheck, GateVerdict, Severity};
use super::{PipelineError, StageId};
use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    SkipWithDegradedOutput,
    Abort,
}

/// What was decided for one failed attempt, kept in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub stage: StageId,
    pub attempt: u32,
    pub issues: Vec<GateCheck>,
    pub action: RecoveryAction,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RecoveryManager {
    max_retries: u32,
    tolerant_stages: Vec<StageId>,
}

impl RecoveryManager {
    pub fn new(max_retries: u32, tolerant_stages: Vec<StageId>) -> Self {
        Self {
            max_retries,
            tolerant_stages,
        }
    }

    pub fn from_config(pipeline: &PipelineConfig) -> Self {
        let tolerant = pipeline
            .tolerant_stages
            .iter()
            .filter_map(|n| StageId::from_number(*n).ok())
            .collect();
        Self::new(pipeline.max_retries, tolerant)
    }

    pub fn is_tolerant(&self, stage: StageId) -> bool {
        self.tolerant_stages.contains(&stage)
    }

    /// Verdict for a stage that returned an error instead of output.
    pub fn error_verdict(stage: StageId, error: &PipelineError) -> GateVerdict {
        let severity = if error.is_transient() {
            Severity::Transient
        } else {
            Severity::Invariant
        };
        let mut verdict = GateVerdict::new(stage);
        verdict.push(GateCheck::failed("stage_completed", severity, error.to_string()));
        verdict
    }

    /// `attempt` counts from 1. Returns `None` when nothing blocks.
    pub fn plan(&self, verdict: &GateVerdict, attempt: u32) -> Option<RecoveryPlan> {
        let worst = verdict.worst()?;
        let stage = verdict.stage;

        let (action, reason) = match worst {
            Severity::Invariant => (RecoveryAction::Abort, "invariant violated".to_string()),
            Severity::Transient if attempt <= self.max_retries => (
                RecoveryAction::Retry,
                format!("transient failure, retry {} of {}", attempt, self.max_retries),
            ),
            Severity::Transient => (
                RecoveryAction::Abort,
                format!("still failing after {} retries", self.max_retries),
            ),
            Severity::Degradable if self.is_tolerant(stage) => (
                RecoveryAction::SkipWithDegradedOutput,
                "tolerant stage, continuing with reduced output".to_string(),
            ),
            Severity::Degradable => (
                RecoveryAction::Abort,
                format!("{} does not tolerate degraded output", stage.label()),
            ),
            Severity::Warning => return None,
        };

        Some(RecoveryPlan {
            stage,
            attempt,
            issues: verdict.failures().cloned().collect(),
            action,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SnapshotError;

    fn manager() -> RecoveryManager {
        RecoveryManager::from_config(&PipelineConfig::default())
    }

    fn verdict(stage: StageId, severity: Severity) -> GateVerdict {
        let mut verdict = GateVerdict::new(stage);
        verdict.push(GateCheck::new("ok", Severity::Invariant, true, ""));
        verdict.push(GateCheck::failed("broken", severity, "broken"));
        verdict
    }

    #[test]
    fn test_passing_verdict_needs_no_plan() {
        let manager = manager();
        assert!(manager.plan(&GateVerdict::new(StageId::Signal), 1).is_none());
        assert!(manager
            .plan(&verdict(StageId::Signal, Severity::Warning), 1)
            .is_none());
    }

    #[test]
    fn test_transient_retries_until_budget() {
        let manager = manager();
        let v = verdict(StageId::Signal, Severity::Transient);
        let actions: Vec<_> = (1..=3)
            .map(|attempt| manager.plan(&v, attempt).unwrap().action)
            .collect();
        assert_eq!(
            actions,
            vec![RecoveryAction::Retry, RecoveryAction::Retry, RecoveryAction::Abort]
        );
    }

    #[test]
    fn test_degradable_depends_on_tolerance() {
        let manager = manager();
        let tolerant = manager
            .plan(&verdict(StageId::Timeseries, Severity::Degradable), 1)
            .unwrap();
        assert_eq!(tolerant.action, RecoveryAction::SkipWithDegradedOutput);
        assert_eq!(tolerant.issues.len(), 1);

        let strict = manager
            .plan(&verdict(StageId::Integration, Severity::Degradable), 1)
            .unwrap();
        assert_eq!(strict.action, RecoveryAction::Abort);
    }

    #[test]
    fn test_invariant_aborts_immediately() {
        let plan = manager()
            .plan(&verdict(StageId::Filter, Severity::Invariant), 1)
            .unwrap();
        assert_eq!(plan.action, RecoveryAction::Abort);
    }

    #[test]
    fn test_error_classification() {
        let io = PipelineError::Snapshot(SnapshotError::Io(std::io::Error::other("disk full")));
        let verdict = RecoveryManager::error_verdict(StageId::Pool, &io);
        assert_eq!(verdict.worst(), Some(Severity::Transient));

        let missing = PipelineError::MissingInput(StageId::Pool);
        let verdict = RecoveryManager::error_verdict(StageId::Pool, &missing);
        assert_eq!(verdict.worst(), Some(Severity::Invariant));
    }
}
