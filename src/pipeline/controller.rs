use std::collections::BTreeMap;
use std::fmt;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::input_fingerprint;
use super::gate::{GateCheck, GateVerdict, Gatekeeper, Severity};
use super::recovery::{RecoveryAction, RecoveryManager, RecoveryPlan};
use super::snapshot::{generate_run_id, ArtifactRef, SnapshotManager, SnapshotStatus, StageSnapshot};
use super::{PipelineError, SnapshotError, StageId};
use crate::abort::AbortSignal;
use crate::config::Config;
use crate::filter::{FilterArtifact, FilterOutput, VisibilityFilter};
use crate::integrate::{integrate, IntegratedDataset};
use crate::pool::{plan_pools, PoolArtifact};
use crate::propagate::{self, propagate_constellations, PropagationOutput, TimeGrid};
use crate::signal::{SignalAnalyzer, SignalArtifact};
use crate::timeseries::{assemble, TimeseriesArtifact};
use crate::tle::PipelineInput;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { stage: StageId },
    Validating { stage: StageId },
    Recovering { stage: StageId },
    Completed,
    Aborted { stage: StageId, reason: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running { stage } => write!(f, "running {}", stage.label()),
            RunState::Validating { stage } => write!(f, "validating {}", stage.label()),
            RunState::Recovering { stage } => write!(f, "recovering {}", stage.label()),
            RunState::Completed => write!(f, "completed"),
            RunState::Aborted { stage, reason } => {
                write!(f, "aborted at {}: {}", stage.label(), reason)
            }
        }
    }
}

/// Live view of a run for pollers.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: String,
    pub state: RunState,
    pub attempt: u32,
    pub completed: Vec<StageId>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Continue from the newest intact snapshot chain of the run.
    pub resume: bool,
    /// Abort deliberately once this stage's snapshot is written.
    pub stop_after: Option<StageId>,
    /// Run one stage on top of the previous stage's artifact.
    pub only_stage: Option<StageId>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub input_fingerprint: String,
    pub executed: Vec<StageId>,
    pub resumed_from: Option<StageId>,
    pub snapshots: Vec<StageSnapshot>,
    pub recovery_plans: Vec<RecoveryPlan>,
    pub pools: Option<PoolArtifact>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Stage outputs held between stages. Stages 1 and 2 only live here.
#[derive(Default)]
struct RunContext {
    grids: BTreeMap<String, TimeGrid>,
    reference_epoch: Option<DateTime<Utc>>,
    propagation: Option<PropagationOutput>,
    filtered: Option<FilterOutput>,
    filter: Option<FilterArtifact>,
    signal: Option<SignalArtifact>,
    timeseries: Option<TimeseriesArtifact>,
    integrated: Option<IntegratedDataset>,
    pools: Option<PoolArtifact>,
}

impl RunContext {
    fn new(config: &Config, input: &PipelineInput) -> Self {
        let reference_epoch = TimeGrid::resolve_start(config, input);
        let grids = reference_epoch
            .map(|start| {
                config
                    .constellations
                    .iter()
                    .map(|(name, c)| (name.clone(), TimeGrid::for_constellation(start, c)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            grids,
            reference_epoch,
            ..Default::default()
        }
    }

    /// Drop what no later stage reads.
    fn release(&mut self, finished: StageId) {
        match finished {
            StageId::Filter => self.propagation = None,
            StageId::Signal => self.filtered = None,
            StageId::Timeseries => self.signal = None,
            StageId::Integration => self.timeseries = None,
            _ => {}
        }
    }
}

/// Drives stages 1 to 6 strictly in order, gating, snapshotting and
/// recovering after every attempt.
pub struct Controller {
    config: Config,
    run_id: String,
    gatekeeper: Gatekeeper,
    recovery: RecoveryManager,
    workers: rayon::ThreadPool,
    status: Arc<Mutex<RunStatus>>,
    abort_tx: mpsc::Sender<AbortSignal>,
    abort_rx: Mutex<mpsc::Receiver<AbortSignal>>,
}

impl Controller {
    pub fn new(config: Config, run_id: Option<String>) -> Result<Self, PipelineError> {
        let run_id = run_id.unwrap_or_else(|| generate_run_id(Utc::now()));
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pipeline.workers.unwrap_or(0))
            .thread_name(|i| format!("leo-pool-worker-{i}"))
            .build()?;
        let gatekeeper = Gatekeeper::new(&config.pipeline, expected_lengths(&config));
        let recovery = RecoveryManager::from_config(&config.pipeline);
        let (abort_tx, abort_rx) = mpsc::channel();
        let status = RunStatus {
            run_id: run_id.clone(),
            state: RunState::Pending,
            attempt: 0,
            completed: Vec::new(),
            updated_at: Utc::now(),
        };

        Ok(Self {
            config,
            run_id,
            gatekeeper,
            recovery,
            workers,
            status: Arc::new(Mutex::new(status)),
            abort_tx,
            abort_rx: Mutex::new(abort_rx),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status_handle(&self) -> Arc<Mutex<RunStatus>> {
        self.status.clone()
    }

    pub fn abort_handle(&self) -> mpsc::Sender<AbortSignal> {
        self.abort_tx.clone()
    }

    pub fn run(
        &self,
        input: &PipelineInput,
        options: RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let fingerprint = input_fingerprint(&self.config, input)?;
        let mut snapshots =
            SnapshotManager::open(&self.config.pipeline.state_dir, &self.run_id, &fingerprint)?;
        let mut ctx = RunContext::new(&self.config, input);
        let mut report = RunReport {
            run_id: self.run_id.clone(),
            state: RunState::Pending,
            input_fingerprint: fingerprint.clone(),
            executed: Vec::new(),
            resumed_from: None,
            snapshots: Vec::new(),
            recovery_plans: Vec::new(),
            pools: None,
        };
        {
            let mut status = self.status.lock().unwrap();
            status.completed.clear();
        }

        let (first, last) = if let Some(stage) = options.only_stage {
            let previous = stage
                .previous()
                .filter(|p| *p >= StageId::Signal)
                .ok_or(PipelineError::NotIndependent(stage))?;
            self.restore_to(previous, &snapshots, &fingerprint, &mut ctx)?;
            log::info!("Run {}: running {} on its own", self.run_id, stage.label());
            (stage, stage)
        } else if options.resume {
            match self.restore(&snapshots, &fingerprint, &mut ctx) {
                Some(done) => {
                    report.resumed_from = Some(done);
                    self.status.lock().unwrap().completed =
                        StageId::ALL.into_iter().take_while(|s| *s <= done).collect();
                    let Some(next) = done.next() else {
                        log::info!("Run {} is already complete", self.run_id);
                        return Ok(self.finish(&mut snapshots, ctx, report, RunState::Completed));
                    };
                    log::info!("Run {}: resuming at {}", self.run_id, next.label());
                    (next, StageId::Pool)
                }
                None => {
                    log::warn!(
                        "Run {}: no usable snapshots, starting from stage 1",
                        self.run_id
                    );
                    snapshots.set_fingerprint(&fingerprint)?;
                    (StageId::Propagation, StageId::Pool)
                }
            }
        } else {
            snapshots.set_fingerprint(&fingerprint)?;
            (StageId::Propagation, StageId::Pool)
        };

        for stage in first.through_end().take_while(|s| *s <= last) {
            if let Some(signal) = self.poll_abort() {
                log::warn!(
                    "Run {}: abort requested before {}: {}",
                    self.run_id,
                    stage.label(),
                    signal.reason
                );
                let state = RunState::Aborted {
                    stage,
                    reason: format!("cancelled: {}", signal.reason),
                };
                return Ok(self.finish(&mut snapshots, ctx, report, state));
            }

            if let Some(reason) =
                self.run_stage(stage, input, &mut ctx, &mut snapshots, &fingerprint, &mut report)
            {
                let state = RunState::Aborted { stage, reason };
                return Ok(self.finish(&mut snapshots, ctx, report, state));
            }
            report.executed.push(stage);
            self.status.lock().unwrap().completed.push(stage);
            ctx.release(stage);

            if options.stop_after == Some(stage) && stage < last {
                let state = RunState::Aborted {
                    stage: stage.next().unwrap_or(stage),
                    reason: format!("stopped after {}", stage.label()),
                };
                return Ok(self.finish(&mut snapshots, ctx, report, state));
            }
        }

        Ok(self.finish(&mut snapshots, ctx, report, RunState::Completed))
    }

    fn poll_abort(&self) -> Option<AbortSignal> {
        self.abort_rx.lock().unwrap().try_recv().ok()
    }

    fn transition(&self, snapshots: &mut SnapshotManager, state: RunState, attempt: u32) {
        {
            let mut status = self.status.lock().unwrap();
            status.state = state.clone();
            status.attempt = attempt;
            status.updated_at = Utc::now();
        }
        if let Err(e) = snapshots.set_state(state) {
            log::warn!("Run {}: run log not updated: {}", self.run_id, e);
        }
    }

    fn finish(
        &self,
        snapshots: &mut SnapshotManager,
        ctx: RunContext,
        mut report: RunReport,
        state: RunState,
    ) -> RunReport {
        match &state {
            RunState::Completed => log::info!(
                "Run {} completed ({} stages executed)",
                self.run_id,
                report.executed.len()
            ),
            other => log::error!("Run {} {}", self.run_id, other),
        }
        let attempt = self.status.lock().unwrap().attempt;
        self.transition(snapshots, state.clone(), attempt);
        report.state = state;
        report.pools = ctx.pools;
        report
    }

    /// Attempts one stage until it passes, degrades or must abort. Returns the
    /// abort reason.
    fn run_stage(
        &self,
        stage: StageId,
        input: &PipelineInput,
        ctx: &mut RunContext,
        snapshots: &mut SnapshotManager,
        fingerprint: &str,
        report: &mut RunReport,
    ) -> Option<String> {
        let mut attempt = 1;
        loop {
            self.transition(snapshots, RunState::Running { stage }, attempt);
            log::info!("{} started (attempt {})", stage.label(), attempt);
            let started = Instant::now();

            let executed = self.workers.install(|| self.execute(stage, input, ctx));
            let (mut verdict, output) = match executed {
                Ok(()) => {
                    self.transition(snapshots, RunState::Validating { stage }, attempt);
                    let mut verdict = self
                        .validate(stage, input, ctx)
                        .unwrap_or_else(|e| RecoveryManager::error_verdict(stage, &e));
                    let output = match self.persist(stage, ctx, snapshots) {
                        Ok(output) => output,
                        Err(e) => {
                            log::error!("{}: artifact not persisted: {}", stage.label(), e);
                            verdict.push(snapshot_failure("artifact_persisted", &e));
                            None
                        }
                    };
                    (verdict, output)
                }
                Err(e) => {
                    log::error!("{} failed: {}", stage.label(), e);
                    (RecoveryManager::error_verdict(stage, &e), None)
                }
            };
            log::info!(
                "{} finished in {:.2?}, gate {}",
                stage.label(),
                started.elapsed(),
                if verdict.passed() { "passed" } else { "failed" }
            );
            for warning in verdict.warnings() {
                log::warn!("{}: {}: {}", stage.label(), warning.name, warning.detail);
            }

            let mut plan = self.recovery.plan(&verdict, attempt);
            let snapshot = StageSnapshot {
                run_id: self.run_id.clone(),
                stage,
                attempt,
                status: match plan.as_ref().map(|p| p.action) {
                    None => SnapshotStatus::Passed,
                    Some(RecoveryAction::SkipWithDegradedOutput) => SnapshotStatus::Degraded,
                    Some(_) => SnapshotStatus::Failed,
                },
                verdict: verdict.clone(),
                output,
                input_fingerprint: fingerprint.to_string(),
                created_at: Utc::now(),
            };
            match snapshots.record(snapshot.clone()) {
                Ok(()) => report.snapshots.push(snapshot),
                Err(e) => {
                    log::error!("{}: snapshot not persisted: {}", stage.label(), e);
                    verdict.push(snapshot_failure("snapshot_persisted", &e));
                    plan = self.recovery.plan(&verdict, attempt);
                }
            }

            let Some(plan) = plan else {
                return None;
            };

            self.transition(snapshots, RunState::Recovering { stage }, attempt);
            for issue in &plan.issues {
                log::warn!(
                    "{}: {} [{}]: {}",
                    stage.label(),
                    issue.name,
                    issue.severity,
                    issue.detail
                );
            }
            log::warn!("{}: {} ({})", stage.label(), plan.action, plan.reason);

            let action = plan.action;
            let reason = format!(
                "{}: {}",
                plan.reason,
                plan.issues
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if let Err(e) = snapshots.record_plan(plan.clone()) {
                log::error!("{}: recovery plan not persisted: {}", stage.label(), e);
            }
            report.recovery_plans.push(plan);

            match action {
                RecoveryAction::Retry => attempt += 1,
                RecoveryAction::SkipWithDegradedOutput => return None,
                RecoveryAction::Abort => return Some(reason),
            }
        }
    }

    fn execute(
        &self,
        stage: StageId,
        input: &PipelineInput,
        ctx: &mut RunContext,
    ) -> Result<(), PipelineError> {
        let missing = || PipelineError::MissingInput(stage);

        match stage {
            StageId::Propagation => {
                let propagator = propagate::build(self.config.propagator);
                log::info!(
                    "Propagating {} records with {}",
                    input.record_count(),
                    propagator.name()
                );
                ctx.propagation = Some(propagate_constellations(
                    propagator.as_ref(),
                    input,
                    &ctx.grids,
                ));
            }
            StageId::Filter => {
                let propagation = ctx.propagation.as_ref().ok_or_else(missing)?;
                let filtered = VisibilityFilter::from_config(&self.config)?.run(input, propagation);
                ctx.filter = Some(filtered.artifact());
                ctx.filtered = Some(filtered);
            }
            StageId::Signal => {
                let filtered = ctx.filtered.as_ref().ok_or_else(missing)?;
                ctx.signal = Some(SignalAnalyzer::from_config(&self.config)?.run(filtered)?);
            }
            StageId::Timeseries => {
                let signal = ctx.signal.as_ref().ok_or_else(missing)?;
                ctx.timeseries = Some(assemble(signal, &expected_lengths(&self.config)));
            }
            StageId::Integration => {
                let timeseries = ctx.timeseries.as_ref().ok_or_else(missing)?;
                let filter = ctx.filter.as_ref().ok_or_else(missing)?;
                let epoch = ctx.reference_epoch.ok_or(PipelineError::NoReferenceEpoch)?;
                let intervals: BTreeMap<String, i64> = ctx
                    .grids
                    .iter()
                    .map(|(name, grid)| (name.clone(), grid.interval_ms))
                    .collect();
                let integrated = integrate(timeseries, filter, epoch, &intervals)
                    .map_err(SnapshotError::from)?;
                ctx.integrated = Some(integrated);
            }
            StageId::Pool => {
                let integrated = ctx.integrated.as_ref().ok_or_else(missing)?;
                ctx.pools = Some(plan_pools(integrated, &self.config));
            }
        }
        Ok(())
    }

    fn validate(
        &self,
        stage: StageId,
        input: &PipelineInput,
        ctx: &RunContext,
    ) -> Result<GateVerdict, PipelineError> {
        let missing = || PipelineError::MissingInput(stage);
        let gate = &self.gatekeeper;

        let verdict = match stage {
            StageId::Propagation => {
                gate.check_propagation(input, ctx.propagation.as_ref().ok_or_else(missing)?)
            }
            StageId::Filter => gate.check_filter(input, ctx.filter.as_ref().ok_or_else(missing)?),
            StageId::Signal => gate.check_signal(
                ctx.filter.as_ref().ok_or_else(missing)?,
                ctx.signal.as_ref().ok_or_else(missing)?,
            ),
            StageId::Timeseries => gate.check_timeseries(
                ctx.filter.as_ref().ok_or_else(missing)?,
                ctx.timeseries.as_ref().ok_or_else(missing)?,
            ),
            StageId::Integration => {
                gate.check_integration(ctx.integrated.as_ref().ok_or_else(missing)?)
            }
            StageId::Pool => gate.check_pool(
                ctx.integrated.as_ref().ok_or_else(missing)?,
                ctx.pools.as_ref().ok_or_else(missing)?,
            ),
        };
        Ok(verdict)
    }

    fn persist(
        &self,
        stage: StageId,
        ctx: &RunContext,
        snapshots: &SnapshotManager,
    ) -> Result<Option<ArtifactRef>, SnapshotError> {
        if !stage.persists_artifact() {
            return Ok(None);
        }
        let written = match stage {
            StageId::Filter => ctx.filter.as_ref().map(|a| snapshots.write_artifact(stage, a)),
            StageId::Signal => ctx.signal.as_ref().map(|a| snapshots.write_artifact(stage, a)),
            StageId::Timeseries => ctx
                .timeseries
                .as_ref()
                .map(|a| snapshots.write_artifact(stage, a)),
            StageId::Integration => ctx
                .integrated
                .as_ref()
                .map(|a| snapshots.write_artifact(stage, a)),
            StageId::Pool => ctx.pools.as_ref().map(|a| snapshots.write_artifact(stage, a)),
            StageId::Propagation => None,
        };
        written.transpose()
    }

    /// Newest stage from 3 on whose snapshot chain is intact for this input.
    fn restore(
        &self,
        snapshots: &SnapshotManager,
        fingerprint: &str,
        ctx: &mut RunContext,
    ) -> Option<StageId> {
        for stage in [
            StageId::Pool,
            StageId::Integration,
            StageId::Timeseries,
            StageId::Signal,
        ] {
            match self.restore_to(stage, snapshots, fingerprint, ctx) {
                Ok(()) => return Some(stage),
                Err(e) => log::debug!(
                    "Run {}: cannot resume after {}: {}",
                    self.run_id,
                    stage.label(),
                    e
                ),
            }
        }
        None
    }

    /// Loads the artifacts needed to continue after `stage`.
    fn restore_to(
        &self,
        stage: StageId,
        snapshots: &SnapshotManager,
        fingerprint: &str,
        ctx: &mut RunContext,
    ) -> Result<(), PipelineError> {
        if stage < StageId::Signal {
            return Err(PipelineError::NotIndependent(stage));
        }

        let mut filter_ref = None;
        let mut stage_ref = None;
        for s in StageId::ALL.into_iter().take_while(|s| *s <= stage) {
            let no_snapshot = || PipelineError::NoSnapshot(s, self.run_id.clone());
            let snapshot = snapshots.latest(s)?.ok_or_else(no_snapshot)?;
            if !snapshot.status.is_usable() || snapshot.input_fingerprint != fingerprint {
                return Err(no_snapshot());
            }
            if s == StageId::Filter {
                filter_ref = Some(snapshot.output.clone().ok_or_else(no_snapshot)?);
            }
            if s == stage {
                stage_ref = Some(snapshot.output.ok_or_else(no_snapshot)?);
            }
        }
        let (Some(filter_ref), Some(stage_ref)) = (filter_ref, stage_ref) else {
            return Err(PipelineError::NoSnapshot(stage, self.run_id.clone()));
        };

        ctx.filter = Some(snapshots.load_artifact(&filter_ref)?);
        match stage {
            StageId::Signal => ctx.signal = Some(snapshots.load_artifact(&stage_ref)?),
            StageId::Timeseries => ctx.timeseries = Some(snapshots.load_artifact(&stage_ref)?),
            StageId::Integration => ctx.integrated = Some(snapshots.load_artifact(&stage_ref)?),
            StageId::Pool => ctx.pools = Some(snapshots.load_artifact(&stage_ref)?),
            StageId::Propagation | StageId::Filter => {
                return Err(PipelineError::NotIndependent(stage))
            }
        }
        log::info!(
            "Run {}: restored {} artifact ({} bytes)",
            self.run_id,
            stage.label(),
            stage_ref.bytes
        );
        Ok(())
    }
}

fn snapshot_failure(name: &str, error: &SnapshotError) -> GateCheck {
    let severity = if error.is_transient() {
        Severity::Transient
    } else {
        Severity::Invariant
    };
    GateCheck::failed(name, severity, error.to_string())
}

fn expected_lengths(config: &Config) -> BTreeMap<String, usize> {
    config
        .constellations
        .iter()
        .map(|(name, c)| (name.clone(), c.sample_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{config, input, record};

    fn three_satellites() -> PipelineInput {
        input(vec![
            record("starlink", 44713, 53.05, 10.0, 15.06),
            record("starlink", 44714, 87.9, 40.0, 13.1),
            record("starlink", 44715, 5.0, 80.0, 15.06),
        ])
    }

    #[test]
    fn test_full_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(config(dir.path()), Some("full".into())).unwrap();
        let report = controller
            .run(&three_satellites(), RunOptions::default())
            .unwrap();

        assert!(report.is_completed(), "{}", report.state);
        assert_eq!(report.executed, StageId::ALL.to_vec());
        assert_eq!(report.snapshots.len(), 6);
        assert!(report.recovery_plans.is_empty());
        assert!(report
            .snapshots
            .iter()
            .all(|s| s.status == SnapshotStatus::Passed));
        assert!(report.snapshots[0].output.is_none());
        assert!(report.snapshots[1..].iter().all(|s| s.output.is_some()));

        let pools = report.pools.unwrap();
        let pool = &pools.pools["starlink"];
        assert!(pool.selected_ids.iter().all(|id| [44713, 44714].contains(id)));

        let status = controller.status_handle();
        let status = status.lock().unwrap();
        assert_eq!(status.state, RunState::Completed);
        assert_eq!(status.completed.len(), 6);

        let log = SnapshotManager::load_run_log(dir.path(), "full").unwrap();
        assert_eq!(log.state, RunState::Completed);
        assert_eq!(log.snapshots.len(), 6);
        assert!(log.completed_at.is_some());
    }

    #[test]
    fn test_cancellation_is_checked_between_stages() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(config(dir.path()), None).unwrap();
        controller
            .abort_handle()
            .send(AbortSignal::operator("maintenance"))
            .unwrap();

        let report = controller
            .run(&three_satellites(), RunOptions::default())
            .unwrap();
        assert!(report.executed.is_empty());
        match report.state {
            RunState::Aborted { stage, reason } => {
                assert_eq!(stage, StageId::Propagation);
                assert!(reason.contains("maintenance"));
            }
            other => panic!("unexpected state {other}"),
        }
    }

    #[test]
    fn test_empty_input_aborts_at_first_gate() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(config(dir.path()), None).unwrap();
        let report = controller
            .run(&PipelineInput::default(), RunOptions::default())
            .unwrap();

        assert!(matches!(
            report.state,
            RunState::Aborted {
                stage: StageId::Propagation,
                ..
            }
        ));
        assert_eq!(report.recovery_plans.len(), 1);
        assert_eq!(report.recovery_plans[0].action, RecoveryAction::Abort);
        assert_eq!(report.snapshots[0].status, SnapshotStatus::Failed);
    }

    #[test]
    fn test_snapshot_write_failure_is_retried_then_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = SnapshotManager::run_dir_for(dir.path(), "blocked");
        // a directory where the stage-3 artifact should go
        std::fs::create_dir_all(run_dir.join("stage_3.json").join("occupied")).unwrap();

        let controller = Controller::new(config(dir.path()), Some("blocked".into())).unwrap();
        let report = controller
            .run(&three_satellites(), RunOptions::default())
            .unwrap();

        let actions: Vec<_> = report.recovery_plans.iter().map(|p| p.action).collect();
        assert_eq!(
            actions,
            vec![
                RecoveryAction::Retry,
                RecoveryAction::Retry,
                RecoveryAction::Abort
            ]
        );
        assert!(report
            .recovery_plans
            .iter()
            .all(|p| p.stage == StageId::Signal));
        assert_eq!(report.executed, vec![StageId::Propagation, StageId::Filter]);
        assert!(matches!(
            report.state,
            RunState::Aborted {
                stage: StageId::Signal,
                ..
            }
        ));
    }

    #[test]
    fn test_only_stage_needs_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(config(dir.path()), Some("fresh".into())).unwrap();
        let options = RunOptions {
            only_stage: Some(StageId::Pool),
            ..Default::default()
        };
        let result = controller.run(&three_satellites(), options);
        assert!(matches!(result, Err(PipelineError::NoSnapshot(_, _))));

        let options = RunOptions {
            only_stage: Some(StageId::Signal),
            ..Default::default()
        };
        let result = controller.run(&three_satellites(), options);
        assert!(matches!(
            result,
            Err(PipelineError::NotIndependent(StageId::Signal))
        ));
    }
}
