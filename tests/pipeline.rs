mod common;

use std::fs;
use std::thread;
use std::time::Duration;

use common::{tle, three_satellites, Workspace};
use leo_pool::config::Config;
use leo_pool::filter::{FilterArtifact, ReasonCode};
use leo_pool::pipeline::{
    ArtifactRef, Controller, RunOptions, RunReport, RunState, SnapshotManager, SnapshotStatus,
    StageId,
};
use leo_pool::timeseries::TimeseriesArtifact;

fn run(config: Config, run_id: &str, options: RunOptions) -> RunReport {
    let input = leo_pool::tle::PipelineInput::load(&config).unwrap();
    Controller::new(config, Some(run_id.to_string()))
        .unwrap()
        .run(&input, options)
        .unwrap()
}

fn artifact_ref(report: &RunReport, stage: StageId) -> ArtifactRef {
    report
        .snapshots
        .iter()
        .rev()
        .find(|s| s.stage == stage)
        .and_then(|s| s.output.clone())
        .unwrap()
}

fn manager(ws: &Workspace, report: &RunReport) -> SnapshotManager {
    SnapshotManager::open(&ws.state_dir(), &report.run_id, &report.input_fingerprint).unwrap()
}

#[test]
fn test_end_to_end_accepts_only_capable_satellites() {
    let ws = Workspace::new(&three_satellites());
    let report = run(ws.config(), "e2e", RunOptions::default());
    assert!(report.is_completed(), "{}", report.state);

    let store = manager(&ws, &report);
    let filter: FilterArtifact = store
        .load_artifact(&artifact_ref(&report, StageId::Filter))
        .unwrap();
    assert_eq!(filter.verdicts.len(), 3);
    let accepted: Vec<u32> = filter
        .verdicts
        .iter()
        .filter(|v| v.accepted)
        .map(|v| v.norad_id)
        .collect();
    assert_eq!(accepted, vec![44713, 44714]);
    let rejected = filter.verdicts.iter().find(|v| !v.accepted).unwrap();
    assert_eq!(rejected.norad_id, 44715);
    assert_eq!(rejected.reason, Some(ReasonCode::InclinationInfeasible));

    let timeseries: TimeseriesArtifact = store
        .load_artifact(&artifact_ref(&report, StageId::Timeseries))
        .unwrap();
    let dataset = &timeseries.datasets["starlink"];
    let ids: Vec<u32> = dataset.series.iter().map(|s| s.norad_id).collect();
    assert_eq!(ids, vec![44713, 44714]);
    assert!(dataset.series.iter().all(|s| s.len() == 192));
    assert!(timeseries.excluded.is_empty());

    let pools = report.pools.unwrap();
    assert!(pools.pools["starlink"]
        .selected_ids
        .iter()
        .all(|id| accepted.contains(id)));
}

#[test]
fn test_resume_after_stage_three_matches_uninterrupted_run() {
    let ws = Workspace::new(&three_satellites());
    let full = run(ws.config(), "uninterrupted", RunOptions::default());
    assert!(full.is_completed());

    let stopped = run(
        ws.config(),
        "interrupted",
        RunOptions {
            stop_after: Some(StageId::Signal),
            ..Default::default()
        },
    );
    assert_eq!(
        stopped.executed,
        vec![StageId::Propagation, StageId::Filter, StageId::Signal]
    );
    assert!(matches!(
        stopped.state,
        RunState::Aborted {
            stage: StageId::Timeseries,
            ..
        }
    ));
    let signal_before = artifact_ref(&stopped, StageId::Signal);

    let resumed = run(
        ws.config(),
        "interrupted",
        RunOptions {
            resume: true,
            ..Default::default()
        },
    );
    assert!(resumed.is_completed(), "{}", resumed.state);
    assert_eq!(resumed.resumed_from, Some(StageId::Signal));
    assert_eq!(
        resumed.executed,
        vec![StageId::Timeseries, StageId::Integration, StageId::Pool]
    );

    assert_eq!(
        artifact_ref(&resumed, StageId::Timeseries).sha256,
        artifact_ref(&full, StageId::Timeseries).sha256
    );
    assert_eq!(resumed.pools, full.pools);

    // stage 3 was not recomputed
    let store = manager(&ws, &resumed);
    let latest = store.latest(StageId::Signal).unwrap().unwrap();
    assert_eq!(latest.output, Some(signal_before));
    assert_eq!(store.run_log().snapshots.len(), 6);
    assert_eq!(store.run_log().state, RunState::Completed);
}

#[test]
fn test_changed_input_is_not_resumed() {
    let ws = Workspace::new(&three_satellites());
    let stopped = run(
        ws.config(),
        "changed",
        RunOptions {
            stop_after: Some(StageId::Timeseries),
            ..Default::default()
        },
    );
    assert_eq!(stopped.executed.len(), 4);

    let mut tles = three_satellites();
    tles.push_str(&tle("INCLINED-2", 44716, 53.05, 120.0, 15.06));
    fs::write(ws.path().join("starlink.tle"), tles).unwrap();

    let resumed = run(
        ws.config(),
        "changed",
        RunOptions {
            resume: true,
            ..Default::default()
        },
    );
    assert!(resumed.is_completed());
    assert_eq!(resumed.resumed_from, None);
    assert_eq!(resumed.executed, StageId::ALL.to_vec());
    assert_ne!(resumed.input_fingerprint, stopped.input_fingerprint);
}

#[test]
fn test_zero_rain_signal_artifact_is_bit_identical() {
    let ws = Workspace::new(&three_satellites());
    let with_model = Config::from_yaml(
        &ws.config_yaml("  rain_rate_mm_h: 0.0\n  rain_attenuation: true"),
    )
    .unwrap();
    let without_model =
        Config::from_yaml(&ws.config_yaml("  rain_attenuation: false")).unwrap();
    let options = RunOptions {
        stop_after: Some(StageId::Signal),
        ..Default::default()
    };

    let a = run(with_model, "rain-model", options);
    let b = run(without_model, "no-rain-model", options);
    assert_ne!(a.input_fingerprint, b.input_fingerprint);
    assert_eq!(
        artifact_ref(&a, StageId::Signal).sha256,
        artifact_ref(&b, StageId::Signal).sha256
    );
}

#[test]
fn test_independent_pool_run_reuses_stage_five() {
    let ws = Workspace::new(&three_satellites());
    let full = run(ws.config(), "replan", RunOptions::default());
    assert!(full.is_completed());

    let mut config = ws.config();
    config.optimizer.seed = 2024;
    let replanned = run(
        config,
        "replan",
        RunOptions {
            only_stage: Some(StageId::Pool),
            ..Default::default()
        },
    );
    assert!(replanned.is_completed(), "{}", replanned.state);
    assert_eq!(replanned.executed, vec![StageId::Pool]);
    assert_eq!(replanned.snapshots.len(), 1);
    assert_eq!(replanned.snapshots[0].status, SnapshotStatus::Passed);
    assert_eq!(replanned.pools.unwrap().pools["starlink"].seed, 2024);

    let log = SnapshotManager::load_run_log(&ws.state_dir(), "replan").unwrap();
    assert_eq!(log.snapshots.len(), 7);
}

#[test]
fn test_status_is_observable_from_another_thread() {
    let ws = Workspace::new(&three_satellites());
    let config = ws.config();
    let input = ws.input(&config);
    let controller = Controller::new(config, Some("watched".into())).unwrap();
    let status = controller.status_handle();

    let watcher = thread::spawn(move || loop {
        let state = status.lock().unwrap().state.clone();
        if state.is_terminal() {
            return (state, status.lock().unwrap().completed.clone());
        }
        thread::sleep(Duration::from_millis(1));
    });

    let report = controller.run(&input, RunOptions::default()).unwrap();
    let (state, completed) = watcher.join().unwrap();
    assert_eq!(state, report.state);
    assert_eq!(completed, StageId::ALL.to_vec());
}
