use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::StageId;
use crate::config::{PipelineConfig, ValidationLevel};
use crate::filter::{FilterArtifact, ReasonCode, FILTER_SCHEMA_VERSION};
use crate::integrate::{ConsistencyIssue, IntegratedDataset, INTEGRATION_SCHEMA_VERSION};
use crate::pool::{PoolArtifact, POOL_SCHEMA_VERSION};
use crate::propagate::PropagationOutput;
use crate::signal::{EventType, SignalArtifact, SIGNAL_SCHEMA_VERSION};
use crate::timeseries::{TimeseriesArtifact, TIMESERIES_SCHEMA_VERSION};
use crate::tle::PipelineInput;

/// Series inspected per check at the fast validation level.
const FAST_SAMPLE: usize = 10;

/// How bad a failed check is. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    /// Reported, never blocks.
    Warning,
    /// The stage may continue with reduced output if it is tolerant.
    Degradable,
    /// Worth another attempt.
    Transient,
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    pub severity: Severity,
    pub passed: bool,
    pub detail: String,
}

impl GateCheck {
    pub fn new(name: &str, severity: Severity, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            severity,
            passed,
            detail: detail.into(),
        }
    }

    pub fn failed(name: &str, severity: Severity, detail: impl Into<String>) -> Self {
        Self::new(name, severity, false, detail)
    }

    pub fn blocks(&self) -> bool {
        !self.passed && self.severity != Severity::Warning
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub stage: StageId,
    pub checks: Vec<GateCheck>,
}

impl GateVerdict {
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            checks: Vec::new(),
        }
    }

    pub fn push(&mut self, check: GateCheck) {
        self.checks.push(check);
    }

    pub fn passed(&self) -> bool {
        !self.checks.iter().any(GateCheck::blocks)
    }

    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| c.blocks())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Warning)
    }

    pub fn worst(&self) -> Option<Severity> {
        self.failures().map(|c| c.severity).max()
    }
}

/// Runs the post-stage checks. Checks only read stage output.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    level: ValidationLevel,
    max_exclusion_ratio: f64,
    min_accepted: usize,
    expected_lengths: BTreeMap<String, usize>,
}

fn schema_check(found: u32, expected: u32) -> GateCheck {
    GateCheck::new(
        "schema_version",
        Severity::Invariant,
        found == expected,
        format!("schema {} (expected {})", found, expected),
    )
}

impl Gatekeeper {
    pub fn new(pipeline: &PipelineConfig, expected_lengths: BTreeMap<String, usize>) -> Self {
        Self {
            level: pipeline.validation_level,
            max_exclusion_ratio: pipeline.max_exclusion_ratio,
            min_accepted: pipeline.min_accepted,
            expected_lengths,
        }
    }

    fn sample_limit(&self) -> usize {
        match self.level {
            ValidationLevel::Fast => FAST_SAMPLE,
            _ => usize::MAX,
        }
    }

    fn comprehensive(&self) -> bool {
        self.level == ValidationLevel::Comprehensive
    }

    /// Exclusions within the ratio degrade, anything beyond is fatal.
    fn exclusion_check(&self, name: &str, worst: Option<(String, usize, usize)>) -> GateCheck {
        match worst {
            Some((constellation, excluded, population)) if excluded > 0 => {
                let ratio = excluded as f64 / population.max(1) as f64;
                let severity = if ratio <= self.max_exclusion_ratio {
                    Severity::Degradable
                } else {
                    Severity::Invariant
                };
                GateCheck::failed(
                    name,
                    severity,
                    format!(
                        "{}: {} of {} excluded ({:.1}%)",
                        constellation,
                        excluded,
                        population,
                        ratio * 100.0
                    ),
                )
            }
            _ => GateCheck::new(name, Severity::Degradable, true, "nothing excluded"),
        }
    }

    pub fn check_propagation(
        &self,
        input: &PipelineInput,
        output: &PropagationOutput,
    ) -> GateVerdict {
        let mut verdict = GateVerdict::new(StageId::Propagation);
        let limit = self.sample_limit();

        verdict.push(GateCheck::new(
            "records_loaded",
            Severity::Invariant,
            input.record_count() > 0,
            format!("{} records loaded", input.record_count()),
        ));

        let missing: Vec<&String> = self
            .expected_lengths
            .keys()
            .filter(|name| !output.grids.contains_key(*name))
            .collect();
        verdict.push(GateCheck::new(
            "grids_configured",
            Severity::Invariant,
            missing.is_empty(),
            format!("missing grids: {:?}", missing),
        ));

        let mut bad_length = Vec::new();
        let mut misaligned = Vec::new();
        let mut non_finite = Vec::new();
        for (name, tracks) in &output.tracks {
            let Some(grid) = output.grids.get(name) else {
                continue;
            };
            let expected = self
                .expected_lengths
                .get(name)
                .copied()
                .unwrap_or(grid.sample_count);
            for track in tracks.iter().take(limit) {
                let id = track.record.norad_id;
                if track.states.len() != expected {
                    bad_length.push(id);
                    continue;
                }
                let aligned = track
                    .states
                    .iter()
                    .enumerate()
                    .all(|(k, s)| s.timestamp == grid.at(k));
                if !aligned {
                    misaligned.push(id);
                }
                if self.comprehensive() && !track.states.iter().all(|s| s.is_finite()) {
                    non_finite.push(id);
                }
            }
        }
        verdict.push(GateCheck::new(
            "series_length",
            Severity::Invariant,
            bad_length.is_empty(),
            format!("wrong length: {:?}", bad_length),
        ));
        verdict.push(GateCheck::new(
            "grid_alignment",
            Severity::Invariant,
            misaligned.is_empty(),
            format!("off grid: {:?}", misaligned),
        ));
        if self.comprehensive() {
            verdict.push(GateCheck::new(
                "finite_states",
                Severity::Invariant,
                non_finite.is_empty(),
                format!("non-finite: {:?}", non_finite),
            ));
        }

        let worst = input
            .constellations
            .iter()
            .map(|(name, records)| {
                let malformed = input.malformed_count(name);
                let excluded = malformed + output.failure_count(name);
                (name.clone(), excluded, records.len() + malformed)
            })
            .max_by(|a, b| {
                let ra = a.1 as f64 / a.2.max(1) as f64;
                let rb = b.1 as f64 / b.2.max(1) as f64;
                ra.total_cmp(&rb)
            });
        verdict.push(self.exclusion_check("excluded_records", worst));

        verdict
    }

    pub fn check_filter(&self, input: &PipelineInput, artifact: &FilterArtifact) -> GateVerdict {
        let mut verdict = GateVerdict::new(StageId::Filter);

        verdict.push(schema_check(artifact.schema_version, FILTER_SCHEMA_VERSION));

        let expected: BTreeSet<(&str, u32)> = input
            .records()
            .map(|r| (r.constellation.as_str(), r.norad_id))
            .collect();
        let seen: BTreeSet<(&str, u32)> = artifact
            .verdicts
            .iter()
            .map(|v| (v.constellation.as_str(), v.norad_id))
            .collect();
        verdict.push(GateCheck::new(
            "verdict_coverage",
            Severity::Invariant,
            seen == expected && artifact.verdicts.len() == expected.len(),
            format!(
                "{} verdicts for {} records",
                artifact.verdicts.len(),
                expected.len()
            ),
        ));

        let inconsistent = artifact
            .verdicts
            .iter()
            .filter(|v| !v.is_consistent())
            .count();
        verdict.push(GateCheck::new(
            "single_reason",
            Severity::Invariant,
            inconsistent == 0,
            format!("{} verdicts without exactly one outcome", inconsistent),
        ));

        let short: Vec<String> = self
            .expected_lengths
            .keys()
            .filter(|name| artifact.accepted(name) < self.min_accepted)
            .map(|name| format!("{} ({})", name, artifact.accepted(name)))
            .collect();
        verdict.push(GateCheck::new(
            "accepted_population",
            Severity::Invariant,
            short.is_empty(),
            format!("below {} accepted: {}", self.min_accepted, short.join(", ")),
        ));

        let malformed_key = ReasonCode::MalformedParameters.to_string();
        let malformed: usize = artifact
            .rejected_counts
            .values()
            .filter_map(|m| m.get(&malformed_key))
            .sum();
        verdict.push(GateCheck::new(
            "malformed_rejections",
            Severity::Warning,
            malformed == 0,
            format!("{} rejected as {}", malformed, malformed_key),
        ));

        verdict
    }

    pub fn check_signal(&self, filter: &FilterArtifact, artifact: &SignalArtifact) -> GateVerdict {
        let mut verdict = GateVerdict::new(StageId::Signal);
        let limit = self.sample_limit();

        verdict.push(schema_check(artifact.schema_version, SIGNAL_SCHEMA_VERSION));

        let accepted: usize = filter.accepted_counts.values().sum();
        verdict.push(GateCheck::new(
            "series_present",
            Severity::Invariant,
            artifact.series_count() == accepted,
            format!("{} series for {} accepted", artifact.series_count(), accepted),
        ));

        let mut incomplete = Vec::new();
        let mut non_finite = Vec::new();
        for series in artifact.all_series().take(limit) {
            let complete = series.samples.iter().all(|s| {
                s.events.len() == EventType::ALL.len()
                    && s.events
                        .iter()
                        .zip(EventType::ALL)
                        .all(|(e, t)| e.event_type == t)
            });
            if !complete {
                incomplete.push(series.norad_id);
            }
            if self.level != ValidationLevel::Fast && !series.is_finite() {
                non_finite.push(series.norad_id);
            }
        }
        verdict.push(GateCheck::new(
            "event_schema",
            Severity::Invariant,
            incomplete.is_empty(),
            format!("samples missing events: {:?}", incomplete),
        ));
        verdict.push(GateCheck::new(
            "finite_values",
            Severity::Invariant,
            non_finite.is_empty(),
            format!("non-finite series: {:?}", non_finite),
        ));

        verdict
    }

    pub fn check_timeseries(
        &self,
        filter: &FilterArtifact,
        artifact: &TimeseriesArtifact,
    ) -> GateVerdict {
        let mut verdict = GateVerdict::new(StageId::Timeseries);
        let limit = self.sample_limit();

        verdict.push(schema_check(artifact.schema_version, TIMESERIES_SCHEMA_VERSION));

        let worst = artifact
            .datasets
            .iter()
            .map(|(name, d)| {
                let excluded = artifact.excluded_count(name);
                (name.clone(), excluded, excluded + d.series.len())
            })
            .max_by(|a, b| {
                let ra = a.1 as f64 / a.2.max(1) as f64;
                let rb = b.1 as f64 / b.2.max(1) as f64;
                ra.total_cmp(&rb)
            });
        verdict.push(self.exclusion_check("excluded_series", worst));

        let mut wrong = Vec::new();
        for (name, dataset) in &artifact.datasets {
            let expected = self
                .expected_lengths
                .get(name)
                .copied()
                .unwrap_or(dataset.expected_length);
            if dataset.expected_length != expected {
                wrong.push(format!("{} expects {}", name, dataset.expected_length));
            }
            for series in dataset.series.iter().take(limit) {
                if series.len() != expected || series.visibility.len() != expected {
                    wrong.push(format!("{}/{}", name, series.norad_id));
                }
            }
        }
        verdict.push(GateCheck::new(
            "series_length",
            Severity::Invariant,
            wrong.is_empty(),
            format!("wrong length: {}", wrong.join(", ")),
        ));

        let empty: Vec<&String> = filter
            .accepted_counts
            .iter()
            .filter(|(name, n)| {
                **n > 0 && artifact.datasets.get(*name).map_or(true, |d| d.series.is_empty())
            })
            .map(|(name, _)| name)
            .collect();
        verdict.push(GateCheck::new(
            "dataset_non_empty",
            Severity::Invariant,
            empty.is_empty(),
            format!("no series left: {:?}", empty),
        ));

        verdict
    }

    pub fn check_integration(&self, dataset: &IntegratedDataset) -> GateVerdict {
        let mut verdict = GateVerdict::new(StageId::Integration);

        verdict.push(schema_check(dataset.schema_version, INTEGRATION_SCHEMA_VERSION));

        let mut duplicates = Vec::new();
        let mut counts = Vec::new();
        let mut alignment = Vec::new();
        for issue in &dataset.issues {
            match issue {
                ConsistencyIssue::DuplicateSatellite { .. } => duplicates.push(issue.to_string()),
                ConsistencyIssue::CountMismatch { .. } => counts.push(issue.to_string()),
                ConsistencyIssue::EpochMisaligned { .. }
                | ConsistencyIssue::SpacingMismatch { .. } => alignment.push(issue.to_string()),
            }
        }
        for (name, found) in [
            ("no_duplicates", duplicates),
            ("count_reconciliation", counts),
            ("epoch_alignment", alignment),
        ] {
            verdict.push(GateCheck::new(
                name,
                Severity::Invariant,
                found.is_empty(),
                found.join("; "),
            ));
        }

        verdict
    }

    pub fn check_pool(&self, dataset: &IntegratedDataset, artifact: &PoolArtifact) -> GateVerdict {
        let mut verdict = GateVerdict::new(StageId::Pool);

        verdict.push(schema_check(artifact.schema_version, POOL_SCHEMA_VERSION));

        let missing: Vec<&String> = dataset
            .datasets
            .keys()
            .filter(|name| !artifact.pools.contains_key(*name))
            .collect();
        verdict.push(GateCheck::new(
            "pool_per_constellation",
            Severity::Invariant,
            missing.is_empty(),
            format!("no pool for {:?}", missing),
        ));

        let mut strangers = Vec::new();
        let mut bad_ratio = Vec::new();
        let mut unmet = Vec::new();
        for (name, pool) in &artifact.pools {
            let candidates: BTreeSet<u32> = dataset
                .datasets
                .get(name)
                .map(|d| d.series.iter().map(|s| s.norad_id).collect())
                .unwrap_or_default();
            strangers.extend(
                pool.selected_ids
                    .iter()
                    .filter(|id| !candidates.contains(id))
                    .map(|id| format!("{}/{}", name, id)),
            );
            if !(0.0..=1.0).contains(&pool.coverage_ratio) {
                bad_ratio.push(name.clone());
            }
            if !pool.target_met {
                unmet.push(format!("{} ({:.3})", name, pool.coverage_ratio));
            }
        }
        verdict.push(GateCheck::new(
            "pool_subset",
            Severity::Invariant,
            strangers.is_empty(),
            format!("not candidates: {}", strangers.join(", ")),
        ));
        verdict.push(GateCheck::new(
            "ratio_range",
            Severity::Invariant,
            bad_ratio.is_empty(),
            format!("ratio outside [0, 1]: {:?}", bad_ratio),
        ));
        verdict.push(GateCheck::new(
            "coverage_target",
            Severity::Warning,
            unmet.is_empty(),
            format!("coverage goal missed: {}", unmet.join(", ")),
        ));

        verdict
    }
}
