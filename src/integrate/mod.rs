use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::FilterArtifact;
use crate::timeseries::{ConstellationDataset, TimeseriesArtifact};

pub const INTEGRATION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    DuplicateSatellite {
        norad_id: u32,
        constellations: Vec<String>,
    },
    CountMismatch {
        constellation: String,
        accepted: usize,
        assembled: usize,
        excluded: usize,
    },
    EpochMisaligned {
        constellation: String,
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },
    SpacingMismatch {
        constellation: String,
        norad_id: u32,
        expected_ms: i64,
    },
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyIssue::DuplicateSatellite {
                norad_id,
                constellations,
            } => write!(f, "satellite {} appears in {}", norad_id, constellations.join(", ")),
            ConsistencyIssue::CountMismatch {
                constellation,
                accepted,
                assembled,
                excluded,
            } => write!(
                f,
                "{}: {} assembled + {} excluded != {} accepted",
                constellation, assembled, excluded, accepted
            ),
            ConsistencyIssue::EpochMisaligned {
                constellation,
                expected,
                actual,
            } => write!(f, "{}: starts at {} instead of {}", constellation, actual, expected),
            ConsistencyIssue::SpacingMismatch {
                constellation,
                norad_id,
                expected_ms,
            } => write!(
                f,
                "{}: satellite {} not sampled every {} ms",
                constellation, norad_id, expected_ms
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstellationStatistics {
    pub loaded: usize,
    pub accepted: usize,
    pub assembled: usize,
    pub length_excluded: usize,
    pub sample_count: usize,
    pub visible_sample_ratio: f64,
    pub met_events: BTreeMap<String, usize>,
    pub data_volume_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub constellations: BTreeMap<String, ConstellationStatistics>,
    pub total_loaded: usize,
    pub total_accepted: usize,
    pub total_assembled: usize,
    pub total_data_volume_bytes: usize,
}

/// Persisted stage-5 artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedDataset {
    pub schema_version: u32,
    pub reference_epoch: DateTime<Utc>,
    pub datasets: BTreeMap<String, ConstellationDataset>,
    pub statistics: RunStatistics,
    pub issues: Vec<ConsistencyIssue>,
}

impl IntegratedDataset {
    pub fn series_count(&self) -> usize {
        self.datasets.values().map(|d| d.series.len()).sum()
    }
}

fn statistics_for(
    dataset: &ConstellationDataset,
    loaded: usize,
    accepted: usize,
    excluded: usize,
) -> Result<ConstellationStatistics, serde_json::Error> {
    let total_samples: usize = dataset.series.iter().map(|s| s.visibility.len()).sum();
    let visible_samples: usize = dataset
        .series
        .iter()
        .map(|s| s.visibility.iter().filter(|v| **v).count())
        .sum();

    let mut met_events = BTreeMap::new();
    for sample in dataset.series.iter().flat_map(|s| &s.samples) {
        for event in sample.events.iter().filter(|e| e.condition_met) {
            *met_events.entry(event.event_type.to_string()).or_insert(0) += 1;
        }
    }

    Ok(ConstellationStatistics {
        loaded,
        accepted,
        assembled: dataset.series.len(),
        length_excluded: excluded,
        sample_count: dataset.expected_length,
        visible_sample_ratio: if total_samples == 0 {
            0.0
        } else {
            visible_samples as f64 / total_samples as f64
        },
        met_events,
        data_volume_bytes: serde_json::to_vec(dataset)?.len(),
    })
}

fn alignment_issues(
    dataset: &ConstellationDataset,
    reference_epoch: DateTime<Utc>,
    interval_ms: i64,
) -> Vec<ConsistencyIssue> {
    let mut issues = Vec::new();
    let name = &dataset.constellation;

    if dataset.grid.start != reference_epoch {
        issues.push(ConsistencyIssue::EpochMisaligned {
            constellation: name.clone(),
            expected: reference_epoch,
            actual: dataset.grid.start,
        });
    }

    for series in &dataset.series {
        if let Some(first) = series.samples.first() {
            if first.timestamp != reference_epoch {
                issues.push(ConsistencyIssue::EpochMisaligned {
                    constellation: name.clone(),
                    expected: reference_epoch,
                    actual: first.timestamp,
                });
                continue;
            }
        }
        let regular = series
            .samples
            .windows(2)
            .all(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() == interval_ms);
        if !regular {
            issues.push(ConsistencyIssue::SpacingMismatch {
                constellation: name.clone(),
                norad_id: series.norad_id,
                expected_ms: interval_ms,
            });
        }
    }
    issues
}

/// Stage 5: merge the per-constellation datasets and check that they agree
/// with each other and with the filter's accepted counts.
pub fn integrate(
    timeseries: &TimeseriesArtifact,
    filter: &FilterArtifact,
    reference_epoch: DateTime<Utc>,
    intervals_ms: &BTreeMap<String, i64>,
) -> Result<IntegratedDataset, serde_json::Error> {
    let mut issues = Vec::new();

    let mut owners: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for (name, dataset) in &timeseries.datasets {
        for series in &dataset.series {
            owners.entry(series.norad_id).or_default().push(name.clone());
        }
    }
    for (norad_id, constellations) in owners {
        if constellations.len() > 1 {
            issues.push(ConsistencyIssue::DuplicateSatellite {
                norad_id,
                constellations,
            });
        }
    }

    let mut loaded: BTreeMap<&str, usize> = BTreeMap::new();
    for verdict in &filter.verdicts {
        *loaded.entry(verdict.constellation.as_str()).or_insert(0) += 1;
    }

    let mut statistics = RunStatistics::default();
    for (name, dataset) in &timeseries.datasets {
        let accepted = filter.accepted(name);
        let excluded = timeseries.excluded_count(name);
        if dataset.series.len() + excluded != accepted {
            issues.push(ConsistencyIssue::CountMismatch {
                constellation: name.clone(),
                accepted,
                assembled: dataset.series.len(),
                excluded,
            });
        }

        let interval_ms = intervals_ms
            .get(name)
            .copied()
            .unwrap_or(dataset.grid.interval_ms);
        issues.extend(alignment_issues(dataset, reference_epoch, interval_ms));

        let stats = statistics_for(
            dataset,
            loaded.get(name.as_str()).copied().unwrap_or(0),
            accepted,
            excluded,
        )?;
        statistics.total_loaded += stats.loaded;
        statistics.total_accepted += stats.accepted;
        statistics.total_assembled += stats.assembled;
        statistics.total_data_volume_bytes += stats.data_volume_bytes;
        statistics.constellations.insert(name.clone(), stats);
    }

    for name in filter.accepted_counts.keys() {
        if !timeseries.datasets.contains_key(name) && filter.accepted(name) > 0 {
            issues.push(ConsistencyIssue::CountMismatch {
                constellation: name.clone(),
                accepted: filter.accepted(name),
                assembled: 0,
                excluded: timeseries.excluded_count(name),
            });
        }
    }

    for issue in &issues {
        log::warn!("integration: {}", issue);
    }
    log::info!(
        "integrated {} constellations, {} series, {} bytes",
        statistics.constellations.len(),
        statistics.total_assembled,
        statistics.total_data_volume_bytes
    );

    Ok(IntegratedDataset {
        schema_version: INTEGRATION_SCHEMA_VERSION,
        reference_epoch,
        datasets: timeseries.datasets.clone(),
        statistics,
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterVerdict, FILTER_SCHEMA_VERSION};
    use crate::propagate::TimeGrid;
    use crate::timeseries::{
        CompactSample, ConstellationTimeSeries, SeriesSummary, TIMESERIES_SCHEMA_VERSION,
    };
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 9, 12, 0, 0).unwrap()
    }

    fn series(grid: &TimeGrid, norad_id: u32) -> ConstellationTimeSeries {
        ConstellationTimeSeries {
            norad_id,
            name: format!("SAT-{norad_id}"),
            visibility: (0..grid.sample_count).map(|k| k % 4 == 0).collect(),
            samples: grid
                .timestamps()
                .into_iter()
                .map(|timestamp| CompactSample {
                    timestamp,
                    elevation_deg: 20.0,
                    azimuth_deg: 100.0,
                    range_km: 1000.0,
                    ground_distance_km: 500.0,
                    received_power_dbm: -70.0,
                    rsrp_dbm: -100.8,
                    sinr_db: 10.0,
                    doppler_hz: 0.0,
                    events: vec![],
                })
                .collect(),
            summary: SeriesSummary {
                visible_steps: grid.sample_count / 4,
                peak_elevation_deg: 20.0,
                mean_visible_rsrp_dbm: Some(-100.8),
            },
        }
    }

    fn dataset(name: &str, ids: &[u32], count: usize) -> ConstellationDataset {
        let grid = TimeGrid::new(epoch(), std::time::Duration::from_secs(30), count);
        ConstellationDataset {
            constellation: name.into(),
            grid,
            expected_length: count,
            series: ids.iter().map(|&id| series(&grid, id)).collect(),
        }
    }

    fn filter_artifact(accepted: &[(&str, &[u32])]) -> FilterArtifact {
        let verdicts = accepted
            .iter()
            .flat_map(|(name, ids)| {
                ids.iter().map(move |&norad_id| FilterVerdict {
                    constellation: name.to_string(),
                    norad_id,
                    name: format!("SAT-{norad_id}"),
                    accepted: true,
                    reason: None,
                    detail: None,
                    daily_passes: Some(3.0),
                })
            })
            .collect();
        FilterArtifact {
            schema_version: FILTER_SCHEMA_VERSION,
            verdicts,
            accepted_counts: accepted
                .iter()
                .map(|(name, ids)| (name.to_string(), ids.len()))
                .collect(),
            rejected_counts: BTreeMap::new(),
        }
    }

    fn intervals() -> BTreeMap<String, i64> {
        BTreeMap::from([("starlink".into(), 30_000), ("oneweb".into(), 30_000)])
    }

    #[test]
    fn test_consistent_datasets_merge_cleanly() {
        let timeseries = TimeseriesArtifact {
            schema_version: TIMESERIES_SCHEMA_VERSION,
            datasets: BTreeMap::from([
                ("starlink".into(), dataset("starlink", &[1, 2], 192)),
                ("oneweb".into(), dataset("oneweb", &[10], 218)),
            ]),
            excluded: vec![],
        };
        let filter = filter_artifact(&[("starlink", &[1, 2][..]), ("oneweb", &[10][..])]);
        let integrated = integrate(&timeseries, &filter, epoch(), &intervals()).unwrap();

        assert!(integrated.issues.is_empty(), "{:?}", integrated.issues);
        assert_eq!(integrated.series_count(), 3);
        let stats = &integrated.statistics;
        assert_eq!(stats.total_accepted, 3);
        assert_eq!(stats.constellations["oneweb"].sample_count, 218);
        assert_eq!(stats.constellations["starlink"].visible_sample_ratio, 0.25);
        let starlink_bytes = serde_json::to_vec(&timeseries.datasets["starlink"])
            .unwrap()
            .len();
        assert_eq!(stats.constellations["starlink"].data_volume_bytes, starlink_bytes);
        assert_eq!(
            stats.total_data_volume_bytes,
            stats.constellations.values().map(|c| c.data_volume_bytes).sum::<usize>()
        );
    }

    #[test]
    fn test_duplicate_ids_and_count_mismatch_are_reported() {
        let timeseries = TimeseriesArtifact {
            schema_version: TIMESERIES_SCHEMA_VERSION,
            datasets: BTreeMap::from([
                ("starlink".into(), dataset("starlink", &[1, 2], 192)),
                ("oneweb".into(), dataset("oneweb", &[2], 218)),
            ]),
            excluded: vec![],
        };
        let filter = filter_artifact(&[("starlink", &[1, 2, 3][..]), ("oneweb", &[2][..])]);
        let issues = integrate(&timeseries, &filter, epoch(), &intervals())
            .unwrap()
            .issues;

        assert!(issues.contains(&ConsistencyIssue::DuplicateSatellite {
            norad_id: 2,
            constellations: vec!["oneweb".into(), "starlink".into()],
        }));
        assert!(issues.iter().any(|i| matches!(
            i,
            ConsistencyIssue::CountMismatch { constellation, accepted: 3, .. } if constellation == "starlink"
        )));
    }

    #[test]
    fn test_misaligned_epoch_is_reported() {
        let timeseries = TimeseriesArtifact {
            schema_version: TIMESERIES_SCHEMA_VERSION,
            datasets: BTreeMap::from([("starlink".into(), dataset("starlink", &[1], 192))]),
            excluded: vec![],
        };
        let filter = filter_artifact(&[("starlink", &[1][..])]);
        let later = epoch() + chrono::Duration::seconds(30);
        let issues = integrate(&timeseries, &filter, later, &intervals())
            .unwrap()
            .issues;
        assert!(matches!(issues[0], ConsistencyIssue::EpochMisaligned { .. }));
    }
}
