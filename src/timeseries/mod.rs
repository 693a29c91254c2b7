use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::propagate::TimeGrid;
use crate::signal::{MeasurementEvent, SignalArtifact, SignalSeries};

pub const TIMESERIES_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactSample {
    pub timestamp: DateTime<Utc>,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    pub ground_distance_km: f64,
    pub received_power_dbm: f64,
    pub rsrp_dbm: f64,
    pub sinr_db: f64,
    pub doppler_hz: f64,
    /// Only events that are met or changing state.
    pub events: Vec<MeasurementEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub visible_steps: usize,
    pub peak_elevation_deg: f64,
    pub mean_visible_rsrp_dbm: Option<f64>,
}

/// One satellite's fixed-length series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstellationTimeSeries {
    pub norad_id: u32,
    pub name: String,
    pub visibility: Vec<bool>,
    pub samples: Vec<CompactSample>,
    pub summary: SeriesSummary,
}

impl ConstellationTimeSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| {
            [
                s.elevation_deg,
                s.azimuth_deg,
                s.range_km,
                s.ground_distance_km,
                s.received_power_dbm,
                s.rsrp_dbm,
                s.sinr_db,
                s.doppler_hz,
            ]
            .iter()
            .all(|v| v.is_finite())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstellationDataset {
    pub constellation: String,
    pub grid: TimeGrid,
    pub expected_length: usize,
    pub series: Vec<ConstellationTimeSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthMismatch {
    pub constellation: String,
    pub norad_id: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Persisted stage-4 artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesArtifact {
    pub schema_version: u32,
    pub datasets: BTreeMap<String, ConstellationDataset>,
    pub excluded: Vec<LengthMismatch>,
}

impl TimeseriesArtifact {
    pub fn series_count(&self) -> usize {
        self.datasets.values().map(|d| d.series.len()).sum()
    }

    pub fn excluded_count(&self, constellation: &str) -> usize {
        self.excluded
            .iter()
            .filter(|m| m.constellation == constellation)
            .count()
    }
}

fn compact(series: &SignalSeries) -> ConstellationTimeSeries {
    let visibility: Vec<bool> = series.samples.iter().map(|s| s.observation.visible).collect();

    let visible_rsrp: Vec<f64> = series
        .samples
        .iter()
        .filter(|s| s.observation.visible)
        .map(|s| s.observation.link.rsrp_dbm)
        .collect();
    let summary = SeriesSummary {
        visible_steps: visible_rsrp.len(),
        peak_elevation_deg: series
            .samples
            .iter()
            .map(|s| s.observation.elevation_deg)
            .fold(f64::NEG_INFINITY, f64::max),
        mean_visible_rsrp_dbm: (!visible_rsrp.is_empty())
            .then(|| visible_rsrp.iter().sum::<f64>() / visible_rsrp.len() as f64),
    };

    let samples = series
        .samples
        .iter()
        .map(|s| {
            let o = &s.observation;
            CompactSample {
                timestamp: o.timestamp,
                elevation_deg: o.elevation_deg,
                azimuth_deg: o.azimuth_deg,
                range_km: o.range_km,
                ground_distance_km: o.ground_distance_km,
                received_power_dbm: o.link.received_power_dbm,
                rsrp_dbm: o.link.rsrp_dbm,
                sinr_db: o.link.sinr_db,
                doppler_hz: o.doppler_hz,
                events: s.events.iter().filter(|e| e.is_active()).copied().collect(),
            }
        })
        .collect();

    ConstellationTimeSeries {
        norad_id: series.norad_id,
        name: series.name.clone(),
        visibility,
        samples,
        summary,
    }
}

/// Stage 4: check every series against its constellation's configured
/// length and reshape the survivors. Mismatches are excluded and counted,
/// never truncated or padded.
pub fn assemble(
    signal: &SignalArtifact,
    expected_lengths: &BTreeMap<String, usize>,
) -> TimeseriesArtifact {
    let mut datasets = BTreeMap::new();
    let mut excluded = Vec::new();

    for (name, series) in &signal.series {
        let Some(grid) = signal.grids.get(name).copied() else {
            log::error!("[{}] no time grid, dropping {} series", name, series.len());
            continue;
        };
        let expected = expected_lengths
            .get(name)
            .copied()
            .unwrap_or(grid.sample_count);

        let mut kept = Vec::with_capacity(series.len());
        for s in series {
            if s.samples.len() != expected {
                log::warn!(
                    "[{}] excluding {}: series length {} != {}",
                    name,
                    s.norad_id,
                    s.samples.len(),
                    expected
                );
                excluded.push(LengthMismatch {
                    constellation: name.clone(),
                    norad_id: s.norad_id,
                    expected,
                    actual: s.samples.len(),
                });
                continue;
            }
            kept.push(compact(s));
        }

        log::info!("[{}] assembled {} series of {} samples", name, kept.len(), expected);
        datasets.insert(
            name.clone(),
            ConstellationDataset {
                constellation: name.clone(),
                grid,
                expected_length: expected,
                series: kept,
            },
        );
    }

    TimeseriesArtifact {
        schema_version: TIMESERIES_SCHEMA_VERSION,
        datasets,
        excluded,
    }
}
