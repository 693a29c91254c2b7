use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::MeasurementEvent;
use super::link_budget::LinkSample;
use crate::propagate::TimeGrid;

pub const SIGNAL_SCHEMA_VERSION: u32 = 1;

/// Geometry and link budget of one satellite at one instant, seen from the
/// ground station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationSample {
    pub timestamp: DateTime<Utc>,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub range_rate_km_s: f64,
    pub doppler_hz: f64,
    pub nadir_latitude_deg: f64,
    pub nadir_longitude_deg: f64,
    pub ground_distance_km: f64,
    pub visible: bool,
    pub link: LinkSample,
}

impl ObservationSample {
    pub fn is_finite(&self) -> bool {
        [
            self.azimuth_deg,
            self.elevation_deg,
            self.range_km,
            self.range_rate_km_s,
            self.doppler_hz,
            self.nadir_latitude_deg,
            self.nadir_longitude_deg,
            self.ground_distance_km,
            self.link.fspl_db,
            self.link.atmospheric_loss_db,
            self.link.free_space_power_dbm,
            self.link.received_power_dbm,
            self.link.rsrp_dbm,
            self.link.sinr_db,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub observation: ObservationSample,
    pub events: Vec<MeasurementEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    pub constellation: String,
    pub norad_id: u32,
    pub name: String,
    pub samples: Vec<SignalSample>,
}

impl SignalSeries {
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| {
            s.observation.is_finite() && s.events.iter().all(|e| e.measured.is_finite())
        })
    }
}

/// Persisted stage-3 artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalArtifact {
    pub schema_version: u32,
    pub grids: BTreeMap<String, TimeGrid>,
    pub series: BTreeMap<String, Vec<SignalSeries>>,
}

impl SignalArtifact {
    pub fn series_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn all_series(&self) -> impl Iterator<Item = &SignalSeries> {
        self.series.values().flatten()
    }
}
