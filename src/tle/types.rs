use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sgp4::Elements;

use crate::tle::TleError;

const MU_EARTH_KM3_S2: f64 = 398_600.4418;
const EARTH_RADIUS_KM: f64 = 6378.137;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    pub epoch: DateTime<Utc>,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub argument_of_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    /// Revolutions per day.
    pub mean_motion: f64,
    pub drag_term: f64,
}

impl OrbitalElements {
    pub fn from_sgp4(elements: &Elements) -> Self {
        Self {
            epoch: Utc.from_utc_datetime(&elements.datetime),
            inclination_deg: elements.inclination,
            raan_deg: elements.right_ascension,
            eccentricity: elements.eccentricity,
            argument_of_perigee_deg: elements.argument_of_perigee,
            mean_anomaly_deg: elements.mean_anomaly,
            mean_motion: elements.mean_motion,
            drag_term: elements.drag_term,
        }
    }

    pub fn period_minutes(&self) -> f64 {
        1440.0 / self.mean_motion
    }

    /// Mean motion in rad/s.
    pub fn mean_motion_rad_s(&self) -> f64 {
        self.mean_motion * 2.0 * PI / 86_400.0
    }

    pub fn semi_major_axis_km(&self) -> f64 {
        let n = self.mean_motion_rad_s();
        (MU_EARTH_KM3_S2 / (n * n)).cbrt()
    }

    pub fn mean_altitude_km(&self) -> f64 {
        self.semi_major_axis_km() - EARTH_RADIUS_KM
    }

    pub fn all_finite(&self) -> bool {
        [
            self.inclination_deg,
            self.raan_deg,
            self.eccentricity,
            self.argument_of_perigee_deg,
            self.mean_anomaly_deg,
            self.mean_motion,
            self.drag_term,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// One satellite's element set as loaded for a run. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteRecord {
    pub norad_id: u32,
    pub name: String,
    pub constellation: String,
    pub elements: OrbitalElements,
    pub line1: String,
    pub line2: String,
}

impl SatelliteRecord {
    pub fn from_tle(
        constellation: &str,
        name: Option<String>,
        line1: &str,
        line2: &str,
    ) -> Result<Self, TleError> {
        let elements = Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes())?;
        let norad_id = u32::try_from(elements.norad_id)
            .map_err(|_| TleError::CatalogNumber(elements.norad_id))?;
        let name = name.unwrap_or_else(|| format!("NORAD {}", norad_id));

        Ok(Self {
            norad_id,
            name,
            constellation: constellation.to_string(),
            elements: OrbitalElements::from_sgp4(&elements),
            line1: line1.to_string(),
            line2: line2.to_string(),
        })
    }
}

/// An entry that could not be parsed into a [`SatelliteRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedTle {
    pub constellation: String,
    pub source: String,
    pub line_number: usize,
    pub catalog_number: Option<u32>,
    pub message: String,
}

/// The snapshot of orbital elements one pipeline run operates on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineInput {
    pub constellations: BTreeMap<String, Vec<SatelliteRecord>>,
    pub malformed: Vec<MalformedTle>,
}

impl PipelineInput {
    pub fn record_count(&self) -> usize {
        self.constellations.values().map(Vec::len).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &SatelliteRecord> {
        self.constellations.values().flatten()
    }

    pub fn newest_epoch(&self) -> Option<DateTime<Utc>> {
        self.records().map(|r| r.elements.epoch).max()
    }

    pub fn malformed_count(&self, constellation: &str) -> usize {
        self.malformed
            .iter()
            .filter(|m| m.constellation == constellation)
            .count()
    }
}
