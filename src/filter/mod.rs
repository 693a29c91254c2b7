mod types;

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

pub use types::{FilterArtifact, FilterOutput, FilterVerdict, ReasonCode, FILTER_SCHEMA_VERSION};

use crate::config::{Config, ConfigError, PassRateBand};
use crate::geometry::{coverage_half_angle_deg, GroundStation};
use crate::propagate::PropagationOutput;
use crate::tle::{OrbitalElements, PipelineInput, SatelliteRecord};

#[derive(Debug, Clone, Copy)]
struct ConstellationLimits {
    min_elevation_deg: f64,
    pass_rate_band: PassRateBand,
}

/// Cheap geometric screen run over the whole population before signal analysis.
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    station: GroundStation,
    limits: BTreeMap<String, ConstellationLimits>,
}

/// Highest sub-satellite latitude an orbit reaches.
fn effective_inclination(inclination_deg: f64) -> f64 {
    if inclination_deg > 90.0 {
        180.0 - inclination_deg
    } else {
        inclination_deg
    }
}

fn malformed_reason(elements: &OrbitalElements) -> Option<String> {
    if !elements.all_finite() {
        return Some("non-finite orbital element".into());
    }
    if !(0.0..1.0).contains(&elements.eccentricity) {
        return Some(format!("eccentricity {} outside [0, 1)", elements.eccentricity));
    }
    if !(0.0..=180.0).contains(&elements.inclination_deg) {
        return Some(format!(
            "inclination {} outside [0, 180]",
            elements.inclination_deg
        ));
    }
    if elements.mean_motion <= 0.0 {
        return Some(format!("mean motion {} not positive", elements.mean_motion));
    }
    if elements.mean_altitude_km() <= 0.0 {
        return Some(format!(
            "mean altitude {:.1} km below the surface",
            elements.mean_altitude_km()
        ));
    }
    None
}

/// Expected passes per day over a station at `latitude_deg`.
///
/// Revolutions per day times latitude crossings per revolution times the
/// share of the latitude circle covered by the access cap.
pub fn estimate_daily_passes(
    elements: &OrbitalElements,
    latitude_deg: f64,
    min_elevation_deg: f64,
) -> f64 {
    let lambda = coverage_half_angle_deg(elements.mean_altitude_km(), min_elevation_deg);
    if lambda <= 0.0 {
        return 0.0;
    }
    let phi = latitude_deg.abs();
    let i_eff = effective_inclination(elements.inclination_deg);

    let crossings = if phi <= i_eff {
        2.0
    } else {
        ((lambda - (phi - i_eff)) / lambda).max(0.0)
    };

    let cos_phi = phi.to_radians().cos();
    let longitude_share = if cos_phi <= f64::EPSILON {
        1.0
    } else {
        (2.0 * lambda / (360.0 * cos_phi)).min(1.0)
    };

    elements.mean_motion * crossings * longitude_share
}

impl VisibilityFilter {
    pub fn new(station: GroundStation) -> Self {
        Self {
            station,
            limits: BTreeMap::new(),
        }
    }

    pub fn with_constellation(
        mut self,
        name: &str,
        min_elevation_deg: f64,
        pass_rate_band: PassRateBand,
    ) -> Self {
        self.limits.insert(
            name.to_string(),
            ConstellationLimits {
                min_elevation_deg,
                pass_rate_band,
            },
        );
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let filter = config.constellations.iter().fold(
            Self::new(config.station()?),
            |filter, (name, c)| filter.with_constellation(name, c.min_elevation_deg, c.pass_rate_band),
        );
        Ok(filter)
    }

    /// Checks run in a fixed order and the first failure is the only reason.
    pub fn evaluate(&self, record: &SatelliteRecord, propagation_failed: bool) -> FilterVerdict {
        let mut verdict = FilterVerdict {
            constellation: record.constellation.clone(),
            norad_id: record.norad_id,
            name: record.name.clone(),
            accepted: false,
            reason: None,
            detail: None,
            daily_passes: None,
        };
        let reject = |mut v: FilterVerdict, reason: ReasonCode, detail: String| {
            v.reason = Some(reason);
            v.detail = Some(detail);
            v
        };

        let Some(limits) = self.limits.get(&record.constellation) else {
            return reject(
                verdict,
                ReasonCode::MalformedParameters,
                "constellation has no configuration".into(),
            );
        };
        let elements = &record.elements;

        if let Some(detail) = malformed_reason(elements) {
            return reject(verdict, ReasonCode::MalformedParameters, detail);
        }
        if propagation_failed {
            return reject(
                verdict,
                ReasonCode::MalformedParameters,
                "propagation failed".into(),
            );
        }

        let latitude = self.station.latitude_deg.abs();
        let reach = effective_inclination(elements.inclination_deg)
            + coverage_half_angle_deg(elements.mean_altitude_km(), limits.min_elevation_deg);
        if latitude > reach {
            return reject(
                verdict,
                ReasonCode::InclinationInfeasible,
                format!("reachable latitude {:.2} below station {:.2}", reach, latitude),
            );
        }

        let passes = estimate_daily_passes(elements, latitude, limits.min_elevation_deg);
        verdict.daily_passes = Some(passes);
        let band = limits.pass_rate_band;
        if passes < band.min_daily || passes > band.max_daily {
            return reject(
                verdict,
                ReasonCode::PassRateOutOfBand,
                format!(
                    "{:.2} passes/day outside [{}, {}]",
                    passes, band.min_daily, band.max_daily
                ),
            );
        }

        verdict.accepted = true;
        verdict
    }

    /// Stage 2: one verdict per loaded record; accepted tracks move on.
    pub fn run(&self, input: &PipelineInput, propagation: &PropagationOutput) -> FilterOutput {
        let records: Vec<&SatelliteRecord> = input.records().collect();
        let verdicts: Vec<FilterVerdict> = records
            .par_iter()
            .map(|record| {
                let failed = propagation.is_failed(&record.constellation, record.norad_id);
                self.evaluate(record, failed)
            })
            .collect();

        let keep: HashMap<(&str, u32), bool> = verdicts
            .iter()
            .map(|v| ((v.constellation.as_str(), v.norad_id), v.accepted))
            .collect();

        let mut accepted = BTreeMap::new();
        for (constellation, tracks) in &propagation.tracks {
            let kept: Vec<_> = tracks
                .iter()
                .filter(|t| {
                    keep.get(&(constellation.as_str(), t.record.norad_id))
                        .copied()
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            accepted.insert(constellation.clone(), kept);
        }

        for v in verdicts.iter().filter(|v| !v.accepted) {
            log::debug!(
                "[{}] rejected {} ({}): {}",
                v.constellation,
                v.norad_id,
                v.reason.map(|r| r.to_string()).unwrap_or_default(),
                v.detail.as_deref().unwrap_or("")
            );
        }
        for (name, tracks) in &accepted {
            log::info!(
                "[{}] filter accepted {} of {}",
                name,
                tracks.len(),
                input.constellations.get(name).map_or(0, Vec::len)
            );
        }

        FilterOutput {
            grids: propagation.grids.clone(),
            verdicts,
            accepted,
        }
    }
}
