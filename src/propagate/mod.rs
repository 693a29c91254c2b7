mod error;
mod grid;
mod kepler;
mod sgp4_model;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use error::PropagateError;
pub use grid::TimeGrid;
pub use kepler::KeplerJ2Propagator;
pub use sgp4_model::Sgp4Propagator;

use crate::config::PropagatorKind;
use crate::tle::{PipelineInput, SatelliteRecord};

/// Position and velocity in TEME, km and km/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalState {
    pub timestamp: DateTime<Utc>,
    pub position_km: [f64; 3],
    pub velocity_km_s: [f64; 3],
}

impl OrbitalState {
    pub fn is_finite(&self) -> bool {
        self.position_km
            .iter()
            .chain(self.velocity_km_s.iter())
            .all(|v| v.is_finite())
    }

    pub fn radius_km(&self) -> f64 {
        let p = self.position_km;
        (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
    }
}

/// A propagation model. Implementations must be pure over `(record, grid)`.
pub trait Propagator: Send + Sync {
    fn name(&self) -> &'static str;

    fn propagate(
        &self,
        record: &SatelliteRecord,
        grid: &TimeGrid,
    ) -> Result<Vec<OrbitalState>, PropagateError>;
}

pub fn build(kind: PropagatorKind) -> Box<dyn Propagator> {
    match kind {
        PropagatorKind::Sgp4 => Box::new(Sgp4Propagator),
        PropagatorKind::KeplerJ2 => Box::new(KeplerJ2Propagator),
    }
}

#[derive(Debug, Clone)]
pub struct SatelliteTrack {
    pub record: SatelliteRecord,
    pub states: Vec<OrbitalState>,
}

/// A record excluded during propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationFailure {
    pub constellation: String,
    pub norad_id: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PropagationOutput {
    pub propagator: String,
    pub grids: BTreeMap<String, TimeGrid>,
    pub tracks: BTreeMap<String, Vec<SatelliteTrack>>,
    pub failures: Vec<PropagationFailure>,
}

impl PropagationOutput {
    pub fn track_count(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    pub fn failure_count(&self, constellation: &str) -> usize {
        self.failures
            .iter()
            .filter(|f| f.constellation == constellation)
            .count()
    }

    pub fn is_failed(&self, constellation: &str, norad_id: u32) -> bool {
        self.failures
            .iter()
            .any(|f| f.constellation == constellation && f.norad_id == norad_id)
    }
}

fn propagate_record(
    propagator: &dyn Propagator,
    record: &SatelliteRecord,
    grid: &TimeGrid,
) -> Result<Vec<OrbitalState>, PropagateError> {
    let states = propagator.propagate(record, grid)?;
    if let Some(index) = states.iter().position(|s| !s.is_finite()) {
        return Err(PropagateError::NonFinite(index));
    }
    Ok(states)
}

/// Stage 1: propagate every record over its constellation's grid. Records
/// that fail are reported and left out; the batch always completes.
pub fn propagate_constellations(
    propagator: &dyn Propagator,
    input: &PipelineInput,
    grids: &BTreeMap<String, TimeGrid>,
) -> PropagationOutput {
    let mut output = PropagationOutput {
        propagator: propagator.name().to_string(),
        grids: grids.clone(),
        ..Default::default()
    };

    for (constellation, records) in &input.constellations {
        let Some(grid) = grids.get(constellation) else {
            log::error!("[{}] no time grid configured", constellation);
            output
                .failures
                .extend(records.iter().map(|r| PropagationFailure {
                    constellation: constellation.clone(),
                    norad_id: r.norad_id,
                    reason: PropagateError::MissingGrid(constellation.clone()).to_string(),
                }));
            continue;
        };

        let results: Vec<_> = records
            .par_iter()
            .map(|record| (record, propagate_record(propagator, record, grid)))
            .collect();

        let mut tracks = Vec::with_capacity(results.len());
        for (record, result) in results {
            match result {
                Ok(states) => tracks.push(SatelliteTrack {
                    record: record.clone(),
                    states,
                }),
                Err(e) => {
                    log::warn!(
                        "[{}] excluding {} ({}): {}",
                        constellation,
                        record.norad_id,
                        record.name,
                        e
                    );
                    output.failures.push(PropagationFailure {
                        constellation: constellation.clone(),
                        norad_id: record.norad_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "[{}] propagated {} satellites x {} samples with {}",
            constellation,
            tracks.len(),
            grid.sample_count,
            propagator.name()
        );
        output.tracks.insert(constellation.clone(), tracks);
    }

    output
}
