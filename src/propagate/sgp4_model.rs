use sgp4::{Constants, Elements};

use super::{OrbitalState, PropagateError, Propagator, TimeGrid};
use crate::tle::SatelliteRecord;

/// Full SGP4/SDP4 model from the `sgp4` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sgp4Propagator;

impl Propagator for Sgp4Propagator {
    fn name(&self) -> &'static str {
        "sgp4"
    }

    fn propagate(
        &self,
        record: &SatelliteRecord,
        grid: &TimeGrid,
    ) -> Result<Vec<OrbitalState>, PropagateError> {
        let elements = Elements::from_tle(
            Some(record.name.clone()),
            record.line1.as_bytes(),
            record.line2.as_bytes(),
        )?;
        let constants = Constants::from_elements(&elements)?;

        grid.timestamps()
            .into_iter()
            .map(|timestamp| {
                let minutes = elements
                    .datetime_to_minutes_since_epoch(&timestamp.naive_utc())
                    .map_err(|e| PropagateError::Epoch(e.to_string()))?;
                let prediction = constants.propagate(minutes)?;
                Ok(OrbitalState {
                    timestamp,
                    position_km: prediction.position,
                    velocity_km_s: prediction.velocity,
                })
            })
            .collect()
    }
}
