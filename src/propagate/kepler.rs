use std::f64::consts::TAU;

use super::{OrbitalState, PropagateError, Propagator, TimeGrid};
use crate::tle::{OrbitalElements, SatelliteRecord};

const MU_KM3_S2: f64 = 398_600.4418;
const EARTH_RADIUS_KM: f64 = 6378.137;
const J2: f64 = 1.082_626_68e-3;
const KEPLER_TOLERANCE: f64 = 1e-12;
const KEPLER_MAX_ITERATIONS: usize = 50;

/// Two-body motion with J2 secular drift of RAAN, argument of perigee and
/// mean anomaly. Used where a lighter model than SGP4 is wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeplerJ2Propagator;

struct SecularRates {
    raan: f64,
    argp: f64,
    mean_anomaly: f64,
}

fn secular_rates(elements: &OrbitalElements) -> SecularRates {
    let n = elements.mean_motion_rad_s();
    let a = elements.semi_major_axis_km();
    let e2 = elements.eccentricity * elements.eccentricity;
    let p = a * (1.0 - e2);
    let inc = elements.inclination_deg.to_radians();
    let sin2 = inc.sin().powi(2);
    let factor = 1.5 * J2 * (EARTH_RADIUS_KM / p).powi(2) * n;

    SecularRates {
        raan: -factor * inc.cos(),
        argp: factor * (2.0 - 2.5 * sin2),
        mean_anomaly: n + factor * (1.0 - e2).sqrt() * (1.0 - 1.5 * sin2),
    }
}

fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let mut e_anom = if eccentricity < 0.8 {
        mean_anomaly
    } else {
        std::f64::consts::PI
    };
    for _ in 0..KEPLER_MAX_ITERATIONS {
        let delta = (e_anom - eccentricity * e_anom.sin() - mean_anomaly)
            / (1.0 - eccentricity * e_anom.cos());
        e_anom -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            break;
        }
    }
    e_anom
}

fn validate(elements: &OrbitalElements) -> Result<(), PropagateError> {
    if !elements.all_finite() {
        return Err(PropagateError::InvalidElements("non-finite element".into()));
    }
    if !(0.0..1.0).contains(&elements.eccentricity) {
        return Err(PropagateError::InvalidElements(format!(
            "eccentricity {} outside [0, 1)",
            elements.eccentricity
        )));
    }
    if elements.mean_motion <= 0.0 {
        return Err(PropagateError::InvalidElements(format!(
            "mean motion {} not positive",
            elements.mean_motion
        )));
    }
    Ok(())
}

impl Propagator for KeplerJ2Propagator {
    fn name(&self) -> &'static str {
        "kepler_j2"
    }

    fn propagate(
        &self,
        record: &SatelliteRecord,
        grid: &TimeGrid,
    ) -> Result<Vec<OrbitalState>, PropagateError> {
        let elements = &record.elements;
        validate(elements)?;

        let rates = secular_rates(elements);
        let a = elements.semi_major_axis_km();
        let e = elements.eccentricity;
        let inc = elements.inclination_deg.to_radians();
        let (sin_i, cos_i) = inc.sin_cos();
        let root = (1.0 - e * e).sqrt();

        let states = grid
            .timestamps()
            .into_iter()
            .map(|timestamp| {
                let dt = (timestamp - elements.epoch).num_milliseconds() as f64 / 1000.0;
                let raan = elements.raan_deg.to_radians() + rates.raan * dt;
                let argp = elements.argument_of_perigee_deg.to_radians() + rates.argp * dt;
                let mean = (elements.mean_anomaly_deg.to_radians() + rates.mean_anomaly * dt)
                    .rem_euclid(TAU);

                let ecc_anom = solve_kepler(mean, e);
                let (sin_e, cos_e) = ecc_anom.sin_cos();
                let radius = a * (1.0 - e * cos_e);

                // perifocal frame
                let xp = a * (cos_e - e);
                let yp = a * root * sin_e;
                let speed = (MU_KM3_S2 * a).sqrt() / radius;
                let vxp = -speed * sin_e;
                let vyp = speed * root * cos_e;

                let (sin_o, cos_o) = raan.sin_cos();
                let (sin_w, cos_w) = argp.sin_cos();
                let p = [
                    cos_o * cos_w - sin_o * sin_w * cos_i,
                    sin_o * cos_w + cos_o * sin_w * cos_i,
                    sin_w * sin_i,
                ];
                let q = [
                    -cos_o * sin_w - sin_o * cos_w * cos_i,
                    -sin_o * sin_w + cos_o * cos_w * cos_i,
                    cos_w * sin_i,
                ];

                OrbitalState {
                    timestamp,
                    position_km: [
                        xp * p[0] + yp * q[0],
                        xp * p[1] + yp * q[1],
                        xp * p[2] + yp * q[2],
                    ],
                    velocity_km_s: [
                        vxp * p[0] + vyp * q[0],
                        vxp * p[1] + vyp * q[1],
                        vxp * p[2] + vyp * q[2],
                    ],
                }
            })
            .collect();

        Ok(states)
    }
}
