use std::collections::BTreeMap;

use rayon::prelude::*;

use super::events::{EventEvaluator, EventInput, ServingReference};
use super::link_budget::{doppler_shift_hz, LinkBudget};
use super::rain::RainModel;
use super::types::{ObservationSample, SignalArtifact, SignalSample, SignalSeries, SIGNAL_SCHEMA_VERSION};
use super::SignalError;
use crate::config::{Config, ConfigError, EventConfig, LinkConfig, SignalConfig};
use crate::filter::FilterOutput;
use crate::geometry::{
    gmst, ground_distance_km, look_angles, nadir_point, teme_to_ecef_position,
    teme_to_ecef_velocity, GroundStation,
};
use crate::propagate::{SatelliteTrack, TimeGrid};

#[derive(Debug, Clone)]
struct SignalProfile {
    min_elevation_deg: f64,
    link: LinkConfig,
    events: EventConfig,
}

/// Stage 3: link budget and measurement events for every accepted satellite.
#[derive(Debug, Clone)]
pub struct SignalAnalyzer {
    station: GroundStation,
    signal: SignalConfig,
    profiles: BTreeMap<String, SignalProfile>,
}

impl SignalAnalyzer {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let profiles = config
            .constellations
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    SignalProfile {
                        min_elevation_deg: c.min_elevation_deg,
                        link: c.link.clone(),
                        events: c.events.clone(),
                    },
                )
            })
            .collect();

        Ok(Self {
            station: config.station()?,
            signal: config.signal.clone(),
            profiles,
        })
    }

    fn budget(&self, link: &LinkConfig) -> LinkBudget {
        let rain = self
            .signal
            .rain_attenuation
            .then(|| RainModel::new(self.signal.rain_height_km, self.station.altitude_km()));
        LinkBudget::new(link.clone(), rain, self.signal.rain_rate_mm_h)
    }

    fn observe(
        &self,
        track: &SatelliteTrack,
        min_elevation_deg: f64,
        budget: &LinkBudget,
    ) -> Vec<ObservationSample> {
        let station_ecef = self.station.position_ecef_km();

        track
            .states
            .iter()
            .map(|state| {
                let theta = gmst(state.timestamp);
                let sat_ecef = teme_to_ecef_position(state.position_km, theta);
                let sat_vel = teme_to_ecef_velocity(state.position_km, state.velocity_km_s, theta);
                let look = look_angles(&self.station, sat_ecef);

                let dr = [
                    sat_ecef[0] - station_ecef[0],
                    sat_ecef[1] - station_ecef[1],
                    sat_ecef[2] - station_ecef[2],
                ];
                let range_rate_km_s = if look.range_km > 0.0 {
                    (sat_vel[0] * dr[0] + sat_vel[1] * dr[1] + sat_vel[2] * dr[2]) / look.range_km
                } else {
                    0.0
                };

                let nadir = nadir_point(sat_ecef);
                let ground_distance = ground_distance_km(
                    self.station.latitude_deg,
                    self.station.longitude_deg,
                    nadir.latitude_deg,
                    nadir.longitude_deg,
                );

                ObservationSample {
                    timestamp: state.timestamp,
                    azimuth_deg: look.azimuth_deg,
                    elevation_deg: look.elevation_deg,
                    range_km: look.range_km,
                    range_rate_km_s,
                    doppler_hz: doppler_shift_hz(budget.frequency_hz(), range_rate_km_s),
                    nadir_latitude_deg: nadir.latitude_deg,
                    nadir_longitude_deg: nadir.longitude_deg,
                    ground_distance_km: ground_distance,
                    visible: look.elevation_deg >= min_elevation_deg,
                    link: budget.evaluate(look.range_km, look.elevation_deg),
                }
            })
            .collect()
    }

    fn analyze_constellation(
        &self,
        name: &str,
        tracks: &[SatelliteTrack],
        grid: &TimeGrid,
    ) -> Result<Vec<SignalSeries>, SignalError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| SignalError::UnknownConstellation(name.to_string()))?;
        let budget = self.budget(&profile.link);

        let observed: Vec<(&SatelliteTrack, Vec<ObservationSample>)> = tracks
            .par_iter()
            .map(|track| (track, self.observe(track, profile.min_elevation_deg, &budget)))
            .collect();

        let serving = serving_references(&observed, grid.sample_count);

        let series = observed
            .par_iter()
            .map(|(track, observations)| {
                let mut evaluator = EventEvaluator::new(&profile.events);
                let mut run_start: Option<usize> = None;
                let samples = observations
                    .iter()
                    .enumerate()
                    .map(|(k, obs)| {
                        run_start = if obs.visible { run_start.or(Some(k)) } else { None };
                        let in_view_s = run_start
                            .map_or(0.0, |start| (k - start) as f64 * grid.interval_seconds());
                        let input = EventInput {
                            at_ms: grid.interval_ms * k as i64,
                            visible: obs.visible,
                            rsrp_dbm: obs.link.rsrp_dbm,
                            range_km: obs.range_km,
                            ground_distance_km: obs.ground_distance_km,
                            in_view_s,
                        };
                        let reference = serving.get(k).and_then(Option::as_ref);
                        SignalSample {
                            observation: *obs,
                            events: evaluator.step(track.record.norad_id, &input, reference),
                        }
                    })
                    .collect();

                SignalSeries {
                    constellation: name.to_string(),
                    norad_id: track.record.norad_id,
                    name: track.record.name.clone(),
                    samples,
                }
            })
            .collect();

        Ok(series)
    }

    pub fn run(&self, filtered: &FilterOutput) -> Result<SignalArtifact, SignalError> {
        let mut series = BTreeMap::new();

        for (name, tracks) in &filtered.accepted {
            let grid = filtered
                .grids
                .get(name)
                .ok_or_else(|| SignalError::MissingGrid(name.clone()))?;
            let analyzed = self.analyze_constellation(name, tracks, grid)?;
            let met: usize = analyzed
                .iter()
                .flat_map(|s| &s.samples)
                .flat_map(|s| &s.events)
                .filter(|e| e.condition_met)
                .count();
            log::info!(
                "[{}] analyzed {} series, {} met event samples",
                name,
                analyzed.len(),
                met
            );
            series.insert(name.clone(), analyzed);
        }

        Ok(SignalArtifact {
            schema_version: SIGNAL_SCHEMA_VERSION,
            grids: filtered.grids.clone(),
            series,
        })
    }
}

/// Highest visible satellite per sample; ties go to the lower catalog number.
fn serving_references(
    observed: &[(&SatelliteTrack, Vec<ObservationSample>)],
    sample_count: usize,
) -> Vec<Option<ServingReference>> {
    (0..sample_count)
        .map(|k| {
            let mut best: Option<(u32, &ObservationSample)> = None;
            for (track, observations) in observed {
                let Some(obs) = observations.get(k).filter(|o| o.visible) else {
                    continue;
                };
                let id = track.record.norad_id;
                let better = match best {
                    None => true,
                    Some((best_id, best_obs)) => {
                        obs.elevation_deg > best_obs.elevation_deg
                            || (obs.elevation_deg == best_obs.elevation_deg && id < best_id)
                    }
                };
                if better {
                    best = Some((id, obs));
                }
            }
            best.map(|(norad_id, obs)| ServingReference {
                norad_id,
                range_km: obs.range_km,
                ground_distance_km: obs.ground_distance_km,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::VisibilityFilter;
    use crate::propagate::{propagate_constellations, Sgp4Propagator};
    use crate::signal::events::EventType;
    use crate::testutil::{config, input, record};

    fn filtered(config: &Config) -> FilterOutput {
        let input = input(vec![
            record("starlink", 44713, 53.05, 10.0, 15.06),
            record("starlink", 44714, 53.05, 40.0, 15.06),
            record("starlink", 44715, 87.9, 200.0, 13.1),
        ]);
        let start = TimeGrid::resolve_start(config, &input).unwrap();
        let grids = config
            .constellations
            .iter()
            .map(|(name, c)| (name.clone(), TimeGrid::for_constellation(start, c)))
            .collect();
        let propagation = propagate_constellations(&Sgp4Propagator, &input, &grids);
        VisibilityFilter::from_config(config)
            .unwrap()
            .run(&input, &propagation)
    }

    #[test]
    fn test_every_sample_carries_all_event_types() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let artifact = SignalAnalyzer::from_config(&config)
            .unwrap()
            .run(&filtered(&config))
            .unwrap();

        assert_eq!(artifact.schema_version, SIGNAL_SCHEMA_VERSION);
        assert_eq!(artifact.series_count(), 3);
        for series in artifact.all_series() {
            assert_eq!(series.samples.len(), 192);
            assert!(series.is_finite());
            for sample in &series.samples {
                let types: Vec<_> = sample.events.iter().map(|e| e.event_type).collect();
                assert_eq!(types, EventType::ALL.to_vec());
                assert_eq!(
                    sample.observation.visible,
                    sample.observation.elevation_deg >= 10.0
                );
            }
        }
    }

    #[test]
    fn test_zero_rain_equals_no_atmospheric_term() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        let input = filtered(&config);

        config.signal.rain_rate_mm_h = 0.0;
        config.signal.rain_attenuation = true;
        let with_rain = SignalAnalyzer::from_config(&config).unwrap().run(&input).unwrap();

        config.signal.rain_attenuation = false;
        let without = SignalAnalyzer::from_config(&config).unwrap().run(&input).unwrap();

        assert_eq!(with_rain, without);
        assert_eq!(
            serde_json::to_vec(&with_rain).unwrap(),
            serde_json::to_vec(&without).unwrap()
        );
    }

    #[test]
    fn test_rain_only_changes_atmospheric_component() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        let input = filtered(&config);
        let dry = SignalAnalyzer::from_config(&config).unwrap().run(&input).unwrap();
        config.signal.rain_rate_mm_h = 25.0;
        let wet = SignalAnalyzer::from_config(&config).unwrap().run(&input).unwrap();

        for (d, w) in dry.all_series().zip(wet.all_series()) {
            for (ds, ws) in d.samples.iter().zip(&w.samples) {
                assert_eq!(
                    ds.observation.link.free_space_power_dbm,
                    ws.observation.link.free_space_power_dbm
                );
                assert!(ws.observation.link.atmospheric_loss_db > 0.0);
                assert!(ws.observation.link.received_power_dbm < ds.observation.link.received_power_dbm);
            }
        }
    }

    #[test]
    fn test_serving_reference_prefers_highest_then_lowest_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let filtered = filtered(&config);
        let tracks = &filtered.accepted["starlink"];
        let analyzer = SignalAnalyzer::from_config(&config).unwrap();
        let budget = analyzer.budget(&LinkConfig::default());

        let mut observed: Vec<_> = tracks
            .iter()
            .map(|t| (t, analyzer.observe(t, 10.0, &budget)))
            .collect();
        // force a tie on the first sample
        for (_, obs) in observed.iter_mut() {
            obs[0].visible = true;
            obs[0].elevation_deg = 45.0;
        }
        let serving = serving_references(&observed, 192);
        assert_eq!(serving[0].map(|s| s.norad_id), Some(44713));

        for (k, reference) in serving.iter().enumerate().skip(1) {
            let best = observed
                .iter()
                .filter(|(_, o)| o[k].visible)
                .map(|(_, o)| o[k].elevation_deg)
                .fold(f64::NEG_INFINITY, f64::max);
            match reference {
                Some(r) => {
                    let (_, obs) = observed
                        .iter()
                        .find(|(t, _)| t.record.norad_id == r.norad_id)
                        .unwrap();
                    assert_eq!(obs[k].elevation_deg, best);
                }
                None => assert_eq!(best, f64::NEG_INFINITY),
            }
        }
    }
}
