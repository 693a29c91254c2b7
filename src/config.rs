use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::geometry::GroundStation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid station coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    pub constellations: BTreeMap<String, ConstellationConfig>,
    #[serde(default)]
    pub propagator: PropagatorKind,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    pub coordinates: String,
    #[serde(default)]
    pub altitude_m: f64,
}

impl StationConfig {
    pub fn ground_station(&self) -> Result<GroundStation, ConfigError> {
        GroundStation::from_coordinates(&self.coordinates, Some(self.altitude_m))
            .ok_or_else(|| ConfigError::InvalidCoordinates(self.coordinates.clone()))
    }
}

/// Which propagation model stage 1 uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagatorKind {
    #[default]
    Sgp4,
    KeplerJ2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstellationConfig {
    pub tle_path: PathBuf,
    pub sample_count: usize,
    #[serde(with = "duration_str")]
    pub sample_interval: Duration,
    pub min_elevation_deg: f64,
    pub visible_target: VisibleTarget,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub pass_rate_band: PassRateBand,
    #[serde(default)]
    pub sample_limit: Option<usize>,
}

impl ConstellationConfig {
    pub fn covered_period(&self) -> Duration {
        self.sample_interval * self.sample_count as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleTarget {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub frequency_ghz: f64,
    pub eirp_dbw: f64,
    pub rx_gain_dbi: f64,
    pub bandwidth_mhz: f64,
    pub resource_blocks: u32,
    pub noise_figure_db: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            frequency_ghz: 12.0,
            eirp_dbw: 37.5,
            rx_gain_dbi: 35.0,
            bandwidth_mhz: 20.0,
            resource_blocks: 100,
            noise_figure_db: 7.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PassRateBand {
    pub min_daily: f64,
    pub max_daily: f64,
}

impl Default for PassRateBand {
    fn default() -> Self {
        Self {
            min_daily: 1.0,
            max_daily: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub a4: A4Config,
    pub d1: DistanceEventConfig,
    pub d2: DistanceEventConfig,
    pub t1: T1Config,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            a4: A4Config::default(),
            d1: DistanceEventConfig::default(),
            d2: DistanceEventConfig::nadir_defaults(),
            t1: T1Config::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct A4Config {
    pub threshold_dbm: f64,
    pub hysteresis_db: f64,
    /// Ofn + Ocn.
    pub offset_db: f64,
    #[serde(with = "duration_str")]
    pub time_to_trigger: Duration,
}

impl Default for A4Config {
    fn default() -> Self {
        Self {
            threshold_dbm: -100.0,
            hysteresis_db: 2.0,
            offset_db: 0.0,
            time_to_trigger: Duration::from_millis(160),
        }
    }
}

/// Shared shape of the D1 (slant range) and D2 (nadir distance) events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceEventConfig {
    pub threshold1_km: f64,
    pub threshold2_km: f64,
    pub hysteresis_km: f64,
    #[serde(with = "duration_str")]
    pub time_to_trigger: Duration,
}

impl Default for DistanceEventConfig {
    fn default() -> Self {
        Self {
            threshold1_km: 1000.0,
            threshold2_km: 800.0,
            hysteresis_km: 20.0,
            time_to_trigger: Duration::from_millis(320),
        }
    }
}

impl DistanceEventConfig {
    pub fn nadir_defaults() -> Self {
        Self {
            threshold1_km: 800.0,
            threshold2_km: 500.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct T1Config {
    #[serde(with = "duration_str")]
    pub threshold: Duration,
    #[serde(with = "duration_str")]
    pub duration: Duration,
    #[serde(with = "duration_str")]
    pub time_to_trigger: Duration,
}

impl Default for T1Config {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(300),
            duration: Duration::from_secs(60),
            time_to_trigger: Duration::from_millis(160),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rain_rate_mm_h: f64,
    pub rain_height_km: f64,
    pub rain_attenuation: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rain_rate_mm_h: 0.0,
            rain_height_km: 4.8,
            rain_attenuation: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub seed: u64,
    pub initial_temperature: f64,
    pub cooling_rate: f64,
    pub min_temperature: f64,
    pub max_iterations: usize,
    pub plateau_tolerance: usize,
    pub coverage_goal: f64,
    /// Worsening moves whose Metropolis probability falls below this are rejected outright.
    pub acceptance_floor: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            initial_temperature: 2.0,
            cooling_rate: 0.995,
            min_temperature: 1e-3,
            max_iterations: 10_000,
            plateau_tolerance: 2_000,
            coverage_goal: 0.95,
            acceptance_floor: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Fast,
    #[default]
    Standard,
    Comprehensive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub state_dir: PathBuf,
    pub max_retries: u32,
    pub tolerant_stages: Vec<u8>,
    pub validation_level: ValidationLevel,
    pub workers: Option<usize>,
    pub reference_epoch: Option<DateTime<Utc>>,
    /// Largest excluded share of a population a tolerant stage may degrade over.
    pub max_exclusion_ratio: f64,
    pub min_accepted: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            max_retries: 2,
            tolerant_stages: vec![1, 2, 4],
            validation_level: ValidationLevel::Standard,
            workers: None,
            reference_epoch: None,
            max_exclusion_ratio: 0.5,
            min_accepted: 1,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        self.station.ground_station()?;
        if self.constellations.is_empty() {
            return invalid("no constellations configured".into());
        }
        for (name, c) in &self.constellations {
            if c.sample_count == 0 {
                return invalid(format!("{name}: sample_count must be positive"));
            }
            if c.sample_interval.is_zero() {
                return invalid(format!("{name}: sample_interval must be positive"));
            }
            if !(0.0..90.0).contains(&c.min_elevation_deg) {
                return invalid(format!("{name}: min_elevation_deg out of range"));
            }
            if c.visible_target.min > c.visible_target.max {
                return invalid(format!("{name}: visible_target min exceeds max"));
            }
            if !(1.0..=100.0).contains(&c.link.frequency_ghz) {
                return invalid(format!("{name}: frequency_ghz out of range"));
            }
            if c.pass_rate_band.min_daily > c.pass_rate_band.max_daily {
                return invalid(format!("{name}: pass_rate_band min exceeds max"));
            }
        }
        if let Some(bad) = self
            .pipeline
            .tolerant_stages
            .iter()
            .find(|s| !(1..=6).contains(*s))
        {
            return invalid(format!("tolerant stage {bad} does not exist"));
        }
        if !(0.0..1.0).contains(&self.optimizer.cooling_rate) || self.optimizer.cooling_rate == 0.0
        {
            return invalid("optimizer cooling_rate must be in (0, 1)".into());
        }
        Ok(())
    }

    pub fn station(&self) -> Result<GroundStation, ConfigError> {
        self.station.ground_station()
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
station:
  name: ntpu
  coordinates: "24.9441667, 121.3713889"
  altitude_m: 35.0
constellations:
  starlink:
    tle_path: data/starlink.tle
    sample_count: 192
    sample_interval: 30s
    min_elevation_deg: 5.0
    visible_target: { min: 10, max: 15 }
  oneweb:
    tle_path: data/oneweb.tle
    sample_count: 218
    sample_interval: 30s
    min_elevation_deg: 10.0
    visible_target: { min: 3, max: 6 }
    events:
      a4:
        threshold_dbm: -105.0
        time_to_trigger: 640ms
propagator: kepler_j2
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        let starlink = &config.constellations["starlink"];
        let oneweb = &config.constellations["oneweb"];

        assert_eq!(starlink.covered_period(), Duration::from_secs(96 * 60));
        assert_eq!(oneweb.covered_period(), Duration::from_secs(109 * 60));
        assert_eq!(config.propagator, PropagatorKind::KeplerJ2);
        assert_eq!(oneweb.events.a4.threshold_dbm, -105.0);
        assert_eq!(oneweb.events.a4.time_to_trigger, Duration::from_millis(640));
        assert_eq!(oneweb.events.a4.hysteresis_db, 2.0);
        assert_eq!(config.pipeline.tolerant_stages, vec![1, 2, 4]);
        assert_eq!(config.optimizer.seed, 42);
        assert_eq!(config.station().unwrap().latitude_deg, 24.9441667);
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        let text = serde_yaml::to_string(&config).unwrap();
        let again = Config::from_yaml(&text).unwrap();
        assert_eq!(
            again.constellations["oneweb"].events.a4.time_to_trigger,
            Duration::from_millis(640)
        );
    }

    #[test]
    fn test_rejects_inverted_target() {
        let yaml = YAML.replace("{ min: 3, max: 6 }", "{ min: 7, max: 6 }");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_station() {
        let yaml = YAML.replace("24.9441667, 121.3713889", "north");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::InvalidCoordinates(_))
        ));
    }
}
