use std::collections::BTreeMap;

use crate::config::Config;
use crate::tle::{PipelineInput, SatelliteRecord};

fn checksum(line: &str) -> u32 {
    line.chars()
        .map(|c| match c {
            '0'..='9' => c.to_digit(10).unwrap_or(0),
            '-' => 1,
            _ => 0,
        })
        .sum::<u32>()
        % 10
}

/// Near-circular element set at epoch 2024-04-09T12:00:00Z.
pub fn tle_lines(norad: u32, inclination: f64, raan: f64, mean_motion: f64) -> (String, String) {
    tle_lines_with(norad, inclination, raan, 0.0001, raan, mean_motion)
}

pub fn tle_lines_with(
    norad: u32,
    inclination: f64,
    raan: f64,
    eccentricity: f64,
    mean_anomaly: f64,
    mean_motion: f64,
) -> (String, String) {
    let line1 = format!(
        "1 {:05}U 24001A   24100.50000000  .00001000  00000-0  10000-3 0  999",
        norad
    );
    let line2 = format!(
        "2 {:05} {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:5}",
        norad,
        inclination,
        raan,
        (eccentricity * 1e7).round() as u64,
        0.0,
        mean_anomaly,
        mean_motion,
        1000
    );
    let line1 = format!("{}{}", line1, checksum(&line1));
    let line2 = format!("{}{}", line2, checksum(&line2));
    (line1, line2)
}

pub fn record(constellation: &str, norad: u32, inclination: f64, raan: f64, mean_motion: f64) -> SatelliteRecord {
    let (l1, l2) = tle_lines(norad, inclination, raan, mean_motion);
    SatelliteRecord::from_tle(constellation, Some(format!("SAT-{norad}")), &l1, &l2)
        .expect("synthetic TLE parses")
}

pub fn input(records: Vec<SatelliteRecord>) -> PipelineInput {
    let mut constellations: BTreeMap<String, Vec<SatelliteRecord>> = BTreeMap::new();
    for r in records {
        constellations.entry(r.constellation.clone()).or_default().push(r);
    }
    PipelineInput {
        constellations,
        malformed: Vec::new(),
    }
}

/// Single-constellation configuration around the NTPU reference point.
pub fn config(state_dir: &std::path::Path) -> Config {
    let yaml = format!(
        r#"
station:
  name: ntpu
  coordinates: "24.9441667, 121.3713889"
  altitude_m: 35.0
constellations:
  starlink:
    tle_path: /dev/null
    sample_count: 192
    sample_interval: 30s
    min_elevation_deg: 10.0
    visible_target: {{ min: 1, max: 3 }}
pipeline:
  state_dir: {}
  reference_epoch: 2024-04-09T12:00:00Z
optimizer:
  seed: 7
  max_iterations: 400
"#,
        state_dir.display()
    );
    Config::from_yaml(&yaml).expect("test config parses")
}
