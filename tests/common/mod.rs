#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use leo_pool::config::Config;
use leo_pool::tle::PipelineInput;

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
pub fn tle(name: &str, norad: u32, inclination: f64, raan: f64, mean_motion: f64) -> String {
    let line1 = format!(
        "1 {:05}U 24001A   24100.50000000  .00001000  00000-0  10000-3 0  999",
        norad
    );
    let line2 = format!(
        "2 {:05} {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:5}",
        norad, inclination, raan, 1000, 0.0, raan, mean_motion, 1000
    );
    format!(
        "{}\n{}{}\n{}{}\n",
        name,
        line1,
        checksum(&line1),
        line2,
        checksum(&line2)
    )
}

/// Two satellites that reach 10 degrees over the NTPU reference point and one
/// near-equatorial satellite that never does.
pub fn three_satellites() -> String {
    [
        tle("INCLINED-1", 44713, 53.05, 10.0, 15.06),
        tle("POLAR-1", 44714, 87.9, 40.0, 13.1),
        tle("EQUATORIAL-1", 44715, 5.0, 80.0, 15.06),
    ]
    .concat()
}

pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new(tles: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("starlink.tle"), tles).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn config_yaml(&self, extra_signal: &str) -> String {
        format!(
            r#"
station:
  name: ntpu
  coordinates: "24.9441667, 121.3713889"
  altitude_m: 35.0
constellations:
  starlink:
    tle_path: {tle}
    sample_count: 192
    sample_interval: 30s
    min_elevation_deg: 10.0
    visible_target: {{ min: 1, max: 2 }}
signal:
  rain_height_km: 4.8
{extra_signal}
optimizer:
  seed: 11
  max_iterations: 500
pipeline:
  state_dir: {state}
  reference_epoch: 2024-04-09T12:00:00Z
"#,
            tle = self.dir.path().join("starlink.tle").display(),
            state = self.state_dir().display(),
        )
    }

    pub fn config(&self) -> Config {
        Config::from_yaml(&self.config_yaml("")).unwrap()
    }

    pub fn input(&self, config: &Config) -> PipelineInput {
        PipelineInput::load(config).unwrap()
    }
}
