use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::snapshot::sha256_hex;
use super::SnapshotError;
use crate::config::{
    Config, ConstellationConfig, EventConfig, LinkConfig, PassRateBand, PropagatorKind,
    SignalConfig, StationConfig,
};
use crate::tle::PipelineInput;

#[derive(Serialize)]
struct FingerprintSource<'a> {
    station: &'a StationConfig,
    propagator: PropagatorKind,
    signal: &'a SignalConfig,
    reference_epoch: Option<DateTime<Utc>>,
    constellations: BTreeMap<&'a str, Constellation<'a>>,
}

/// The constellation settings stages 1 to 5 read. `visible_target` only
/// steers the optimizer and `tle_path` is covered by the element lines.
#[derive(Serialize)]
struct StageSettings<'a> {
    sample_count: usize,
    sample_interval_ms: u64,
    min_elevation_deg: f64,
    link: &'a LinkConfig,
    events: &'a EventConfig,
    pass_rate_band: &'a PassRateBand,
    sample_limit: Option<usize>,
}

impl<'a> From<&'a ConstellationConfig> for StageSettings<'a> {
    fn from(c: &'a ConstellationConfig) -> Self {
        Self {
            sample_count: c.sample_count,
            sample_interval_ms: c.sample_interval.as_millis() as u64,
            min_elevation_deg: c.min_elevation_deg,
            link: &c.link,
            events: &c.events,
            pass_rate_band: &c.pass_rate_band,
            sample_limit: c.sample_limit,
        }
    }
}

#[derive(Serialize)]
struct Constellation<'a> {
    settings: StageSettings<'a>,
    /// Element lines ordered by catalog number.
    elements: Vec<(u32, &'a str, &'a str)>,
    malformed: usize,
}

/// SHA-256 over everything that shapes stages 1 to 5: the element sets and
/// the configuration they are read with. Optimizer settings and runtime
/// knobs are left out, so pools can be re-planned on top of old snapshots.
pub fn input_fingerprint(config: &Config, input: &PipelineInput) -> Result<String, SnapshotError> {
    let constellations = config
        .constellations
        .iter()
        .map(|(name, c)| {
            let mut elements: Vec<(u32, &str, &str)> = input
                .constellations
                .get(name)
                .map(|records| {
                    records
                        .iter()
                        .map(|r| (r.norad_id, r.line1.as_str(), r.line2.as_str()))
                        .collect()
                })
                .unwrap_or_default();
            elements.sort_unstable();
            (
                name.as_str(),
                Constellation {
                    settings: c.into(),
                    elements,
                    malformed: input.malformed_count(name),
                },
            )
        })
        .collect();

    let source = FingerprintSource {
        station: &config.station,
        propagator: config.propagator,
        signal: &config.signal,
        reference_epoch: config.pipeline.reference_epoch,
        constellations,
    };
    Ok(sha256_hex(&serde_json::to_vec(&source)?))
}
