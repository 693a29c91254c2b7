use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::propagate::{SatelliteTrack, TimeGrid};

pub const FILTER_SCHEMA_VERSION: u32 = 1;

/// Why a satellite was rejected. Exactly one per rejected satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReasonCode {
    MalformedParameters,
    InclinationInfeasible,
    PassRateOutOfBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterVerdict {
    pub constellation: String,
    pub norad_id: u32,
    pub name: String,
    pub accepted: bool,
    pub reason: Option<ReasonCode>,
    pub detail: Option<String>,
    pub daily_passes: Option<f64>,
}

impl FilterVerdict {
    pub fn is_consistent(&self) -> bool {
        self.accepted == self.reason.is_none()
    }
}

/// Persisted stage-2 artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterArtifact {
    pub schema_version: u32,
    pub verdicts: Vec<FilterVerdict>,
    pub accepted_counts: BTreeMap<String, usize>,
    pub rejected_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl FilterArtifact {
    pub fn accepted(&self, constellation: &str) -> usize {
        self.accepted_counts.get(constellation).copied().unwrap_or(0)
    }
}

/// In-memory stage-2 output: verdicts plus the propagated tracks of the
/// accepted satellites.
#[derive(Debug, Clone, Default)]
pub struct FilterOutput {
    pub grids: BTreeMap<String, TimeGrid>,
    pub verdicts: Vec<FilterVerdict>,
    pub accepted: BTreeMap<String, Vec<SatelliteTrack>>,
}

impl FilterOutput {
    pub fn accepted_count(&self, constellation: &str) -> usize {
        self.accepted.get(constellation).map_or(0, Vec::len)
    }

    pub fn artifact(&self) -> FilterArtifact {
        let mut accepted_counts: BTreeMap<String, usize> = self
            .grids
            .keys()
            .map(|name| (name.clone(), 0))
            .collect();
        let mut rejected_counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

        for verdict in &self.verdicts {
            match verdict.reason {
                None => *accepted_counts.entry(verdict.constellation.clone()).or_default() += 1,
                Some(reason) => {
                    *rejected_counts
                        .entry(verdict.constellation.clone())
                        .or_default()
                        .entry(reason.to_string())
                        .or_default() += 1
                }
            }
        }

        FilterArtifact {
            schema_version: FILTER_SCHEMA_VERSION,
            verdicts: self.verdicts.clone(),
            accepted_counts,
            rejected_counts,
        }
    }
}
