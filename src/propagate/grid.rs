use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, ConstellationConfig};
use crate::tle::PipelineInput;

/// Fixed sampling grid of one constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub start: DateTime<Utc>,
    pub interval_ms: i64,
    pub sample_count: usize,
}

impl TimeGrid {
    pub fn new(start: DateTime<Utc>, interval: std::time::Duration, sample_count: usize) -> Self {
        Self {
            start,
            interval_ms: interval.as_millis() as i64,
            sample_count,
        }
    }

    pub fn for_constellation(start: DateTime<Utc>, constellation: &ConstellationConfig) -> Self {
        Self::new(
            start,
            constellation.sample_interval,
            constellation.sample_count,
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::milliseconds(self.interval_ms)
    }

    pub fn at(&self, index: usize) -> DateTime<Utc> {
        self.start + Duration::milliseconds(self.interval_ms * index as i64)
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        (0..self.sample_count).map(|k| self.at(k)).collect()
    }

    pub fn covered_minutes(&self) -> f64 {
        (self.interval_ms as f64 * self.sample_count as f64) / 60_000.0
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_ms as f64 / 1000.0
    }

    /// Start instant shared by every constellation of a run.
    pub fn resolve_start(config: &Config, input: &PipelineInput) -> Option<DateTime<Utc>> {
        if let Some(epoch) = config.pipeline.reference_epoch {
            return Some(epoch);
        }
        input
            .newest_epoch()
            .and_then(|epoch| epoch.with_nanosecond(0))
    }
}
