mod annealing;
mod coverage;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use annealing::{Annealer, SearchResult, StopReason};
pub use coverage::{coverage_ratio, violation, VisibilityMatrix};

use crate::config::{Config, OptimizerConfig, VisibleTarget};
use crate::integrate::IntegratedDataset;
use crate::timeseries::ConstellationDataset;

pub const POOL_SCHEMA_VERSION: u32 = 1;

/// Selected satellites of one constellation and how well they cover the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPool {
    pub constellation: String,
    pub selected_ids: Vec<u32>,
    pub candidate_count: usize,
    pub target: VisibleTarget,
    pub coverage_ratio: f64,
    pub average_visible: f64,
    pub min_visible: usize,
    pub max_visible: usize,
    pub target_met: bool,
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub seed: u64,
}

impl DynamicPool {
    pub fn size(&self) -> usize {
        self.selected_ids.len()
    }
}

/// Persisted stage-6 artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolArtifact {
    pub schema_version: u32,
    pub pools: BTreeMap<String, DynamicPool>,
}

pub fn optimize_constellation(
    dataset: &ConstellationDataset,
    target: VisibleTarget,
    optimizer: &OptimizerConfig,
    seed: u64,
) -> DynamicPool {
    let matrix = VisibilityMatrix::from_dataset(dataset);
    let result = Annealer::new(&matrix, target, optimizer, seed).run();

    let selected_ids: Vec<u32> = result
        .selected
        .iter()
        .enumerate()
        .filter(|(_, chosen)| **chosen)
        .map(|(i, _)| matrix.id(i))
        .collect();
    let counts = matrix.counts(&result.selected);
    let ratio = coverage_ratio(&counts, target);
    let average_visible = if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<usize>() as f64 / counts.len() as f64
    };

    DynamicPool {
        constellation: dataset.constellation.clone(),
        selected_ids,
        candidate_count: matrix.candidate_count(),
        target,
        coverage_ratio: ratio,
        average_visible,
        min_visible: counts.iter().copied().min().unwrap_or(0),
        max_visible: counts.iter().copied().max().unwrap_or(0),
        target_met: ratio >= optimizer.coverage_goal,
        iterations: result.iterations,
        stop_reason: result.stop_reason,
        seed,
    }
}

/// Stage 6: one pool per constellation. Falling short of the coverage goal
/// is reported on the pool, never raised.
pub fn plan_pools(integrated: &IntegratedDataset, config: &Config) -> PoolArtifact {
    let mut pools = BTreeMap::new();

    for (index, (name, constellation)) in config.constellations.iter().enumerate() {
        let Some(dataset) = integrated.datasets.get(name) else {
            log::warn!("[{}] no integrated dataset, no pool planned", name);
            continue;
        };
        let seed = config.optimizer.seed.wrapping_add(index as u64);
        let pool = optimize_constellation(
            dataset,
            constellation.visible_target,
            &config.optimizer,
            seed,
        );

        if pool.target_met {
            log::info!(
                "[{}] pool of {} / {} satellites, coverage {:.3} (visible {}..{}, avg {:.2})",
                name,
                pool.size(),
                pool.candidate_count,
                pool.coverage_ratio,
                pool.min_visible,
                pool.max_visible,
                pool.average_visible
            );
        } else {
            log::warn!(
                "[{}] coverage goal not met: {:.3} < {:.3} after {} iterations ({})",
                name,
                pool.coverage_ratio,
                config.optimizer.coverage_goal,
                pool.iterations,
                pool.stop_reason
            );
        }
        pools.insert(name.clone(), pool);
    }

    PoolArtifact {
        schema_version: POOL_SCHEMA_VERSION,
        pools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::TimeGrid;
    use crate::timeseries::{ConstellationTimeSeries, SeriesSummary};
    use chrono::{TimeZone, Utc};

    fn dataset(windows: &[(u32, std::ops::Range<usize>)]) -> ConstellationDataset {
        let start = Utc.with_ymd_and_hms(2024, 4, 9, 12, 0, 0).unwrap();
        let grid = TimeGrid::new(start, std::time::Duration::from_secs(30), 24);
        ConstellationDataset {
            constellation: "oneweb".into(),
            grid,
            expected_length: 24,
            series: windows
                .iter()
                .map(|(id, window)| ConstellationTimeSeries {
                    norad_id: *id,
                    name: format!("SAT-{id}"),
                    visibility: (0..24).map(|k| window.contains(&k)).collect(),
                    samples: vec![],
                    summary: SeriesSummary {
                        visible_steps: window.len(),
                        peak_elevation_deg: 40.0,
                        mean_visible_rsrp_dbm: None,
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn test_pool_statistics() {
        let data = dataset(&[(5, 0..12), (3, 12..24), (9, 6..18), (1, 0..24)]);
        let optimizer = OptimizerConfig {
            max_iterations: 2_000,
            ..OptimizerConfig::default()
        };
        let pool = optimize_constellation(&data, VisibleTarget { min: 1, max: 1 }, &optimizer, 11);

        assert_eq!(pool.selected_ids, vec![1]);
        assert_eq!(pool.candidate_count, 4);
        assert_eq!(pool.coverage_ratio, 1.0);
        assert_eq!(pool.average_visible, 1.0);
        assert_eq!((pool.min_visible, pool.max_visible), (1, 1));
        assert!(pool.target_met);
    }

    #[test]
    fn test_shortfall_marks_goal_unmet() {
        let data = dataset(&[(5, 0..12)]);
        let pool = optimize_constellation(
            &data,
            VisibleTarget { min: 1, max: 3 },
            &OptimizerConfig::default(),
            1,
        );
        assert_eq!(pool.selected_ids, vec![5]);
        assert_eq!(pool.coverage_ratio, 0.5);
        assert!(!pool.target_met);
        assert_eq!(pool.min_visible, 0);
    }
}
