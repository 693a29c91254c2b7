use rayon::prelude::*;

use crate::config::VisibleTarget;
use crate::timeseries::ConstellationDataset;

/// Per-candidate visibility over the grid, candidates ordered by catalog number.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityMatrix {
    ids: Vec<u32>,
    steps: usize,
    visible: Vec<Vec<bool>>,
}

impl VisibilityMatrix {
    pub fn new(mut rows: Vec<(u32, Vec<bool>)>, steps: usize) -> Self {
        rows.sort_by_key(|(id, _)| *id);
        let (ids, mut visible): (Vec<u32>, Vec<Vec<bool>>) = rows.into_iter().unzip();
        for row in &mut visible {
            row.resize(steps, false);
        }
        Self {
            ids,
            steps,
            visible,
        }
    }

    pub fn from_dataset(dataset: &ConstellationDataset) -> Self {
        let rows = dataset
            .series
            .iter()
            .map(|s| (s.norad_id, s.visibility.clone()))
            .collect();
        Self::new(rows, dataset.expected_length)
    }

    pub fn candidate_count(&self) -> usize {
        self.ids.len()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn id(&self, index: usize) -> u32 {
        self.ids[index]
    }

    pub fn row(&self, index: usize) -> &[bool] {
        &self.visible[index]
    }

    /// Simultaneously visible selected candidates per step.
    pub fn counts(&self, selected: &[bool]) -> Vec<usize> {
        (0..self.steps)
            .into_par_iter()
            .map(|k| {
                self.visible
                    .iter()
                    .zip(selected)
                    .filter(|(row, chosen)| **chosen && row[k])
                    .count()
            })
            .collect()
    }

    /// Counts after adding (`+1`) or removing (`-1`) one candidate.
    pub fn shifted(&self, counts: &[usize], index: usize, add: bool) -> Vec<usize> {
        counts
            .iter()
            .zip(&self.visible[index])
            .map(|(&c, &v)| match (v, add) {
                (false, _) => c,
                (true, true) => c + 1,
                (true, false) => c.saturating_sub(1),
            })
            .collect()
    }
}

pub fn shortfall(counts: &[usize], target: VisibleTarget) -> usize {
    counts.iter().map(|&c| target.min.saturating_sub(c)).sum()
}

/// Total distance of the per-step counts from the target range.
pub fn violation(counts: &[usize], target: VisibleTarget) -> usize {
    counts
        .iter()
        .map(|&c| target.min.saturating_sub(c) + c.saturating_sub(target.max))
        .sum()
}

/// Share of steps whose count lies inside the target range.
pub fn coverage_ratio(counts: &[usize], target: VisibleTarget) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let inside = counts
        .iter()
        .filter(|&&c| c >= target.min && c <= target.max)
        .count();
    inside as f64 / counts.len() as f64
}
