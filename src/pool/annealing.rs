use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::coverage::{shortfall, violation, VisibilityMatrix};
use crate::config::{OptimizerConfig, VisibleTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    IterationBudget,
    Plateau,
    NoCandidates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub selected: Vec<bool>,
    pub counts: Vec<usize>,
    pub iterations: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy)]
enum Move {
    Add(usize),
    Remove(usize),
    Swap { out: usize, into: usize },
}

/// Simulated annealing over candidate subsets.
///
/// Cost is the total range violation plus the pool size scaled by
/// `1 / (candidates + 1)`, so a single unit of violation always outweighs
/// any size saving.
pub struct Annealer<'a> {
    matrix: &'a VisibilityMatrix,
    target: VisibleTarget,
    config: &'a OptimizerConfig,
    rng: Pcg64Mcg,
    size_weight: f64,
}

impl<'a> Annealer<'a> {
    pub fn new(
        matrix: &'a VisibilityMatrix,
        target: VisibleTarget,
        config: &'a OptimizerConfig,
        seed: u64,
    ) -> Self {
        Self {
            matrix,
            target,
            config,
            rng: Pcg64Mcg::seed_from_u64(seed),
            size_weight: 1.0 / (matrix.candidate_count() as f64 + 1.0),
        }
    }

    fn cost(&self, counts: &[usize], size: usize) -> f64 {
        violation(counts, self.target) as f64 + size as f64 * self.size_weight
    }

    /// Keep adding the candidate that removes the most shortfall.
    fn greedy(&self) -> (Vec<bool>, Vec<usize>) {
        let n = self.matrix.candidate_count();
        let mut selected = vec![false; n];
        let mut counts = vec![0; self.matrix.steps()];
        let mut remaining = shortfall(&counts, self.target);

        while remaining > 0 {
            let mut best: Option<(usize, usize, Vec<usize>)> = None;
            for index in (0..n).filter(|&i| !selected[i]) {
                let next = self.matrix.shifted(&counts, index, true);
                let gain = remaining - shortfall(&next, self.target);
                if gain > 0 && best.as_ref().map_or(true, |(_, g, _)| gain > *g) {
                    best = Some((index, gain, next));
                }
            }
            let Some((index, gain, next)) = best else {
                break;
            };
            selected[index] = true;
            counts = next;
            remaining -= gain;
        }
        (selected, counts)
    }

    fn propose(&mut self, selected: &[bool]) -> Option<Move> {
        let (inside, outside): (Vec<usize>, Vec<usize>) =
            (0..selected.len()).partition(|&i| selected[i]);

        let kind = match (inside.is_empty(), outside.is_empty()) {
            (true, true) => return None,
            (true, false) => 0,
            (false, true) => 1,
            (false, false) => self.rng.gen_range(0..3),
        };
        let mv = match kind {
            0 => Move::Add(outside[self.rng.gen_range(0..outside.len())]),
            1 => Move::Remove(inside[self.rng.gen_range(0..inside.len())]),
            _ => Move::Swap {
                out: inside[self.rng.gen_range(0..inside.len())],
                into: outside[self.rng.gen_range(0..outside.len())],
            },
        };
        Some(mv)
    }

    fn apply(&self, mv: Move, counts: &[usize]) -> Vec<usize> {
        match mv {
            Move::Add(i) => self.matrix.shifted(counts, i, true),
            Move::Remove(i) => self.matrix.shifted(counts, i, false),
            Move::Swap { out, into } => {
                let removed = self.matrix.shifted(counts, out, false);
                self.matrix.shifted(&removed, into, true)
            }
        }
    }

    fn accept(&mut self, delta: f64, temperature: f64) -> bool {
        if delta <= 0.0 {
            return true;
        }
        let probability = (-delta / temperature).exp();
        probability >= self.config.acceptance_floor && self.rng.gen::<f64>() < probability
    }

    /// Drop selected candidates whose removal does not raise the cost.
    fn prune(&self, selected: &mut [bool], counts: &mut Vec<usize>) {
        let mut size = selected.iter().filter(|s| **s).count();
        for index in 0..selected.len() {
            if !selected[index] {
                continue;
            }
            let next = self.matrix.shifted(counts, index, false);
            if self.cost(&next, size - 1) <= self.cost(counts, size) {
                selected[index] = false;
                *counts = next;
                size -= 1;
            }
        }
    }

    pub fn run(mut self) -> SearchResult {
        if self.matrix.candidate_count() == 0 {
            return SearchResult {
                selected: Vec::new(),
                counts: vec![0; self.matrix.steps()],
                iterations: 0,
                stop_reason: StopReason::NoCandidates,
            };
        }

        let (mut current, mut counts) = self.greedy();
        let mut size = current.iter().filter(|s| **s).count();
        let mut cost = self.cost(&counts, size);
        let mut best = (current.clone(), counts.clone(), cost);

        let mut temperature = self.config.initial_temperature;
        let mut iterations = 0;
        let mut since_best = 0;

        let stop_reason = loop {
            if iterations >= self.config.max_iterations {
                break StopReason::IterationBudget;
            }
            if since_best >= self.config.plateau_tolerance {
                break StopReason::Plateau;
            }
            iterations += 1;
            since_best += 1;

            if let Some(mv) = self.propose(&current) {
                let next = self.apply(mv, &counts);
                let next_size = match mv {
                    Move::Add(_) => size + 1,
                    Move::Remove(_) => size - 1,
                    Move::Swap { .. } => size,
                };
                let next_cost = self.cost(&next, next_size);

                if self.accept(next_cost - cost, temperature) {
                    match mv {
                        Move::Add(i) => current[i] = true,
                        Move::Remove(i) => current[i] = false,
                        Move::Swap { out, into } => {
                            current[out] = false;
                            current[into] = true;
                        }
                    }
                    counts = next;
                    size = next_size;
                    cost = next_cost;
                    if cost < best.2 {
                        best = (current.clone(), counts.clone(), cost);
                        since_best = 0;
                    }
                }
            }

            temperature = (temperature * self.config.cooling_rate).max(self.config.min_temperature);
        };

        let (mut selected, mut counts, _) = best;
        self.prune(&mut selected, &mut counts);

        SearchResult {
            selected,
            counts,
            iterations,
            stop_reason,
        }
    }
}
