//! Dual (cut-generation) engine state.
//!
//! The dual solver owns the interior-point list, the hyperplane and
//! integer-cut waiting lists, the fingerprint set enforcing cut
//! non-duplication, and the objective cut-off. Hyperplanes are queued by
//! the selection tasks (most-deviating first) and flushed into the master
//! in insertion order, so the master sees a deterministic cut sequence.

pub mod callback;
pub mod hyperplane;
pub mod interior;
pub mod selection;

use std::collections::HashSet;

use shale_core::Problem;

use crate::master::MasterSolver;

pub use hyperplane::{fingerprint, Hyperplane, HyperplaneSource};
pub use interior::InteriorPoint;

/// Shared dual-engine state.
#[derive(Default)]
pub struct DualState {
    /// Interior points anchoring ESH root searches (empty means ECP).
    pub interior_points: Vec<InteriorPoint>,
    /// Hyperplanes waiting to be flushed into the master.
    pub hyperplane_waiting_list: Vec<Hyperplane>,
    /// Integer cuts (ones, zeroes) waiting to be added.
    pub integer_cut_waiting_list: Vec<(Vec<usize>, Vec<usize>)>,
    /// Fingerprints of every hyperplane ever handed to the master.
    pub generated_hyperplanes: HashSet<(usize, u64)>,
    /// Objective cut-off to push into the master, if any.
    pub cutoff_to_use: Option<f64>,
    /// Iteration in which a dual cut was last added.
    pub iteration_last_cut_added: usize,
    /// Consecutive iterations without dual-bound improvement.
    pub stagnation_iterations: usize,
    /// Repair attempts since the last primal improvement.
    pub repairs_since_primal_update: usize,
    /// Consecutive failed repair attempts.
    pub failed_repairs: usize,
    /// Total repair invocations.
    pub total_repairs: usize,
    /// Total hyperplanes added to the master.
    pub total_hyperplanes: usize,
    /// Total integer cuts added to the master.
    pub total_integer_cuts: usize,
    /// True when running the single-tree strategy.
    pub single_tree: bool,
}

impl DualState {
    /// True if this (constraint, point) pair was already cut.
    pub fn has_hyperplane_been_added(&self, fp: &(usize, u64)) -> bool {
        self.generated_hyperplanes.contains(fp)
    }

    /// Queue a hyperplane unless its fingerprint is already known.
    /// Returns true if queued.
    pub fn queue_hyperplane(&mut self, hyperplane: Hyperplane) -> bool {
        let fp = fingerprint(hyperplane.source_constraint, &hyperplane.generated_point);
        if !self.generated_hyperplanes.insert(fp) {
            log::debug!(
                "hyperplane for constraint {} already added (hash {})",
                hyperplane.source_constraint,
                fp.1
            );
            return false;
        }
        self.hyperplane_waiting_list.push(hyperplane);
        true
    }

    /// Queue a no-good cut for a 0/1 pattern.
    pub fn queue_integer_cut(&mut self, ones: Vec<usize>, zeroes: Vec<usize>) {
        self.integer_cut_waiting_list.push((ones, zeroes));
    }

    /// Flush the hyperplane waiting list into the master, preserving
    /// insertion order. Returns the number of rows actually added.
    pub fn flush_hyperplanes(
        &mut self,
        problem: &Problem,
        master: &mut dyn MasterSolver,
        iteration: usize,
    ) -> usize {
        let mut added = 0;
        for hp in self.hyperplane_waiting_list.drain(..) {
            let constraint = problem.constraint(hp.source_constraint);
            let Some((gradient, rhs)) = constraint.linearization_at(&hp.generated_point) else {
                log::debug!(
                    "dropping hyperplane for constraint {}: no finite linearization",
                    constraint.name
                );
                continue;
            };
            let terms: Vec<(usize, f64)> = gradient.into_iter().collect();
            let name = format!("hp_{}_{}", hp.source_constraint, self.total_hyperplanes);
            if master.add_linear_constraint(&terms, rhs, &name).is_some() {
                added += 1;
                self.total_hyperplanes += 1;
            }
        }
        if added > 0 {
            self.iteration_last_cut_added = iteration;
        }
        added
    }

    /// Flush the integer-cut waiting list into the master. Returns the
    /// number of cuts added.
    pub fn flush_integer_cuts(&mut self, master: &mut dyn MasterSolver) -> usize {
        let mut added = 0;
        for (ones, zeroes) in self.integer_cut_waiting_list.drain(..) {
            master.create_integer_cut(&ones, &zeroes);
            self.total_integer_cuts += 1;
            added += 1;
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_deduplicates() {
        let mut dual = DualState::default();

        let hp = Hyperplane {
            source_constraint: 3,
            generated_point: vec![1.0, 2.0],
            source: HyperplaneSource::MipOptimalRootsearch,
            iteration: 1,
        };
        assert!(dual.queue_hyperplane(hp.clone()));
        assert!(!dual.queue_hyperplane(hp));
        assert_eq!(dual.hyperplane_waiting_list.len(), 1);

        // A nearby but distinct point is accepted.
        let hp2 = Hyperplane {
            source_constraint: 3,
            generated_point: vec![1.0, 2.1],
            source: HyperplaneSource::MipOptimalRootsearch,
            iteration: 1,
        };
        assert!(dual.queue_hyperplane(hp2));
    }

    #[test]
    fn test_same_point_different_constraint_not_deduped() {
        let mut dual = DualState::default();
        for c in [0, 1] {
            let hp = Hyperplane {
                source_constraint: c,
                generated_point: vec![0.5],
                source: HyperplaneSource::MipSolutionPoolSolutionPoint,
                iteration: 2,
            };
            assert!(dual.queue_hyperplane(hp));
        }
        assert_eq!(dual.hyperplane_waiting_list.len(), 2);
    }
}
