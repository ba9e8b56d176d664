//! Single-tree callback: lazy cut generation from inside the master.
//!
//! The master may invoke the hooks from any of its worker threads; every
//! piece of engine state the hooks touch lives in [`CallbackShared`] behind
//! one mutex. The hooks only generate cuts (fast); NLP solves are never
//! triggered here. Feasible incumbent candidates are queued and consumed by
//! the primal engine at the next iteration boundary.

use std::collections::HashSet;

use shale_core::Problem;

use crate::master::{LazyCutSink, MasterCallback};
use crate::rootsearch::find_boundary;

use super::interior::InteriorPoint;
use super::selection::SelectionParameters;
use super::{fingerprint, DualState};

/// Engine state shared with the single-tree callback, mutex-guarded.
pub struct CallbackShared {
    /// Snapshot of the reformulated problem.
    pub problem: Problem,
    /// Selection parameters.
    pub params: SelectionParameters,
    /// Interior points, refreshed before each master solve.
    pub interior_points: Vec<InteriorPoint>,
    /// Fingerprints of cuts added during the running solve.
    pub new_fingerprints: HashSet<(usize, u64)>,
    /// Fingerprints known before the solve started.
    pub known_fingerprints: HashSet<(usize, u64)>,
    /// Feasible incumbent candidates seen during the solve.
    pub pending_candidates: Vec<Vec<f64>>,
    /// Lazy-constraint budget for this solve.
    pub max_lazy_constraints: usize,
    /// Lazy cuts emitted so far in this solve.
    pub lazy_emitted: usize,
    /// Relaxation points cut during this solve.
    pub relaxation_cuts: usize,
}

impl CallbackShared {
    /// Snapshot the engine state for one master solve.
    pub fn new(problem: Problem, params: SelectionParameters, max_lazy_constraints: usize) -> Self {
        Self {
            problem,
            params,
            interior_points: Vec::new(),
            new_fingerprints: HashSet::new(),
            known_fingerprints: HashSet::new(),
            pending_candidates: Vec::new(),
            max_lazy_constraints,
            lazy_emitted: 0,
            relaxation_cuts: 0,
        }
    }

    /// Refresh the per-solve state from the dual engine.
    pub fn refresh_from(&mut self, dual: &DualState) {
        self.interior_points = dual.interior_points.clone();
        self.known_fingerprints = dual.generated_hyperplanes.clone();
        self.new_fingerprints.clear();
        self.pending_candidates.clear();
        self.lazy_emitted = 0;
        self.relaxation_cuts = 0;
    }

    /// Merge the per-solve results back into the dual engine.
    pub fn drain_into(&mut self, dual: &mut DualState) {
        for fp in self.new_fingerprints.drain() {
            dual.generated_hyperplanes.insert(fp);
        }
        dual.total_hyperplanes += self.lazy_emitted;
    }

    /// Generate one lazy cut for a violated constraint at `point`,
    /// root-searching to the boundary when an interior point is known.
    fn emit_cut_for(
        &mut self,
        constraint_index: usize,
        point: &[f64],
        sink: &mut dyn LazyCutSink,
    ) -> bool {
        if self.lazy_emitted >= self.max_lazy_constraints {
            return false;
        }
        let constraint = self.problem.constraint(constraint_index);

        let cut_point: Vec<f64> = match self.interior_points.first() {
            Some(interior) => {
                let n = point.len();
                let blend = |lambda: f64| -> Vec<f64> {
                    (0..n)
                        .map(|k| interior.point[k] + lambda * (point[k] - interior.point[k]))
                        .collect()
                };
                match find_boundary(
                    |lambda| constraint.calculate(&blend(lambda)).normalized_value,
                    0.0,
                    1.0,
                    &self.params.rootsearch,
                ) {
                    Some(result) => blend(result.outside),
                    None => point.to_vec(),
                }
            }
            None => point.to_vec(),
        };

        let fp = fingerprint(constraint_index, &cut_point);
        if self.known_fingerprints.contains(&fp) || self.new_fingerprints.contains(&fp) {
            return false;
        }
        let Some((gradient, rhs)) = constraint.linearization_at(&cut_point) else {
            return false;
        };
        let terms: Vec<(usize, f64)> = gradient.into_iter().collect();
        sink.add_lazy_cut(&terms, rhs);
        self.new_fingerprints.insert(fp);
        self.lazy_emitted += 1;
        true
    }

    fn cut_violated_constraints(&mut self, point: &[f64], sink: &mut dyn LazyCutSink) -> usize {
        let values = self.problem.fraction_of_deviating_cut_constraints(
            point,
            0.0,
            self.params.constraint_selection_factor,
        );
        if values.is_empty() {
            return 0;
        }
        let worst = values[0].error;
        let mut added = 0;
        for value in values {
            if value.error < self.params.max_constraint_factor * worst {
                continue;
            }
            if self.emit_cut_for(value.index, point, sink) {
                added += 1;
            }
        }
        added
    }
}

/// The hooks object handed to the master.
pub struct EngineCallback {
    /// Serialized shared state.
    pub shared: std::sync::Arc<std::sync::Mutex<CallbackShared>>,
}

impl MasterCallback for EngineCallback {
    fn on_relaxation_node(&mut self, point: &[f64], _objective: f64, sink: &mut dyn LazyCutSink) {
        let Ok(mut shared) = self.shared.lock() else {
            return;
        };
        let added = shared.cut_violated_constraints(point, sink);
        shared.relaxation_cuts += added;
    }

    fn on_candidate_incumbent(&mut self, point: &[f64], _objective: f64, sink: &mut dyn LazyCutSink) {
        let Ok(mut shared) = self.shared.lock() else {
            return;
        };
        let added = shared.cut_violated_constraints(point, sink);
        if added == 0 {
            // Feasible for the nonlinear constraints: a primal candidate,
            // consumed at the next iteration boundary.
            shared.pending_candidates.push(point.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rootsearch::RootsearchOptions;
    use shale_core::{Constraint, LinearTerm, Objective, ObjectiveSense, QuadraticTerm, VariableType};

    fn disc_problem() -> Problem {
        let mut p = Problem::new("disc");
        let x = p.add_variable("x", VariableType::Real, -2.0, 2.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, -2.0, 2.0).unwrap();
        let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 1.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        p.add_constraint(c).unwrap();
        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.linear_terms.push(LinearTerm::new(1.0, x));
        p.set_objective(obj);
        p.finalize().unwrap();
        p
    }

    fn params() -> SelectionParameters {
        SelectionParameters {
            constraint_selection_factor: 1.0,
            max_constraint_factor: 0.0,
            max_per_iteration: 100,
            rootsearch_constraint_tolerance: 1e-10,
            unique_constraints: true,
            rootsearch: RootsearchOptions::default(),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        cuts: Vec<(Vec<(usize, f64)>, f64)>,
    }

    impl LazyCutSink for RecordingSink {
        fn add_lazy_cut(&mut self, terms: &[(usize, f64)], rhs: f64) {
            self.cuts.push((terms.to_vec(), rhs));
        }
    }

    #[test]
    fn test_violated_candidate_gets_cut() {
        let shared = CallbackShared::new(disc_problem(), params(), 100);
        let mut cb = EngineCallback {
            shared: std::sync::Arc::new(std::sync::Mutex::new(shared)),
        };
        let mut sink = RecordingSink::default();

        cb.on_candidate_incumbent(&[2.0, 2.0], 2.0, &mut sink);
        assert_eq!(sink.cuts.len(), 1);
        assert!(cb.shared.lock().unwrap().pending_candidates.is_empty());
    }

    #[test]
    fn test_feasible_candidate_queued() {
        let shared = CallbackShared::new(disc_problem(), params(), 100);
        let mut cb = EngineCallback {
            shared: std::sync::Arc::new(std::sync::Mutex::new(shared)),
        };
        let mut sink = RecordingSink::default();

        cb.on_candidate_incumbent(&[0.1, 0.1], 0.1, &mut sink);
        assert!(sink.cuts.is_empty());
        assert_eq!(cb.shared.lock().unwrap().pending_candidates.len(), 1);
    }

    #[test]
    fn test_duplicate_lazy_cut_suppressed() {
        let shared = CallbackShared::new(disc_problem(), params(), 100);
        let mut cb = EngineCallback {
            shared: std::sync::Arc::new(std::sync::Mutex::new(shared)),
        };
        let mut sink = RecordingSink::default();

        cb.on_relaxation_node(&[2.0, 2.0], 2.0, &mut sink);
        cb.on_relaxation_node(&[2.0, 2.0], 2.0, &mut sink);
        assert_eq!(sink.cuts.len(), 1);
    }

    #[test]
    fn test_lazy_budget_respected() {
        let shared = CallbackShared::new(disc_problem(), params(), 0);
        let mut cb = EngineCallback {
            shared: std::sync::Arc::new(std::sync::Mutex::new(shared)),
        };
        let mut sink = RecordingSink::default();
        cb.on_relaxation_node(&[2.0, 2.0], 2.0, &mut sink);
        assert!(sink.cuts.is_empty());
    }

    #[test]
    fn test_drain_merges_fingerprints() {
        let mut shared = CallbackShared::new(disc_problem(), params(), 100);
        let mut sink = RecordingSink::default();
        shared.cut_violated_constraints(&[2.0, 2.0], &mut sink);
        assert_eq!(shared.lazy_emitted, 1);

        let mut dual = DualState::default();
        shared.drain_into(&mut dual);
        assert_eq!(dual.total_hyperplanes, 1);
        assert_eq!(dual.generated_hyperplanes.len(), 1);
    }
}
