//! Primal engine: candidate pool and acceptance checks.
//!
//! Candidates arrive from the master's solution pool, from fixed-integer
//! NLP solves and from segment root searches. Every candidate is validated
//! against the *original* problem: variable bounds, linear constraints
//! (unless trusted), integrality, and nonlinear constraints, each within
//! its configured tolerance. The pool is bounded; eviction drops the worst
//! objective, oldest iteration first.

pub mod fixed_nlp;
pub mod rootsearch;

use std::collections::HashSet;

use shale_core::Problem;

use crate::results::SolutionPoint;
use crate::settings::Settings;

/// Where a primal candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimalSource {
    /// Directly from the master's solution pool.
    MipSolutionPool,
    /// A fixed-integer NLP solve.
    NlpFixedIntegers,
    /// A feasibility root search along a segment.
    Rootsearch,
}

/// An accepted primal solution.
#[derive(Debug, Clone)]
pub struct PrimalSolution {
    /// Full variable vector in reformulated space (original variables form
    /// the prefix).
    pub point: Vec<f64>,
    /// Internal (minimization-sense) objective value.
    pub objective: f64,
    /// Iteration the solution was found in.
    pub iteration: usize,
    /// Candidate origin.
    pub source: PrimalSource,
    /// Max constraint error against the original problem.
    pub max_deviation: f64,
}

/// Acceptance tolerances, pulled from the option store.
#[derive(Debug, Clone)]
pub struct PrimalTolerances {
    /// Integrality tolerance.
    pub integer: f64,
    /// Linear-constraint tolerance.
    pub linear: f64,
    /// Nonlinear-constraint tolerance.
    pub nonlinear: f64,
    /// Skip the linear check when the source already guarantees it.
    pub trust_linear: bool,
}

impl PrimalTolerances {
    /// Pull the tolerances from the option store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            integer: settings.get_float("Primal.Tolerance.Integer"),
            linear: settings.get_float("Primal.Tolerance.LinearConstraint"),
            nonlinear: settings.get_float("Primal.Tolerance.NonlinearConstraint"),
            trust_linear: settings.get_bool("Primal.TrustLinearConstraintValues"),
        }
    }
}

/// Primal-engine state.
pub struct PrimalState {
    /// Accepted solutions, best objective first.
    pub pool: Vec<PrimalSolution>,
    /// Pool capacity.
    pub pool_capacity: usize,
    /// Points queued for the fixed-integer NLP heuristic.
    pub fixed_nlp_candidates: Vec<SolutionPoint>,
    /// Rounded integer patterns already sent to the NLP oracle.
    pub tested_patterns: HashSet<Vec<i64>>,
    /// Current (dynamic) iteration frequency of the fixed-NLP heuristic.
    pub iteration_frequency: usize,
    /// Current (dynamic) time frequency in seconds.
    pub time_frequency: f64,
    /// Frequencies as configured, for the dynamic floor.
    pub base_iteration_frequency: usize,
    /// Configured time frequency.
    pub base_time_frequency: f64,
    /// Iteration of the last fixed-NLP invocation.
    pub last_fixed_nlp_iteration: usize,
    /// Elapsed time of the last fixed-NLP invocation.
    pub last_fixed_nlp_time: f64,
    /// Total NLP subsolves performed.
    pub nlp_solves: usize,
}

impl PrimalState {
    /// Build the state from options.
    pub fn from_settings(settings: &Settings) -> Self {
        let iter_freq = settings.get_int("Primal.FixedInteger.Frequency.Iteration").max(1) as usize;
        let time_freq = settings.get_float("Primal.FixedInteger.Frequency.Time");
        Self {
            pool: Vec::new(),
            pool_capacity: settings.get_int("Primal.Pool.MaxSize").max(1) as usize,
            fixed_nlp_candidates: Vec::new(),
            tested_patterns: HashSet::new(),
            iteration_frequency: iter_freq,
            time_frequency: time_freq,
            base_iteration_frequency: iter_freq,
            base_time_frequency: time_freq,
            last_fixed_nlp_iteration: 0,
            last_fixed_nlp_time: 0.0,
            nlp_solves: 0,
        }
    }

    /// Best accepted solution, if any.
    pub fn best(&self) -> Option<&PrimalSolution> {
        self.pool.first()
    }

    /// Validate a candidate against the original problem and, if accepted,
    /// insert it into the pool. Returns the internal objective value on
    /// acceptance.
    ///
    /// `objective_sign` converts the original objective into the internal
    /// minimization sense (-1 for maximization problems).
    pub fn add_candidate(
        &mut self,
        original: &Problem,
        objective_sign: f64,
        tolerances: &PrimalTolerances,
        point: Vec<f64>,
        iteration: usize,
        source: PrimalSource,
    ) -> Option<f64> {
        let n = original.num_variables();
        if point.len() < n {
            log::debug!("primal candidate too short ({} < {})", point.len(), n);
            return None;
        }
        let prefix = &point[..n];

        if !original.are_variable_bounds_fulfilled(prefix, tolerances.integer.max(1e-8)) {
            log::debug!("primal candidate rejected: variable bounds");
            return None;
        }
        if !tolerances.trust_linear
            && !original.are_linear_constraints_fulfilled(prefix, tolerances.linear)
        {
            log::debug!("primal candidate rejected: linear constraints");
            return None;
        }
        if !original.are_integrality_constraints_fulfilled(prefix, tolerances.integer) {
            log::debug!("primal candidate rejected: integrality");
            return None;
        }
        if !original.are_quadratic_constraints_fulfilled(prefix, tolerances.nonlinear)
            || !original.are_nonlinear_constraints_fulfilled(prefix, tolerances.nonlinear)
        {
            log::debug!("primal candidate rejected: nonlinear constraints");
            return None;
        }

        let objective = objective_sign * original.objective_value(prefix);
        if !objective.is_finite() {
            return None;
        }
        let max_deviation = original
            .most_deviating_constraint(prefix)
            .map(|v| v.error)
            .unwrap_or(0.0);

        self.pool.push(PrimalSolution {
            point,
            objective,
            iteration,
            source,
            max_deviation,
        });
        // Best objective first; among equals, newer iterations survive.
        self.pool.sort_by(|a, b| {
            a.objective
                .partial_cmp(&b.objective)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.iteration.cmp(&a.iteration))
        });
        self.pool.truncate(self.pool_capacity);

        Some(objective)
    }

    /// Rounded discrete pattern of a point, the fixed-NLP memo key.
    pub fn pattern_of(discrete_indices: &[usize], point: &[f64]) -> Vec<i64> {
        discrete_indices
            .iter()
            .map(|&i| point[i].round() as i64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_core::{Constraint, LinearTerm, Objective, ObjectiveSense, QuadraticTerm, VariableType};

    /// min x + y s.t. x^2 + y^2 <= 1, x integer in [0, 1], y real.
    fn original() -> Problem {
        let mut p = Problem::new("orig");
        let x = p.add_variable("x", VariableType::Integer, 0.0, 1.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, -1.0, 1.0).unwrap();
        let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 1.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        p.add_constraint(c).unwrap();
        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.linear_terms.push(LinearTerm::new(1.0, x));
        obj.linear_terms.push(LinearTerm::new(1.0, y));
        p.set_objective(obj);
        p.finalize().unwrap();
        p
    }

    fn tolerances() -> PrimalTolerances {
        PrimalTolerances {
            integer: 1e-5,
            linear: 1e-6,
            nonlinear: 1e-5,
            trust_linear: false,
        }
    }

    fn state() -> PrimalState {
        PrimalState::from_settings(&Settings::default())
    }

    #[test]
    fn test_feasible_candidate_accepted() {
        let p = original();
        let mut s = state();
        let obj = s.add_candidate(
            &p,
            1.0,
            &tolerances(),
            vec![0.0, -1.0],
            1,
            PrimalSource::MipSolutionPool,
        );
        assert_eq!(obj, Some(-1.0));
        assert_eq!(s.pool.len(), 1);
        assert!(s.best().unwrap().max_deviation <= 0.0 + 1e-12);
    }

    #[test]
    fn test_nonlinear_violation_rejected() {
        let p = original();
        let mut s = state();
        // (1, 1): ball constraint violated.
        let accepted = s.add_candidate(
            &p,
            1.0,
            &tolerances(),
            vec![1.0, 1.0],
            1,
            PrimalSource::MipSolutionPool,
        );
        assert!(accepted.is_none());
        assert!(s.pool.is_empty());
    }

    #[test]
    fn test_fractional_integer_rejected() {
        let p = original();
        let mut s = state();
        let accepted = s.add_candidate(
            &p,
            1.0,
            &tolerances(),
            vec![0.5, 0.0],
            1,
            PrimalSource::MipSolutionPool,
        );
        assert!(accepted.is_none());
    }

    #[test]
    fn test_pool_bounded_and_sorted() {
        let p = original();
        let mut s = state();
        s.pool_capacity = 2;

        s.add_candidate(&p, 1.0, &tolerances(), vec![0.0, 0.5], 1, PrimalSource::MipSolutionPool);
        s.add_candidate(&p, 1.0, &tolerances(), vec![0.0, -0.5], 2, PrimalSource::MipSolutionPool);
        s.add_candidate(&p, 1.0, &tolerances(), vec![0.0, -1.0], 3, PrimalSource::NlpFixedIntegers);

        assert_eq!(s.pool.len(), 2);
        assert_eq!(s.best().unwrap().objective, -1.0);
        // The worst (objective 0.5) was evicted.
        assert!(s.pool.iter().all(|p| p.objective <= -0.5 + 1e-12));
    }

    #[test]
    fn test_longer_point_prefix_checked() {
        // Reformulated points carry auxiliary coordinates past the
        // original space; only the prefix is validated.
        let p = original();
        let mut s = state();
        let obj = s.add_candidate(
            &p,
            1.0,
            &tolerances(),
            vec![1.0, 0.0, 42.0],
            1,
            PrimalSource::NlpFixedIntegers,
        );
        assert_eq!(obj, Some(1.0));
    }

    #[test]
    fn test_pattern_memo_key() {
        let pattern = PrimalState::pattern_of(&[0, 2], &[0.9999, 5.0, 2.0001]);
        assert_eq!(pattern, vec![1, 2]);
    }
}
