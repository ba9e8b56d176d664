//! NLP oracle abstraction and the cutting-plane reference solver.
//!
//! Continuous subproblems (fixed-integer primal solves, the relaxed NLP)
//! are delegated to an [`NlpSolver`] oracle. The reference implementation
//! is a Kelley cutting-plane solver: it iterates LP solves against the
//! problem's linear part, adding first-order cuts of the violated nonlinear
//! constraints at each LP optimum until the worst violation is within
//! tolerance. Exact for the convex problems the engine feeds it.

use std::collections::HashSet;

use shale_core::{ConstraintClass, Problem};

use crate::error::{EngineError, OaResult};
use crate::lp::{self, LpLimits, LpProblem, LpRow, LpStatus};

/// Outcome of an NLP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlpStatus {
    /// Solved to optimality within the constraint tolerance.
    Optimal,
    /// A feasible point was found, optimality not established.
    Feasible,
    /// The subproblem is infeasible.
    Infeasible,
    /// The subproblem is unbounded.
    Unbounded,
    /// Iteration cap reached with violation remaining.
    IterationLimit,
    /// Time budget exhausted.
    TimeLimit,
    /// Unrecoverable failure.
    Error,
}

/// The NLP oracle contract.
pub trait NlpSolver {
    /// Fix variables to values (collapse bounds).
    fn fix_variables(&mut self, indices: &[usize], values: &[f64]);

    /// Undo all fixings.
    fn unfix_variables(&mut self);

    /// Provide a warm-start point (oracles may ignore it).
    fn set_starting_point(&mut self, indices: &[usize], values: &[f64]);

    /// Drop the warm-start point.
    fn clear_starting_point(&mut self);

    /// Update a variable's bounds.
    fn update_variable_bound(&mut self, variable: usize, lb: f64, ub: f64);

    /// Solve the continuous subproblem.
    fn solve(&mut self) -> NlpStatus;

    /// Solution of the last successful solve.
    fn solution(&self) -> &[f64];

    /// Objective value of the last successful solve.
    fn objective_value(&self) -> f64;
}

/// Tuning for the cutting-plane NLP solver.
#[derive(Debug, Clone)]
pub struct NlpSettings {
    /// Outer (cut) iteration cap.
    pub iteration_limit: usize,
    /// Accept when the worst constraint error is below this.
    pub constraint_tolerance: f64,
    /// Fraction of deviating constraints cut per iteration.
    pub constraint_selection_factor: f64,
    /// Limits of each LP subsolve.
    pub lp_limits: LpLimits,
}

impl Default for NlpSettings {
    fn default() -> Self {
        Self {
            iteration_limit: 100,
            constraint_tolerance: 1e-8,
            constraint_selection_factor: 1.0,
            lp_limits: LpLimits::default(),
        }
    }
}

/// Kelley cutting-plane NLP solver over the built-in LP.
pub struct CuttingPlaneNlp {
    problem: Problem,
    settings: NlpSettings,
    lp: LpProblem,
    num_base_rows: usize,
    saved_bounds: Option<Vec<(usize, f64, f64)>>,
    starting_point: Option<Vec<f64>>,
    cut_fingerprints: HashSet<(usize, u64)>,
    solution: Vec<f64>,
    objective: f64,
}

impl CuttingPlaneNlp {
    /// Build the solver from a finalized problem with a linear objective
    /// (the engine's reformulated problems always are).
    pub fn new(problem: Problem, settings: NlpSettings) -> OaResult<Self> {
        if problem.objective().class != ConstraintClass::Linear {
            return Err(EngineError::NlpSolver(
                "cutting-plane NLP requires a linear (epigraph-reformulated) objective".into(),
            ));
        }

        let n = problem.num_variables();
        let mut lp = LpProblem::new(n);
        lp.lower = problem.variable_lower_bounds();
        lp.upper = problem.variable_upper_bounds();
        lp.objective_constant = problem.objective().constant;
        for t in &problem.objective().linear_terms {
            lp.objective[t.variable] += t.coefficient;
        }
        for &ci in problem.linear_constraint_indices() {
            let c = problem.constraint(ci);
            let coefficients: Vec<(usize, f64)> = c
                .linear_terms
                .iter()
                .map(|t| (t.variable, t.coefficient))
                .collect();
            lp.rows.push(LpRow {
                name: c.name.clone(),
                coefficients,
                lhs: c.lhs - c.constant,
                rhs: c.rhs - c.constant,
            });
        }
        let num_base_rows = lp.rows.len();

        Ok(Self {
            problem,
            settings,
            lp,
            num_base_rows,
            saved_bounds: None,
            starting_point: None,
            cut_fingerprints: HashSet::new(),
            solution: Vec::new(),
            objective: f64::INFINITY,
        })
    }

    /// Number of accumulated outer-approximation cuts.
    pub fn num_cuts(&self) -> usize {
        self.lp.rows.len() - self.num_base_rows
    }

    fn point_hash(point: &[f64]) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for v in point {
            ((v / 1e-10).round() as i64).hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl NlpSolver for CuttingPlaneNlp {
    fn fix_variables(&mut self, indices: &[usize], values: &[f64]) {
        let mut saved = Vec::with_capacity(indices.len());
        for (&i, &v) in indices.iter().zip(values.iter()) {
            saved.push((i, self.lp.lower[i], self.lp.upper[i]));
            self.lp.lower[i] = v;
            self.lp.upper[i] = v;
        }
        self.saved_bounds = Some(saved);
    }

    fn unfix_variables(&mut self) {
        if let Some(saved) = self.saved_bounds.take() {
            for (i, lb, ub) in saved {
                self.lp.lower[i] = lb;
                self.lp.upper[i] = ub;
            }
        }
    }

    fn set_starting_point(&mut self, _indices: &[usize], values: &[f64]) {
        // The LP has no warm start; the point seeds an initial round of
        // cuts instead, which serves the same purpose for Kelley iterations.
        self.starting_point = Some(values.to_vec());
    }

    fn clear_starting_point(&mut self) {
        self.starting_point = None;
    }

    fn update_variable_bound(&mut self, variable: usize, lb: f64, ub: f64) {
        self.lp.lower[variable] = lb;
        self.lp.upper[variable] = ub;
    }

    fn solve(&mut self) -> NlpStatus {
        let cut_indices = self.problem.cut_constraint_indices();

        // Seed cuts at the starting point, if one was provided.
        if let Some(start) = self.starting_point.clone() {
            if start.len() == self.problem.num_variables() {
                for &ci in &cut_indices {
                    let c = self.problem.constraint(ci);
                    if c.calculate(&start).error <= 0.0 {
                        continue;
                    }
                    if let Some((gradient, rhs)) = c.linearization_at(&start) {
                        let terms: Vec<(usize, f64)> =
                            gradient.into_iter().collect();
                        let fp = (ci, Self::point_hash(&start));
                        if self.cut_fingerprints.insert(fp) {
                            self.lp.rows.push(LpRow::less_equal(
                                format!("seed_{}", ci),
                                terms,
                                rhs,
                            ));
                        }
                    }
                }
            }
        }

        for iteration in 0..self.settings.iteration_limit {
            let sol = lp::solve(&self.lp, &self.settings.lp_limits);
            match sol.status {
                LpStatus::Optimal => {}
                LpStatus::Infeasible => return NlpStatus::Infeasible,
                LpStatus::Unbounded => return NlpStatus::Unbounded,
                LpStatus::TimeLimit => return NlpStatus::TimeLimit,
                LpStatus::IterationLimit => return NlpStatus::IterationLimit,
                LpStatus::Error => return NlpStatus::Error,
            }

            let worst = self
                .problem
                .max_constraint_value(&sol.x, &cut_indices)
                .map(|v| v.error)
                .unwrap_or(0.0);

            if worst <= self.settings.constraint_tolerance {
                self.solution = sol.x;
                self.objective = sol.objective;
                log::debug!(
                    "cutting-plane NLP converged after {} iterations ({} cuts)",
                    iteration,
                    self.num_cuts()
                );
                return NlpStatus::Optimal;
            }

            // Cut the most deviating fraction.
            let selected = self.problem.fraction_of_deviating_cut_constraints(
                &sol.x,
                0.0,
                self.settings.constraint_selection_factor,
            );
            let mut added = 0;
            for value in &selected {
                let c = self.problem.constraint(value.index);
                let Some((gradient, rhs)) = c.linearization_at(&sol.x) else {
                    continue;
                };
                let fp = (value.index, Self::point_hash(&sol.x));
                if !self.cut_fingerprints.insert(fp) {
                    continue;
                }
                let terms: Vec<(usize, f64)> = gradient.into_iter().collect();
                self.lp
                    .rows
                    .push(LpRow::less_equal(format!("kelley_{}", value.index), terms, rhs));
                added += 1;
            }

            if added == 0 {
                // No new cut exists at this iterate; it is as good as the
                // linearization can make it.
                self.solution = sol.x;
                self.objective = sol.objective;
                return if worst <= 100.0 * self.settings.constraint_tolerance {
                    NlpStatus::Feasible
                } else {
                    NlpStatus::IterationLimit
                };
            }
        }

        NlpStatus::IterationLimit
    }

    fn solution(&self) -> &[f64] {
        &self.solution
    }

    fn objective_value(&self) -> f64 {
        self.objective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_core::{
        Constraint, Expression, LinearTerm, Objective, ObjectiveSense, QuadraticTerm, VariableType,
    };
    use std::sync::Arc;

    /// min t s.t. x^2 + y^2 - t <= 0, x + y >= 2, x, y in [0, 10]
    /// (epigraph form of scenario S1). Optimum t = 2 at (1, 1).
    fn epigraph_s1() -> Problem {
        let mut p = Problem::new("s1-epi");
        let x = p.add_variable("x", VariableType::Real, 0.0, 10.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, 0.0, 10.0).unwrap();
        let t = p
            .add_variable("t", VariableType::Auxiliary, -1e9, 1e9)
            .unwrap();

        let mut c = Constraint::new(0, "epi", f64::NEG_INFINITY, 0.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        c.linear_terms.push(LinearTerm::new(-1.0, t));
        p.add_constraint(c).unwrap();

        let mut c = Constraint::new(0, "sum", 2.0, f64::INFINITY);
        c.linear_terms.push(LinearTerm::new(1.0, x));
        c.linear_terms.push(LinearTerm::new(1.0, y));
        p.add_constraint(c).unwrap();

        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.linear_terms.push(LinearTerm::new(1.0, t));
        p.set_objective(obj);
        p.finalize().unwrap();
        p
    }

    #[test]
    fn test_kelley_converges_on_convex_qp() {
        let mut nlp = CuttingPlaneNlp::new(epigraph_s1(), NlpSettings::default()).unwrap();
        let status = nlp.solve();
        assert_eq!(status, NlpStatus::Optimal);
        assert!((nlp.objective_value() - 2.0).abs() < 1e-4);
        assert!((nlp.solution()[0] - 1.0).abs() < 1e-2);
        assert!((nlp.solution()[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_fixed_variables_respected() {
        let mut nlp = CuttingPlaneNlp::new(epigraph_s1(), NlpSettings::default()).unwrap();
        // Fix x = 2: optimum becomes t = 4 at (2, 0).
        nlp.fix_variables(&[0], &[2.0]);
        let status = nlp.solve();
        assert_eq!(status, NlpStatus::Optimal);
        assert!((nlp.solution()[0] - 2.0).abs() < 1e-9);
        assert!((nlp.objective_value() - 4.0).abs() < 1e-3);

        nlp.unfix_variables();
        let status = nlp.solve();
        assert_eq!(status, NlpStatus::Optimal);
        assert!((nlp.objective_value() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_infeasible_subproblem() {
        // min t s.t. exp(x) - t <= 0, t <= -1: infeasible since exp > 0.
        let mut p = Problem::new("infeas");
        let x = p.add_variable("x", VariableType::Real, -5.0, 5.0).unwrap();
        let t = p.add_variable("t", VariableType::Real, -10.0, -1.0).unwrap();

        let mut c = Constraint::new(0, "epi", f64::NEG_INFINITY, 0.0);
        c.linear_terms.push(LinearTerm::new(-1.0, t));
        c.expression = Some(Arc::new(Expression::exp(Expression::variable(x))));
        p.add_constraint(c).unwrap();

        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.linear_terms.push(LinearTerm::new(1.0, t));
        p.set_objective(obj);
        p.finalize().unwrap();

        let mut nlp = CuttingPlaneNlp::new(p, NlpSettings::default()).unwrap();
        let status = nlp.solve();
        // Cuts eventually prove LP infeasibility.
        assert!(matches!(
            status,
            NlpStatus::Infeasible | NlpStatus::IterationLimit
        ));
    }

    #[test]
    fn test_nonlinear_objective_rejected() {
        let mut p = Problem::new("nl-obj");
        let x = p.add_variable("x", VariableType::Real, 0.0, 1.0).unwrap();
        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        p.set_objective(obj);
        p.finalize().unwrap();

        assert!(CuttingPlaneNlp::new(p, NlpSettings::default()).is_err());
    }
}
