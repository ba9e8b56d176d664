//! The problem container.
//!
//! A [`Problem`] exclusively owns its variables, constraints and objective in
//! arena vectors; all cross-references are dense indices. Classification
//! views (linear/quadratic/nonlinear constraint index lists, variable type
//! lists) are sorted projections of the master lists, rebuilt by
//! [`Problem::finalize`].

use std::fmt;

use crate::constraint::{sort_by_deviation, Constraint, ConstraintClass, ConstraintValue};
use crate::convexity::Convexity;
use crate::error::{CoreResult, ModelError};
use crate::interval::Interval;
use crate::objective::{Objective, ObjectiveSense};
use crate::variable::{Variable, VariableType};

/// Problem class by content and integrality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ProblemClass {
    Lp,
    Qp,
    Qcqp,
    Nlp,
    Milp,
    Miqp,
    Miqcqp,
    Minlp,
}

/// Problem-level convexity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemConvexity {
    /// Not yet classified.
    NotSet,
    /// Objective and all constraints are convex (or linear).
    Convex,
    /// At least one entity is nonconvex or unclassified.
    Nonconvex,
}

/// Cached structural properties, refreshed by `finalize`.
#[derive(Debug, Clone, Copy)]
pub struct ProblemProperties {
    /// Problem class.
    pub class: ProblemClass,
    /// Convexity verdict.
    pub convexity: ProblemConvexity,
    /// True if any variable is binary or integer.
    pub is_discrete: bool,
    /// True for the reformulated (dual-friendly) problem.
    pub is_reformulated: bool,
    /// Number of variables.
    pub num_variables: usize,
    /// Number of binary variables.
    pub num_binary_variables: usize,
    /// Number of integer (non-binary) variables.
    pub num_integer_variables: usize,
    /// Number of semicontinuous variables.
    pub num_semicontinuous_variables: usize,
    /// Number of auxiliary variables.
    pub num_auxiliary_variables: usize,
    /// Number of constraints.
    pub num_constraints: usize,
    /// Number of linear constraints.
    pub num_linear_constraints: usize,
    /// Number of quadratic constraints.
    pub num_quadratic_constraints: usize,
    /// Number of nonlinear constraints.
    pub num_nonlinear_constraints: usize,
}

impl Default for ProblemProperties {
    fn default() -> Self {
        Self {
            class: ProblemClass::Lp,
            convexity: ProblemConvexity::NotSet,
            is_discrete: false,
            is_reformulated: false,
            num_variables: 0,
            num_binary_variables: 0,
            num_integer_variables: 0,
            num_semicontinuous_variables: 0,
            num_auxiliary_variables: 0,
            num_constraints: 0,
            num_linear_constraints: 0,
            num_quadratic_constraints: 0,
            num_nonlinear_constraints: 0,
        }
    }
}

/// A complete optimization problem.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    /// Problem name.
    pub name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Objective,
    /// Cached structural properties.
    pub properties: ProblemProperties,

    // Sorted projections of the master lists.
    discrete_indices: Vec<usize>,
    real_indices: Vec<usize>,
    linear_constraint_indices: Vec<usize>,
    quadratic_constraint_indices: Vec<usize>,
    nonlinear_constraint_indices: Vec<usize>,

    finalized: bool,
}

impl Problem {
    /// Create an empty problem.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // --- builder API ---

    /// Add a variable, returning its index.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        var_type: VariableType,
        lb: f64,
        ub: f64,
    ) -> CoreResult<usize> {
        if self.finalized {
            return Err(ModelError::AlreadyFinalized(self.name.clone()));
        }
        let name = name.into();
        if lb > ub {
            return Err(ModelError::InvalidBounds {
                name,
                lower: lb,
                upper: ub,
            });
        }
        let index = self.variables.len();
        self.variables.push(Variable::new(index, name, var_type, lb, ub));
        Ok(index)
    }

    /// Add a constraint, assigning its index. Referenced variables must
    /// already be declared.
    pub fn add_constraint(&mut self, mut constraint: Constraint) -> CoreResult<usize> {
        if self.finalized {
            return Err(ModelError::AlreadyFinalized(self.name.clone()));
        }
        let n = self.variables.len();
        if let Some(&bad) = constraint.variables().iter().find(|&&v| v >= n) {
            return Err(ModelError::UnknownVariable(bad));
        }
        for t in &constraint.linear_terms {
            if !t.coefficient.is_finite() {
                return Err(ModelError::NonFiniteCoefficient(constraint.name.clone()));
            }
        }
        for t in &constraint.monomial_terms {
            if t.variables.is_empty() {
                return Err(ModelError::EmptyMonomial(constraint.name.clone()));
            }
        }
        let index = self.constraints.len();
        constraint.index = index;
        self.constraints.push(constraint);
        Ok(index)
    }

    /// Replace the objective.
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = objective;
    }

    /// Validate, build oracles, and refresh all views and properties.
    pub fn finalize(&mut self) -> CoreResult<()> {
        for v in &self.variables {
            if v.lower_bound > v.upper_bound {
                return Err(ModelError::InvalidBounds {
                    name: v.name.clone(),
                    lower: v.lower_bound,
                    upper: v.upper_bound,
                });
            }
        }
        let n = self.variables.len();
        let obj_vars: Vec<usize> = {
            let mut tmp = std::collections::BTreeSet::new();
            for t in &self.objective.linear_terms {
                tmp.insert(t.variable);
            }
            for t in &self.objective.quadratic_terms {
                tmp.insert(t.first);
                tmp.insert(t.second);
            }
            for t in &self.objective.monomial_terms {
                tmp.extend(t.variables.iter().copied());
            }
            for t in &self.objective.signomial_terms {
                tmp.extend(t.elements.iter().map(|e| e.variable));
            }
            if let Some(e) = &self.objective.expression {
                e.collect_variables(&mut tmp);
            }
            tmp.into_iter().collect()
        };
        if let Some(&bad) = obj_vars.iter().find(|&&v| v >= n) {
            return Err(ModelError::UnknownVariable(bad));
        }

        let bounds = self.variable_bounds();
        for c in &mut self.constraints {
            c.build_oracle();
            c.update_properties(&bounds);
        }
        self.objective.build_oracle();
        self.objective.update_properties(&bounds);

        self.update_variable_flags(&obj_vars);
        self.update_views();
        self.update_properties();
        self.finalized = true;
        Ok(())
    }

    fn update_variable_flags(&mut self, objective_vars: &[usize]) {
        for v in &mut self.variables {
            v.properties = Default::default();
        }
        for c in &self.constraints {
            let nonlinear = c.properties.class != ConstraintClass::Linear;
            for t in &c.linear_terms {
                self.variables[t.variable].properties.in_linear_terms = true;
            }
            for t in &c.quadratic_terms {
                for v in [t.first, t.second] {
                    self.variables[v].properties.in_quadratic_terms = true;
                    self.variables[v].properties.in_nonlinear_constraints = true;
                }
            }
            for t in &c.monomial_terms {
                for &v in &t.variables {
                    self.variables[v].properties.in_monomial_terms = true;
                    self.variables[v].properties.in_nonlinear_constraints = true;
                }
            }
            for t in &c.signomial_terms {
                for e in &t.elements {
                    self.variables[e.variable].properties.in_signomial_terms = true;
                    self.variables[e.variable].properties.in_nonlinear_constraints = true;
                }
            }
            if let Some(e) = &c.expression {
                let mut vars = std::collections::BTreeSet::new();
                e.collect_variables(&mut vars);
                for v in vars {
                    self.variables[v].properties.in_nonlinear_expression = true;
                    if nonlinear {
                        self.variables[v].properties.in_nonlinear_constraints = true;
                    }
                }
            }
        }
        for &v in objective_vars {
            self.variables[v].properties.in_objective = true;
        }
    }

    fn update_views(&mut self) {
        self.discrete_indices = self
            .variables
            .iter()
            .filter(|v| v.is_discrete())
            .map(|v| v.index)
            .collect();
        self.real_indices = self
            .variables
            .iter()
            .filter(|v| !v.is_discrete())
            .map(|v| v.index)
            .collect();
        self.linear_constraint_indices = self
            .constraints
            .iter()
            .filter(|c| c.properties.class == ConstraintClass::Linear)
            .map(|c| c.index)
            .collect();
        self.quadratic_constraint_indices = self
            .constraints
            .iter()
            .filter(|c| c.properties.class == ConstraintClass::Quadratic)
            .map(|c| c.index)
            .collect();
        self.nonlinear_constraint_indices = self
            .constraints
            .iter()
            .filter(|c| c.properties.class == ConstraintClass::Nonlinear)
            .map(|c| c.index)
            .collect();
    }

    fn update_properties(&mut self) {
        let p = &mut self.properties;
        p.num_variables = self.variables.len();
        p.num_binary_variables = self
            .variables
            .iter()
            .filter(|v| v.var_type == VariableType::Binary)
            .count();
        p.num_integer_variables = self
            .variables
            .iter()
            .filter(|v| v.var_type == VariableType::Integer)
            .count();
        p.num_semicontinuous_variables = self
            .variables
            .iter()
            .filter(|v| v.var_type == VariableType::Semicontinuous)
            .count();
        p.num_auxiliary_variables = self
            .variables
            .iter()
            .filter(|v| v.var_type == VariableType::Auxiliary)
            .count();
        p.num_constraints = self.constraints.len();
        p.num_linear_constraints = self.linear_constraint_indices.len();
        p.num_quadratic_constraints = self.quadratic_constraint_indices.len();
        p.num_nonlinear_constraints = self.nonlinear_constraint_indices.len();
        p.is_discrete = !self.discrete_indices.is_empty();

        let has_nonlinear =
            p.num_nonlinear_constraints > 0 || self.objective.class == ConstraintClass::Nonlinear;
        let has_quadratic_constraints = p.num_quadratic_constraints > 0;
        let has_quadratic_objective = self.objective.class == ConstraintClass::Quadratic;

        p.class = match (
            p.is_discrete,
            has_nonlinear,
            has_quadratic_constraints,
            has_quadratic_objective,
        ) {
            (false, true, _, _) => ProblemClass::Nlp,
            (true, true, _, _) => ProblemClass::Minlp,
            (false, false, true, _) => ProblemClass::Qcqp,
            (true, false, true, _) => ProblemClass::Miqcqp,
            (false, false, false, true) => ProblemClass::Qp,
            (true, false, false, true) => ProblemClass::Miqp,
            (false, false, false, false) => ProblemClass::Lp,
            (true, false, false, false) => ProblemClass::Milp,
        };

        let objective_ok = match self.objective.sense {
            ObjectiveSense::Minimize => self.objective.convexity.is_convex_or_linear(),
            ObjectiveSense::Maximize => self.objective.convexity.is_concave_or_linear(),
        };
        let constraints_ok = self
            .constraints
            .iter()
            .filter(|c| c.properties.class != ConstraintClass::Linear)
            .all(|c| c.properties.convexity.is_convex_or_linear());
        p.convexity = if objective_ok && constraints_ok {
            ProblemConvexity::Convex
        } else {
            ProblemConvexity::Nonconvex
        };
    }

    /// Override the convexity verdict (the `Convexity.AssumeConvex` option).
    pub fn assume_convex(&mut self) {
        self.properties.convexity = ProblemConvexity::Convex;
    }

    /// Mark this problem as the reformulated one.
    pub fn mark_reformulated(&mut self) {
        self.properties.is_reformulated = true;
    }

    // --- accessors ---

    /// True once `finalize` has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of constraints.
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// All variables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// A variable by index.
    pub fn variable(&self, index: usize) -> &Variable {
        &self.variables[index]
    }

    /// All constraints.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// A constraint by index.
    pub fn constraint(&self, index: usize) -> &Constraint {
        &self.constraints[index]
    }

    /// The objective.
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Indices of binary/integer variables.
    pub fn discrete_variable_indices(&self) -> &[usize] {
        &self.discrete_indices
    }

    /// Indices of continuous variables.
    pub fn real_variable_indices(&self) -> &[usize] {
        &self.real_indices
    }

    /// Indices of linear constraints.
    pub fn linear_constraint_indices(&self) -> &[usize] {
        &self.linear_constraint_indices
    }

    /// Indices of quadratic constraints.
    pub fn quadratic_constraint_indices(&self) -> &[usize] {
        &self.quadratic_constraint_indices
    }

    /// Indices of nonlinear constraints.
    pub fn nonlinear_constraint_indices(&self) -> &[usize] {
        &self.nonlinear_constraint_indices
    }

    /// Constraints approximated by hyperplanes: the quadratic and nonlinear
    /// classes (the reference master accepts only linear rows).
    pub fn cut_constraint_indices(&self) -> Vec<usize> {
        let mut out = self.quadratic_constraint_indices.clone();
        out.extend(&self.nonlinear_constraint_indices);
        out.sort_unstable();
        out
    }

    /// Lower-bound vector.
    pub fn variable_lower_bounds(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.lower_bound).collect()
    }

    /// Upper-bound vector.
    pub fn variable_upper_bounds(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.upper_bound).collect()
    }

    /// Bound-interval vector.
    pub fn variable_bounds(&self) -> Vec<Interval> {
        self.variables.iter().map(|v| v.bound()).collect()
    }

    /// Set both bounds of a variable, refreshing convexity context lazily.
    pub fn set_variable_bounds(&mut self, index: usize, lb: f64, ub: f64) {
        let v = &mut self.variables[index];
        v.lower_bound = lb;
        v.upper_bound = ub;
    }

    /// Mutable variable access for bound tightening.
    pub(crate) fn variable_mut(&mut self, index: usize) -> &mut Variable {
        &mut self.variables[index]
    }

    // --- evaluation and deviation queries ---

    /// Objective value at a point.
    pub fn objective_value(&self, point: &[f64]) -> f64 {
        self.objective.value(point)
    }

    /// Most deviating numeric constraint at a point.
    pub fn most_deviating_constraint(&self, point: &[f64]) -> Option<ConstraintValue> {
        self.max_constraint_value(point, (0..self.constraints.len()).collect::<Vec<_>>().as_slice())
    }

    /// Most deviating constraint among `selection` at a point.
    pub fn max_constraint_value(
        &self,
        point: &[f64],
        selection: &[usize],
    ) -> Option<ConstraintValue> {
        selection
            .iter()
            .map(|&i| self.constraints[i].calculate(point))
            .filter(|v| v.normalized_value.is_finite())
            .max_by(|a, b| {
                a.normalized_value
                    .partial_cmp(&b.normalized_value)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// All constraints violated by more than `tolerance` at a point.
    pub fn all_deviating_constraints(&self, point: &[f64], tolerance: f64) -> Vec<ConstraintValue> {
        let mut out: Vec<ConstraintValue> = self
            .constraints
            .iter()
            .map(|c| c.calculate(point))
            .filter(|v| v.error > tolerance)
            .collect();
        sort_by_deviation(&mut out);
        out
    }

    /// The most deviating fraction of cut (quadratic + nonlinear)
    /// constraints at a point.
    ///
    /// Values are sorted by descending normalized deviation; at least one and
    /// at most `ceil(fraction * count)` of those above `tolerance` are kept.
    pub fn fraction_of_deviating_cut_constraints(
        &self,
        point: &[f64],
        tolerance: f64,
        fraction: f64,
    ) -> Vec<ConstraintValue> {
        let mut values: Vec<ConstraintValue> = self
            .cut_constraint_indices()
            .iter()
            .map(|&i| self.constraints[i].calculate(point))
            .filter(|v| v.normalized_value.is_finite() && v.normalized_value > tolerance)
            .collect();
        sort_by_deviation(&mut values);
        if values.is_empty() {
            return values;
        }
        let keep = ((fraction * values.len() as f64).ceil() as usize).clamp(1, values.len());
        values.truncate(keep);
        values
    }

    // --- feasibility checks ---

    /// True if all variable bounds hold within `tolerance`.
    pub fn are_variable_bounds_fulfilled(&self, point: &[f64], tolerance: f64) -> bool {
        self.variables.iter().all(|v| {
            point[v.index] >= v.lower_bound - tolerance && point[v.index] <= v.upper_bound + tolerance
        })
    }

    /// True if all linear constraints hold within `tolerance`.
    pub fn are_linear_constraints_fulfilled(&self, point: &[f64], tolerance: f64) -> bool {
        self.linear_constraint_indices
            .iter()
            .all(|&i| self.constraints[i].is_fulfilled(point, tolerance))
    }

    /// True if all quadratic constraints hold within `tolerance`.
    pub fn are_quadratic_constraints_fulfilled(&self, point: &[f64], tolerance: f64) -> bool {
        self.quadratic_constraint_indices
            .iter()
            .all(|&i| self.constraints[i].is_fulfilled(point, tolerance))
    }

    /// True if all nonlinear constraints hold within `tolerance`.
    pub fn are_nonlinear_constraints_fulfilled(&self, point: &[f64], tolerance: f64) -> bool {
        self.nonlinear_constraint_indices
            .iter()
            .all(|&i| self.constraints[i].is_fulfilled(point, tolerance))
    }

    /// True if every discrete variable is integral within `tolerance`.
    pub fn are_integrality_constraints_fulfilled(&self, point: &[f64], tolerance: f64) -> bool {
        self.discrete_indices
            .iter()
            .all(|&i| (point[i] - point[i].round()).abs() <= tolerance)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:?}, {} variables ({} discrete), {} constraints ({} lin / {} quad / {} nl)",
            self.name,
            self.properties.class,
            self.properties.num_variables,
            self.discrete_indices.len(),
            self.properties.num_constraints,
            self.properties.num_linear_constraints,
            self.properties.num_quadratic_constraints,
            self.properties.num_nonlinear_constraints,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::term::{LinearTerm, QuadraticTerm};
    use std::sync::Arc;

    /// min x^2 + y^2 s.t. x + y >= 2, x, y >= 0 (scenario S1's model).
    fn sum_of_squares_problem() -> Problem {
        let mut p = Problem::new("s1");
        let x = p.add_variable("x", VariableType::Real, 0.0, 10.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, 0.0, 10.0).unwrap();

        let mut c = Constraint::new(0, "c0", 2.0, f64::INFINITY);
        c.linear_terms.push(LinearTerm::new(1.0, x));
        c.linear_terms.push(LinearTerm::new(1.0, y));
        p.add_constraint(c).unwrap();

        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        obj.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        p.set_objective(obj);

        p.finalize().unwrap();
        p
    }

    #[test]
    fn test_finalize_classifies() {
        let p = sum_of_squares_problem();
        assert_eq!(p.properties.class, ProblemClass::Qp);
        assert_eq!(p.properties.convexity, ProblemConvexity::Convex);
        assert_eq!(p.properties.num_linear_constraints, 1);
        assert!(!p.properties.is_discrete);
    }

    #[test]
    fn test_objective_value() {
        let p = sum_of_squares_problem();
        assert!((p.objective_value(&[1.0, 1.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut p = Problem::new("bad");
        let err = p.add_variable("x", VariableType::Real, 1.0, -1.0);
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let mut p = Problem::new("bad");
        p.add_variable("x", VariableType::Real, 0.0, 1.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 0.0);
        c.linear_terms.push(LinearTerm::new(1.0, 5));
        assert!(p.add_constraint(c).is_err());
    }

    #[test]
    fn test_discrete_views() {
        let mut p = Problem::new("mixed");
        p.add_variable("x", VariableType::Real, 0.0, 1.0).unwrap();
        p.add_variable("b", VariableType::Binary, 0.0, 1.0).unwrap();
        p.add_variable("n", VariableType::Integer, 0.0, 5.0).unwrap();
        p.finalize().unwrap();

        assert_eq!(p.discrete_variable_indices(), &[1, 2]);
        assert_eq!(p.real_variable_indices(), &[0]);
        assert_eq!(p.properties.class, ProblemClass::Milp);
    }

    #[test]
    fn test_most_deviating_constraint() {
        let mut p = Problem::new("dev");
        let x = p.add_variable("x", VariableType::Real, -5.0, 5.0).unwrap();

        // x^2 <= 4
        let mut c = Constraint::new(0, "sq", f64::NEG_INFINITY, 4.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        p.add_constraint(c).unwrap();

        // exp(x) <= 1
        let mut c = Constraint::new(0, "ex", f64::NEG_INFINITY, 1.0);
        c.expression = Some(Arc::new(Expression::exp(Expression::variable(x))));
        p.add_constraint(c).unwrap();

        p.finalize().unwrap();

        let worst = p.most_deviating_constraint(&[3.0]).unwrap();
        // exp(3) - 1 normalized by 1 beats (9-4)/4.
        assert_eq!(worst.index, 1);

        let fraction = p.fraction_of_deviating_cut_constraints(&[3.0], 0.0, 1.0);
        assert_eq!(fraction.len(), 2);
        assert_eq!(fraction[0].index, 1);
    }

    #[test]
    fn test_integrality_check() {
        let mut p = Problem::new("int");
        p.add_variable("n", VariableType::Integer, 0.0, 5.0).unwrap();
        p.finalize().unwrap();

        assert!(p.are_integrality_constraints_fulfilled(&[3.0000001], 1e-6));
        assert!(!p.are_integrality_constraints_fulfilled(&[3.4], 1e-6));
    }

    #[test]
    fn test_minlp_classification() {
        let mut p = Problem::new("minlp");
        let x = p.add_variable("x", VariableType::Integer, -1.0, 1.0).unwrap();
        let z = p.add_variable("z", VariableType::Real, -10.0, 10.0).unwrap();

        // z - exp(x) <= 0
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 0.0);
        c.linear_terms.push(LinearTerm::new(1.0, z));
        c.expression = Some(Arc::new(Expression::negate(Expression::exp(
            Expression::variable(x),
        ))));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        assert_eq!(p.properties.class, ProblemClass::Minlp);
        assert_eq!(p.properties.num_nonlinear_constraints, 1);
    }
}
