//! Problem reformulation: raw problem to dual-friendly problem.
//!
//! The pass applies, in order:
//!
//! 1. sense normalization (maximization becomes minimization),
//! 2. LHS/RHS canonicalization of the cut (quadratic + nonlinear)
//!    constraints to `body <= RHS` form, splitting two-sided constraints
//!    (linear constraints stay ranged rows, which the master handles
//!    directly),
//! 3. epigraph reformulation of a non-linear objective,
//! 4. bilinear-term substitution with memoized product auxiliaries and
//!    McCormick envelopes (AND-linearization for binary pairs),
//! 5. optional separable partitioning of convex quadratic/signomial sums.
//!
//! The output problem plus a [`ReformulationMap`] that back-projects
//! reformulated points into the original variable space. Reformulating an
//! already-reformulated problem is a no-op.

use std::collections::BTreeMap;

use shale_core::{
    Constraint, ConstraintClass, Convexity, Expression, LinearTerm, Objective, ObjectiveSense,
    Problem, QuadraticTerm, VariableType,
};

use crate::error::OaResult;
use crate::settings::Settings;

/// What an auxiliary variable stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum AuxiliaryKind {
    /// The epigraph objective variable `t` with `f(x) - t <= 0`.
    EpigraphObjective,
    /// A bilinear product `w = x_first * x_second`.
    BilinearProduct {
        /// First factor.
        first: usize,
        /// Second factor.
        second: usize,
    },
    /// A partition variable `w >= g_k(x)` of a separable sum.
    PartitionTerm {
        /// The constraint the sum came from.
        constraint: usize,
    },
}

/// One auxiliary variable and its defining relation.
#[derive(Debug, Clone)]
pub struct AuxiliaryDefinition {
    /// Index in the reformulated problem.
    pub variable: usize,
    /// Defining relation.
    pub kind: AuxiliaryKind,
}

/// Mapping from the reformulated space back to the original space.
#[derive(Debug, Clone, Default)]
pub struct ReformulationMap {
    /// Number of original variables (they form the prefix).
    pub original_variable_count: usize,
    /// True if the objective was negated (original sense: maximize).
    pub objective_negated: bool,
    /// The epigraph variable, if one was introduced.
    pub epigraph_variable: Option<usize>,
    /// All auxiliary variables with their defining relations.
    pub auxiliaries: Vec<AuxiliaryDefinition>,
}

impl ReformulationMap {
    /// Project a reformulated point onto the original variable space.
    pub fn back_project(&self, point: &[f64]) -> Vec<f64> {
        point[..self.original_variable_count.min(point.len())].to_vec()
    }

    /// Sign converting original objective values into the internal
    /// minimization sense.
    pub fn objective_sign(&self) -> f64 {
        if self.objective_negated {
            -1.0
        } else {
            1.0
        }
    }

    /// Lift an original-space point into the reformulated space by
    /// evaluating the auxiliary definitions. Returns None when an auxiliary
    /// has no closed-form value (partition variables).
    pub fn lift(
        &self,
        original_point: &[f64],
        total_variables: usize,
        internal_objective: f64,
    ) -> Option<Vec<f64>> {
        let mut out = original_point.to_vec();
        out.resize(total_variables, 0.0);
        for aux in &self.auxiliaries {
            match aux.kind {
                AuxiliaryKind::EpigraphObjective => out[aux.variable] = internal_objective,
                AuxiliaryKind::BilinearProduct { first, second } => {
                    out[aux.variable] = out[first] * out[second];
                }
                AuxiliaryKind::PartitionTerm { .. } => return None,
            }
        }
        Some(out)
    }
}

/// Negate every term bag of a constraint body in place.
fn negate_body(constraint: &mut Constraint) {
    constraint.constant = -constraint.constant;
    for t in &mut constraint.linear_terms {
        t.coefficient = -t.coefficient;
    }
    for t in &mut constraint.quadratic_terms {
        t.coefficient = -t.coefficient;
    }
    for t in &mut constraint.monomial_terms {
        t.coefficient = -t.coefficient;
    }
    for t in &mut constraint.signomial_terms {
        t.coefficient = -t.coefficient;
    }
    if let Some(e) = constraint.expression.take() {
        constraint.expression = Some(std::sync::Arc::new(Expression::negate((*e).clone())));
    }
}

/// Run the reformulation pass.
pub fn reformulate(original: &Problem, settings: &Settings) -> OaResult<(Problem, ReformulationMap)> {
    if original.properties.is_reformulated {
        // Idempotence: a reformulated problem passes through unchanged.
        return Ok((
            original.clone(),
            ReformulationMap {
                original_variable_count: original.num_variables(),
                ..Default::default()
            },
        ));
    }

    let mut problem = Problem::new(format!("{}_reformulated", original.name));
    let mut map = ReformulationMap {
        original_variable_count: original.num_variables(),
        ..Default::default()
    };

    for v in original.variables() {
        problem.add_variable(v.name.clone(), v.var_type, v.lower_bound, v.upper_bound)?;
    }

    // Sense normalization.
    let mut objective = original.objective().clone();
    if objective.sense == ObjectiveSense::Maximize {
        map.objective_negated = true;
        objective.sense = ObjectiveSense::Minimize;
        objective.constant = -objective.constant;
        for t in &mut objective.linear_terms {
            t.coefficient = -t.coefficient;
        }
        for t in &mut objective.quadratic_terms {
            t.coefficient = -t.coefficient;
        }
        for t in &mut objective.monomial_terms {
            t.coefficient = -t.coefficient;
        }
        for t in &mut objective.signomial_terms {
            t.coefficient = -t.coefficient;
        }
        if let Some(e) = objective.expression.take() {
            objective.expression = Some(std::sync::Arc::new(Expression::negate((*e).clone())));
        }
    }

    // Canonicalize constraints.
    let mut constraints: Vec<Constraint> = Vec::new();
    for c in original.constraints() {
        if c.properties.class == ConstraintClass::Linear {
            // Ranged linear rows go to the master as-is.
            constraints.push(c.clone());
            continue;
        }
        if c.is_equality() {
            let mut upper = c.clone();
            upper.lhs = f64::NEG_INFINITY;
            upper.name = format!("{}_ub", c.name);
            constraints.push(upper);

            let mut lower = c.clone();
            lower.name = format!("{}_lb", c.name);
            negate_body(&mut lower);
            lower.rhs = -c.lhs;
            lower.lhs = f64::NEG_INFINITY;
            constraints.push(lower);
            continue;
        }
        if c.rhs.is_finite() {
            let mut upper = c.clone();
            upper.lhs = f64::NEG_INFINITY;
            constraints.push(upper);
        }
        if c.lhs.is_finite() {
            let mut lower = c.clone();
            lower.name = if c.rhs.is_finite() {
                format!("{}_lb", c.name)
            } else {
                c.name.clone()
            };
            negate_body(&mut lower);
            lower.rhs = -c.lhs;
            lower.lhs = f64::NEG_INFINITY;
            constraints.push(lower);
        }
    }

    // Epigraph reformulation of a non-linear objective.
    let is_nonlinear_objective = objective.class != ConstraintClass::Linear
        || !objective.quadratic_terms.is_empty()
        || !objective.monomial_terms.is_empty()
        || !objective.signomial_terms.is_empty()
        || objective.expression.is_some();
    if is_nonlinear_objective {
        // Bound t by the objective's interval over the variable box.
        let bounds = original.variable_bounds();
        let mut body_interval = shale_core::Interval::singleton(objective.constant);
        for t in &objective.linear_terms {
            body_interval = body_interval + t.interval(&bounds);
        }
        for t in &objective.quadratic_terms {
            body_interval = body_interval + t.interval(&bounds);
        }
        for t in &objective.monomial_terms {
            body_interval = body_interval + t.interval(&bounds);
        }
        for t in &objective.signomial_terms {
            body_interval = body_interval + t.interval(&bounds);
        }
        if let Some(e) = &objective.expression {
            body_interval = body_interval + e.interval(&bounds);
        }
        let t_lower = if body_interval.lo.is_finite() {
            body_interval.lo - 1.0
        } else {
            -1e12
        };
        let t_upper = if body_interval.hi.is_finite() {
            body_interval.hi + 1.0
        } else {
            1e12
        };

        let t = problem.add_variable("objvar", VariableType::Auxiliary, t_lower, t_upper)?;
        map.epigraph_variable = Some(t);
        map.auxiliaries.push(AuxiliaryDefinition {
            variable: t,
            kind: AuxiliaryKind::EpigraphObjective,
        });

        let mut epi = Constraint::new(0, "objective_epigraph", f64::NEG_INFINITY, 0.0);
        epi.constant = objective.constant;
        epi.linear_terms = objective.linear_terms.clone();
        epi.linear_terms.push(LinearTerm::new(-1.0, t));
        epi.quadratic_terms = objective.quadratic_terms.clone();
        epi.monomial_terms = objective.monomial_terms.clone();
        epi.signomial_terms = objective.signomial_terms.clone();
        epi.expression = objective.expression.clone();
        constraints.push(epi);

        objective = Objective::new(ObjectiveSense::Minimize);
        objective.linear_terms.push(LinearTerm::new(1.0, t));
    }

    // Bilinear substitution with McCormick envelopes.
    if settings.get_bool("Model.Reformulation.Bilinear.UseMcCormick") {
        let mut products: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        let mut mccormick_rows: Vec<Constraint> = Vec::new();

        for c in constraints.iter_mut() {
            if c.quadratic_terms.iter().all(|t| t.is_square()) {
                continue;
            }
            let mut kept = Vec::new();
            for term in c.quadratic_terms.drain(..) {
                if term.is_square() {
                    kept.push(term);
                    continue;
                }
                let (i, j) = if term.first <= term.second {
                    (term.first, term.second)
                } else {
                    (term.second, term.first)
                };
                let (xi, xj) = (problem.variable(i).clone(), problem.variable(j).clone());
                let both_binary = xi.var_type == VariableType::Binary
                    && xj.var_type == VariableType::Binary;
                if !both_binary
                    && !(xi.bound().is_finite() && xj.bound().is_finite())
                {
                    log::debug!(
                        "bilinear pair ({}, {}) unbounded, keeping the product term",
                        xi.name,
                        xj.name
                    );
                    kept.push(term);
                    continue;
                }

                let w = match products.get(&(i, j)) {
                    Some(&w) => w,
                    None => {
                        let product_bound = xi.bound() * xj.bound();
                        let w = problem.add_variable(
                            format!("w_{}_{}", xi.name, xj.name),
                            VariableType::Auxiliary,
                            product_bound.lo,
                            product_bound.hi,
                        )?;
                        products.insert((i, j), w);
                        map.auxiliaries.push(AuxiliaryDefinition {
                            variable: w,
                            kind: AuxiliaryKind::BilinearProduct { first: i, second: j },
                        });

                        if both_binary {
                            // w = x AND y: three-inequality linearization.
                            let mut r = Constraint::new(0, format!("and1_{}", w), f64::NEG_INFINITY, 0.0);
                            r.linear_terms.push(LinearTerm::new(1.0, w));
                            r.linear_terms.push(LinearTerm::new(-1.0, i));
                            mccormick_rows.push(r);

                            let mut r = Constraint::new(0, format!("and2_{}", w), f64::NEG_INFINITY, 0.0);
                            r.linear_terms.push(LinearTerm::new(1.0, w));
                            r.linear_terms.push(LinearTerm::new(-1.0, j));
                            mccormick_rows.push(r);

                            let mut r = Constraint::new(0, format!("and3_{}", w), f64::NEG_INFINITY, 1.0);
                            r.linear_terms.push(LinearTerm::new(1.0, i));
                            r.linear_terms.push(LinearTerm::new(1.0, j));
                            r.linear_terms.push(LinearTerm::new(-1.0, w));
                            mccormick_rows.push(r);
                        } else {
                            let (lx, ux) = (xi.lower_bound, xi.upper_bound);
                            let (ly, uy) = (xj.lower_bound, xj.upper_bound);
                            // Under-estimators: w >= lx y + ly x - lx ly,
                            //                   w >= ux y + uy x - ux uy.
                            let mut r = Constraint::new(0, format!("mc1_{}", w), f64::NEG_INFINITY, lx * ly);
                            r.linear_terms.push(LinearTerm::new(lx, j));
                            r.linear_terms.push(LinearTerm::new(ly, i));
                            r.linear_terms.push(LinearTerm::new(-1.0, w));
                            mccormick_rows.push(r);

                            let mut r = Constraint::new(0, format!("mc2_{}", w), f64::NEG_INFINITY, ux * uy);
                            r.linear_terms.push(LinearTerm::new(ux, j));
                            r.linear_terms.push(LinearTerm::new(uy, i));
                            r.linear_terms.push(LinearTerm::new(-1.0, w));
                            mccormick_rows.push(r);

                            // Over-estimators: w <= ux y + ly x - ux ly,
                            //                  w <= lx y + uy x - lx uy.
                            let mut r = Constraint::new(0, format!("mc3_{}", w), f64::NEG_INFINITY, -ux * ly);
                            r.linear_terms.push(LinearTerm::new(1.0, w));
                            r.linear_terms.push(LinearTerm::new(-ux, j));
                            r.linear_terms.push(LinearTerm::new(-ly, i));
                            mccormick_rows.push(r);

                            let mut r = Constraint::new(0, format!("mc4_{}", w), f64::NEG_INFINITY, -lx * uy);
                            r.linear_terms.push(LinearTerm::new(1.0, w));
                            r.linear_terms.push(LinearTerm::new(-lx, j));
                            r.linear_terms.push(LinearTerm::new(-uy, i));
                            mccormick_rows.push(r);
                        }
                        w
                    }
                };
                c.linear_terms.push(LinearTerm::new(term.coefficient, w));
            }
            c.quadratic_terms = kept;
        }
        constraints.extend(mccormick_rows);
    }

    // Separable partitioning of convex quadratic/signomial sums.
    if settings.get_bool("Model.Reformulation.PartitionQuadraticSums") {
        partition_quadratic_sums(&mut problem, &mut constraints, &mut map)?;
    }
    if settings.get_bool("Model.Reformulation.PartitionSignomialSums") {
        partition_signomial_sums(&mut problem, &mut constraints, &mut map)?;
    }

    for c in constraints {
        problem.add_constraint(c)?;
    }
    problem.set_objective(objective);
    problem.finalize()?;
    if settings.get_bool("Convexity.AssumeConvex") {
        problem.assume_convex();
    }
    problem.mark_reformulated();

    Ok((problem, map))
}

/// Split `sum_k g_k(x) <= rhs` with individually convex square terms into
/// `g_k - w_k <= 0` plus a linear aggregator.
fn partition_quadratic_sums(
    problem: &mut Problem,
    constraints: &mut Vec<Constraint>,
    map: &mut ReformulationMap,
) -> OaResult<()> {
    let mut new_constraints = Vec::new();
    for (ci, c) in constraints.iter_mut().enumerate() {
        if c.quadratic_terms.len() < 2 || !c.is_canonical() {
            continue;
        }
        let all_convex = c
            .quadratic_terms
            .iter()
            .all(|t| t.is_square() && t.convexity() == Convexity::Convex);
        if !all_convex {
            continue;
        }
        for term in c.quadratic_terms.drain(..) {
            let w = problem.add_variable(
                format!("wpart_{}_{}", ci, term.first),
                VariableType::Auxiliary,
                0.0,
                f64::INFINITY,
            )?;
            map.auxiliaries.push(AuxiliaryDefinition {
                variable: w,
                kind: AuxiliaryKind::PartitionTerm { constraint: ci },
            });
            let mut part = Constraint::new(
                0,
                format!("part_{}_{}", ci, term.first),
                f64::NEG_INFINITY,
                0.0,
            );
            part.quadratic_terms.push(term);
            part.linear_terms.push(LinearTerm::new(-1.0, w));
            new_constraints.push(part);
            c.linear_terms.push(LinearTerm::new(1.0, w));
        }
    }
    constraints.extend(new_constraints);
    Ok(())
}

/// Split a sum of individually convex signomial terms the same way.
fn partition_signomial_sums(
    problem: &mut Problem,
    constraints: &mut Vec<Constraint>,
    map: &mut ReformulationMap,
) -> OaResult<()> {
    let mut new_constraints = Vec::new();
    for (ci, c) in constraints.iter_mut().enumerate() {
        if c.signomial_terms.len() < 2 || !c.is_canonical() {
            continue;
        }
        let all_convex = c
            .signomial_terms
            .iter()
            .all(|t| t.convexity() == Convexity::Convex);
        if !all_convex {
            continue;
        }
        for (k, term) in c.signomial_terms.drain(..).enumerate() {
            let w = problem.add_variable(
                format!("wsig_{}_{}", ci, k),
                VariableType::Auxiliary,
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            map.auxiliaries.push(AuxiliaryDefinition {
                variable: w,
                kind: AuxiliaryKind::PartitionTerm { constraint: ci },
            });
            let mut part =
                Constraint::new(0, format!("sigpart_{}_{}", ci, k), f64::NEG_INFINITY, 0.0);
            part.signomial_terms.push(term);
            part.linear_terms.push(LinearTerm::new(-1.0, w));
            new_constraints.push(part);
            c.linear_terms.push(LinearTerm::new(1.0, w));
        }
    }
    constraints.extend(new_constraints);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_core::{MonomialTerm, ProblemClass};

    fn settings() -> Settings {
        Settings::default()
    }

    /// min x^2 + y^2 s.t. x + y >= 2 (scenario S1's model).
    fn s1() -> Problem {
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
    fn test_epigraph_reformulation() {
        let original = s1();
        let (reformulated, map) = reformulate(&original, &settings()).unwrap();

        // One auxiliary epigraph variable, linear objective.
        assert_eq!(reformulated.num_variables(), 3);
        let t = map.epigraph_variable.unwrap();
        assert_eq!(t, 2);
        assert_eq!(reformulated.objective().class, ConstraintClass::Linear);

        // The epigraph constraint evaluates f(x) - t.
        let epi = reformulated
            .constraints()
            .iter()
            .find(|c| c.name == "objective_epigraph")
            .unwrap();
        let v = epi.body_value(&[1.0, 1.0, 2.0]);
        assert!(v.abs() < 1e-12);

        // Objective value at a reformulated point equals t.
        assert!((reformulated.objective_value(&[1.0, 1.0, 2.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_reformulation_is_idempotent() {
        let original = s1();
        let (once, _) = reformulate(&original, &settings()).unwrap();
        let (twice, map) = reformulate(&once, &settings()).unwrap();
        assert_eq!(once.num_variables(), twice.num_variables());
        assert_eq!(once.num_constraints(), twice.num_constraints());
        assert!(map.epigraph_variable.is_none());
    }

    #[test]
    fn test_maximization_negated() {
        let mut p = Problem::new("max");
        let x = p.add_variable("x", VariableType::Real, 0.0, 1.0).unwrap();
        let mut obj = Objective::new(ObjectiveSense::Maximize);
        obj.linear_terms.push(LinearTerm::new(3.0, x));
        p.set_objective(obj);
        p.finalize().unwrap();

        let (reformulated, map) = reformulate(&p, &settings()).unwrap();
        assert!(map.objective_negated);
        assert_eq!(reformulated.objective().sense, ObjectiveSense::Minimize);
        // max 3x at x=1 is 3; internally min -3x gives -3.
        assert!((reformulated.objective_value(&[1.0]) + 3.0).abs() < 1e-12);
        assert_eq!(map.objective_sign(), -1.0);
    }

    #[test]
    fn test_two_sided_nonlinear_constraint_split() {
        let mut p = Problem::new("two-sided");
        let x = p.add_variable("x", VariableType::Real, -5.0, 5.0).unwrap();
        let mut c = Constraint::new(0, "ring", 1.0, 4.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        let (reformulated, _) = reformulate(&p, &settings()).unwrap();
        // 1 <= x^2 <= 4 becomes x^2 <= 4 and -x^2 <= -1.
        assert_eq!(reformulated.num_constraints(), 2);
        for c in reformulated.constraints() {
            assert!(c.is_canonical());
        }
        let low = reformulated
            .constraints()
            .iter()
            .find(|c| c.name.ends_with("_lb"))
            .unwrap();
        assert!((low.body_value(&[1.0]) + 1.0).abs() < 1e-12);
        assert_eq!(low.rhs, -1.0);
    }

    #[test]
    fn test_bilinear_mccormick() {
        // x*y >= 4 with x, y in [1, 10] (scenario S5's constraint).
        let mut p = Problem::new("bilinear");
        let x = p.add_variable("x", VariableType::Integer, 1.0, 10.0).unwrap();
        let y = p.add_variable("y", VariableType::Integer, 1.0, 10.0).unwrap();
        let mut c = Constraint::new(0, "prod", 4.0, f64::INFINITY);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, y));
        p.add_constraint(c).unwrap();
        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.linear_terms.push(LinearTerm::new(1.0, x));
        obj.linear_terms.push(LinearTerm::new(1.0, y));
        p.set_objective(obj);
        p.finalize().unwrap();

        let (reformulated, map) = reformulate(&p, &settings()).unwrap();

        // One product auxiliary with bounds [1, 100].
        let aux = map
            .auxiliaries
            .iter()
            .find(|a| matches!(a.kind, AuxiliaryKind::BilinearProduct { .. }))
            .unwrap();
        let w = reformulated.variable(aux.variable);
        assert_eq!(w.lower_bound, 1.0);
        assert_eq!(w.upper_bound, 100.0);

        // The product constraint became linear in w; four McCormick rows.
        assert_eq!(reformulated.properties.num_linear_constraints, 1 + 4);
        assert_eq!(reformulated.properties.num_quadratic_constraints, 0);

        // McCormick rows hold at an exact product point (2, 3, w=6).
        for c in reformulated.constraints() {
            if c.name.starts_with("mc") {
                assert!(c.is_fulfilled(&[2.0, 3.0, 6.0], 1e-9));
            }
        }
        // And cut off an inconsistent product (w far from x*y).
        let violated = reformulated
            .constraints()
            .iter()
            .filter(|c| c.name.starts_with("mc"))
            .any(|c| !c.is_fulfilled(&[2.0, 3.0, 90.0], 1e-9));
        assert!(violated);
    }

    #[test]
    fn test_binary_product_linearized_as_and() {
        let mut p = Problem::new("binprod");
        let x = p.add_variable("x", VariableType::Binary, 0.0, 1.0).unwrap();
        let y = p.add_variable("y", VariableType::Binary, 0.0, 1.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 0.5);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, y));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        let (reformulated, _) = reformulate(&p, &settings()).unwrap();
        let and_rows = reformulated
            .constraints()
            .iter()
            .filter(|c| c.name.starts_with("and"))
            .count();
        assert_eq!(and_rows, 3);

        // w = x AND y at all four binary points.
        for (x, y) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
            let w = x * y;
            for c in reformulated.constraints() {
                if c.name.starts_with("and") {
                    assert!(c.is_fulfilled(&[x, y, w], 1e-9));
                }
            }
        }
    }

    #[test]
    fn test_quadratic_sum_partitioning() {
        use crate::settings::SettingValue;

        // x^2 + y^2 <= 4 splits into two epigraph parts plus an aggregator.
        let mut p = Problem::new("part");
        let x = p.add_variable("x", VariableType::Real, -2.0, 2.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, -2.0, 2.0).unwrap();
        let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 4.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        let mut s = settings();
        s.set(
            "Model.Reformulation.PartitionQuadraticSums",
            SettingValue::Bool(true),
        )
        .unwrap();
        let (reformulated, map) = reformulate(&p, &s).unwrap();

        let partition_vars = map
            .auxiliaries
            .iter()
            .filter(|a| matches!(a.kind, AuxiliaryKind::PartitionTerm { .. }))
            .count();
        assert_eq!(partition_vars, 2);
        assert_eq!(reformulated.num_variables(), 4);

        // The aggregator w1 + w2 <= 4 is linear; two quadratic parts remain.
        assert_eq!(reformulated.properties.num_linear_constraints, 1);
        assert_eq!(reformulated.properties.num_quadratic_constraints, 2);

        // At a consistent point (1, 1, 1, 1) everything is satisfied.
        for c in reformulated.constraints() {
            assert!(c.is_fulfilled(&[1.0, 1.0, 1.0, 1.0], 1e-9));
        }
    }

    #[test]
    fn test_monomial_problem_keeps_nonlinear_class() {
        let mut p = Problem::new("mono");
        let x = p.add_variable("x", VariableType::Real, 0.5, 2.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, 0.5, 2.0).unwrap();
        let mut c = Constraint::new(0, "m", f64::NEG_INFINITY, 3.0);
        c.monomial_terms.push(MonomialTerm::new(1.0, vec![x, x, y]));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        let (reformulated, _) = reformulate(&p, &settings()).unwrap();
        assert_eq!(reformulated.properties.class, ProblemClass::Nlp);
        assert_eq!(reformulated.properties.num_nonlinear_constraints, 1);
    }
}
