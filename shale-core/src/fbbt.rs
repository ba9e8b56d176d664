//! Feasibility-based bound tightening.
//!
//! For each constraint, the interval of all terms except one is subtracted
//! from the constraint's `[LHS, RHS]` window, and the remaining term's
//! structure is inverted onto its variables:
//!
//! - linear: divide the target by the coefficient
//! - diagonal quadratic: nonnegative square root of the nonnegative part
//! - bilinear quadratic: divide by the partner's interval when it excludes 0
//! - monomial: divide by the product-interval of the remaining variables
//! - signomial element: invert `x^p` with sign and integrality care
//! - nonlinear expression: pushdown via `Expression::tighten_bounds`
//!
//! A bound update is accepted only if it strictly improves the current bound
//! by more than `min_improvement`, with integer bounds rounding inward. The
//! pass iterates to a fixpoint or a configured cap; a pass changing nothing
//! terminates the loop.

use crate::constraint::Constraint;
use crate::interval::Interval;
use crate::problem::Problem;

/// FBBT configuration.
#[derive(Debug, Clone)]
pub struct FbbtSettings {
    /// Maximum number of passes over all constraints.
    pub max_iterations: usize,
    /// Whether nonlinear expressions participate in tightening.
    pub use_nonlinear: bool,
    /// Minimum strict improvement for a bound update to be accepted.
    pub min_improvement: f64,
}

impl Default for FbbtSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            use_nonlinear: true,
            min_improvement: 1e-10,
        }
    }
}

/// Outcome of a tightening run.
#[derive(Debug, Clone, Default)]
pub struct FbbtReport {
    /// Number of accepted bound updates.
    pub bounds_tightened: usize,
    /// Number of full passes performed.
    pub passes: usize,
    /// True if a pass proved the constraint system interval-infeasible.
    pub infeasible: bool,
}

/// Run FBBT to a fixpoint (or the iteration cap) on a finalized problem.
pub fn tighten(problem: &mut Problem, settings: &FbbtSettings) -> FbbtReport {
    let mut report = FbbtReport::default();

    for _pass in 0..settings.max_iterations {
        report.passes += 1;
        let mut changed = false;

        for ci in 0..problem.num_constraints() {
            let bounds = problem.variable_bounds();
            let constraint = problem.constraint(ci).clone();

            // Interval infeasibility check: the body's enclosure must
            // intersect the constraint window.
            let body = constraint.body_interval(&bounds);
            if body.lo > constraint.rhs + 1e-9 || body.hi < constraint.lhs - 1e-9 {
                report.infeasible = true;
                log::debug!(
                    "constraint {} interval {} outside [{}, {}]",
                    constraint.name,
                    body,
                    constraint.lhs,
                    constraint.rhs
                );
                return report;
            }

            changed |= tighten_constraint(problem, &constraint, &bounds, settings, &mut report);
        }

        if !changed {
            break;
        }
    }

    report
}

/// One tightening sweep over a single constraint. Returns true if any
/// variable bound changed.
fn tighten_constraint(
    problem: &mut Problem,
    constraint: &Constraint,
    bounds: &[Interval],
    settings: &FbbtSettings,
    report: &mut FbbtReport,
) -> bool {
    let window = Interval::new(constraint.lhs, constraint.rhs);
    let mut changed = false;

    // Shared residual: window minus the interval of everything else.
    let residual_for = |skip: TermRef, bounds: &[Interval]| -> Interval {
        let mut others = Interval::singleton(constraint.constant);
        for (k, t) in constraint.linear_terms.iter().enumerate() {
            if skip != TermRef::Linear(k) {
                others = others + t.interval(bounds);
            }
        }
        for (k, t) in constraint.quadratic_terms.iter().enumerate() {
            if skip != TermRef::Quadratic(k) {
                others = others + t.interval(bounds);
            }
        }
        for (k, t) in constraint.monomial_terms.iter().enumerate() {
            if skip != TermRef::Monomial(k) {
                others = others + t.interval(bounds);
            }
        }
        for (k, t) in constraint.signomial_terms.iter().enumerate() {
            if skip != TermRef::Signomial(k) {
                others = others + t.interval(bounds);
            }
        }
        if skip != TermRef::Expression {
            if let Some(e) = &constraint.expression {
                others = others + e.interval(bounds);
            }
        }
        window - others
    };

    // Linear terms: target / coefficient.
    for (k, t) in constraint.linear_terms.iter().enumerate() {
        if t.coefficient == 0.0 {
            continue;
        }
        let target = residual_for(TermRef::Linear(k), bounds) * (1.0 / t.coefficient);
        changed |= apply(problem, t.variable, target, settings, report);
    }

    // Quadratic terms.
    for (k, t) in constraint.quadratic_terms.iter().enumerate() {
        if t.coefficient == 0.0 {
            continue;
        }
        let target = residual_for(TermRef::Quadratic(k), bounds) * (1.0 / t.coefficient);
        if t.is_square() {
            // x^2 in target: |x| <= sqrt(max(target, 0)).
            let hi = target.hi;
            if hi >= 0.0 {
                let r = hi.sqrt();
                changed |= apply(
                    problem,
                    t.first,
                    Interval::new(-r, r),
                    settings,
                    report,
                );
            }
        } else {
            // x*y in target: divide by the partner when it excludes zero.
            for (var, partner) in [(t.first, t.second), (t.second, t.first)] {
                let pb = bounds[partner];
                if pb.straddles_zero() {
                    continue;
                }
                changed |= apply(problem, var, target / pb, settings, report);
            }
        }
    }

    // Monomial terms: divide by the product of the remaining variables.
    for (k, t) in constraint.monomial_terms.iter().enumerate() {
        if t.coefficient == 0.0 {
            continue;
        }
        let target = residual_for(TermRef::Monomial(k), bounds) * (1.0 / t.coefficient);
        for (pos, &var) in t.variables.iter().enumerate() {
            let mut rest = Interval::singleton(1.0);
            for (l, &other) in t.variables.iter().enumerate() {
                if l != pos {
                    rest = rest * bounds[other];
                }
            }
            if rest.straddles_zero() {
                continue;
            }
            changed |= apply(problem, var, target / rest, settings, report);
        }
    }

    // Signomial elements: invert x^p.
    for (k, t) in constraint.signomial_terms.iter().enumerate() {
        if t.coefficient == 0.0 {
            continue;
        }
        let target = residual_for(TermRef::Signomial(k), bounds) * (1.0 / t.coefficient);
        for (pos, e) in t.elements.iter().enumerate() {
            let mut rest = Interval::singleton(1.0);
            for (l, other) in t.elements.iter().enumerate() {
                if l != pos {
                    rest = rest * other.interval(bounds);
                }
            }
            if rest.straddles_zero() {
                continue;
            }
            let image = target / rest;
            if let Some(inverted) = invert_power(image, e.exponent) {
                changed |= apply(problem, e.variable, inverted, settings, report);
            }
        }
    }

    // Nonlinear expression: pushdown traversal.
    if settings.use_nonlinear {
        if let Some(e) = &constraint.expression {
            let target = residual_for(TermRef::Expression, bounds);
            let mut working = bounds.to_vec();
            if e.tighten_bounds(target, &mut working, settings.min_improvement) {
                for (i, (old, new)) in bounds.iter().zip(working.iter()).enumerate() {
                    if new.lo > old.lo + settings.min_improvement
                        || new.hi < old.hi - settings.min_improvement
                    {
                        changed |= apply(problem, i, *new, settings, report);
                    }
                }
            }
        }
    }

    changed
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum TermRef {
    Linear(usize),
    Quadratic(usize),
    Monomial(usize),
    Signomial(usize),
    Expression,
}

/// Invert `x^p` over a target interval for the image of x.
///
/// Even exponents force a nonnegative image and yield a symmetric result;
/// fractional exponents require a positive base; negative exponents exclude
/// zero from the base.
fn invert_power(image: Interval, p: f64) -> Option<Interval> {
    if p == 0.0 {
        return None;
    }
    let is_integer = p.fract() == 0.0;
    let even = is_integer && (p as i64) % 2 == 0;

    if even {
        let hi = image.hi;
        if hi < 0.0 {
            return None;
        }
        let r = hi.powf(1.0 / p);
        if !r.is_finite() {
            return None;
        }
        return Some(Interval::new(-r, r));
    }
    if !is_integer || p < 0.0 {
        // Positive base required.
        let dom = image.intersect(&Interval::new(0.0, f64::INFINITY));
        if dom.is_empty() {
            return None;
        }
        return Some(dom.powf(1.0 / p));
    }
    // Odd positive integer exponent: monotone over the line.
    let root = |v: f64| {
        if v >= 0.0 {
            v.powf(1.0 / p)
        } else {
            -(-v).powf(1.0 / p)
        }
    };
    Some(Interval::new(root(image.lo), root(image.hi)))
}

/// Intersect a variable's bounds with `target`, honoring the improvement
/// threshold and integrality rounding. Returns true on change.
fn apply(
    problem: &mut Problem,
    variable: usize,
    target: Interval,
    settings: &FbbtSettings,
    report: &mut FbbtReport,
) -> bool {
    if target.is_empty() {
        return false;
    }
    let v = problem.variable_mut(variable);
    let mut changed = false;
    if v.tighten_lower(target.lo, settings.min_improvement) {
        report.bounds_tightened += 1;
        changed = true;
    }
    if v.tighten_upper(target.hi, settings.min_improvement) {
        report.bounds_tightened += 1;
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{Objective, ObjectiveSense};
    use crate::term::{LinearTerm, QuadraticTerm, SignomialElement, SignomialTerm};
    use crate::variable::VariableType;
    use std::sync::Arc;

    #[test]
    fn test_linear_tightening() {
        // x + y <= 3, y >= 1  =>  x <= 2.
        let mut p = Problem::new("lin");
        let x = p.add_variable("x", VariableType::Real, 0.0, 100.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, 1.0, 100.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 3.0);
        c.linear_terms.push(LinearTerm::new(1.0, x));
        c.linear_terms.push(LinearTerm::new(1.0, y));
        p.add_constraint(c).unwrap();
        p.set_objective(Objective::new(ObjectiveSense::Minimize));
        p.finalize().unwrap();

        let report = tighten(&mut p, &FbbtSettings::default());
        assert!(report.bounds_tightened >= 2);
        assert!((p.variable(x).upper_bound - 2.0).abs() < 1e-9);
        assert!((p.variable(y).upper_bound - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_square_tightening() {
        // x^2 <= 4  =>  x in [-2, 2].
        let mut p = Problem::new("sq");
        let x = p.add_variable("x", VariableType::Real, -100.0, 100.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 4.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        tighten(&mut p, &FbbtSettings::default());
        assert!((p.variable(x).lower_bound + 2.0).abs() < 1e-9);
        assert!((p.variable(x).upper_bound - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_integer_rounding_inward() {
        // 2n <= 7  =>  n <= 3 after rounding.
        let mut p = Problem::new("int");
        let n = p.add_variable("n", VariableType::Integer, 0.0, 100.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 7.0);
        c.linear_terms.push(LinearTerm::new(2.0, n));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        tighten(&mut p, &FbbtSettings::default());
        assert_eq!(p.variable(n).upper_bound, 3.0);
    }

    #[test]
    fn test_signomial_tightening() {
        // x^3 <= 8 on x >= 0  =>  x <= 2.
        let mut p = Problem::new("sig");
        let x = p.add_variable("x", VariableType::Real, 0.0, 100.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 8.0);
        c.signomial_terms
            .push(SignomialTerm::new(1.0, vec![SignomialElement::new(x, 3.0)]));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        tighten(&mut p, &FbbtSettings::default());
        assert!((p.variable(x).upper_bound - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_expression_tightening() {
        // exp(x) <= 1  =>  x <= 0.
        let mut p = Problem::new("expr");
        let x = p.add_variable("x", VariableType::Real, -10.0, 10.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 1.0);
        c.expression = Some(Arc::new(crate::expression::Expression::exp(
            crate::expression::Expression::variable(x),
        )));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        tighten(&mut p, &FbbtSettings::default());
        assert!(p.variable(x).upper_bound.abs() < 1e-6);
        assert_eq!(p.variable(x).lower_bound, -10.0);
    }

    #[test]
    fn test_fixpoint_idempotence() {
        // Running FBBT twice: the second run changes nothing.
        let mut p = Problem::new("fix");
        let x = p.add_variable("x", VariableType::Real, 0.0, 100.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, 1.0, 100.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 3.0);
        c.linear_terms.push(LinearTerm::new(1.0, x));
        c.linear_terms.push(LinearTerm::new(1.0, y));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        tighten(&mut p, &FbbtSettings::default());
        let second = tighten(&mut p, &FbbtSettings::default());
        assert_eq!(second.bounds_tightened, 0);
        assert_eq!(second.passes, 1);
    }

    #[test]
    fn test_non_loosening_invariant() {
        // Bounds after FBBT are contained in the bounds before.
        let mut p = Problem::new("mono");
        let x = p.add_variable("x", VariableType::Real, -5.0, 5.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, -5.0, 5.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, 1.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        let before: Vec<_> = p.variable_bounds();
        tighten(&mut p, &FbbtSettings::default());
        let after: Vec<_> = p.variable_bounds();
        for (b, a) in before.iter().zip(after.iter()) {
            assert!(a.lo >= b.lo - 1e-12);
            assert!(a.hi <= b.hi + 1e-12);
        }
    }

    #[test]
    fn test_interval_infeasibility_detected() {
        // x^2 <= -1 is interval-infeasible.
        let mut p = Problem::new("infeas");
        let x = p.add_variable("x", VariableType::Real, -5.0, 5.0).unwrap();
        let mut c = Constraint::new(0, "c", f64::NEG_INFINITY, -1.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        p.add_constraint(c).unwrap();
        p.finalize().unwrap();

        let report = tighten(&mut p, &FbbtSettings::default());
        assert!(report.infeasible);
    }
}
