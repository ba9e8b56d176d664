//! Numeric constraints.
//!
//! A constraint carries left/right bounds, a constant, and term bags of
//! every kind plus an optional nonlinear expression. After standardization
//! the canonical form is `body <= RHS` with `LHS = -inf`; two-sided
//! constraints are split by the reformulator.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::convexity::{Convexity, Monotonicity};
use crate::expression::Expression;
use crate::interval::Interval;
use crate::oracle::{GradientOracle, SymbolicOracle};
use crate::term::{GradientMap, HessianMap, LinearTerm, MonomialTerm, QuadraticTerm, SignomialTerm};

/// Constraint classification by highest-order content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintClass {
    /// Only linear terms.
    Linear,
    /// Linear plus quadratic terms.
    Quadratic,
    /// Contains monomial, signomial or general nonlinear content.
    Nonlinear,
}

/// Derived constraint properties, refreshed by `Problem::finalize`.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintProperties {
    /// Classification by content.
    pub class: ConstraintClass,
    /// Convexity of the body under the current variable bounds.
    pub convexity: Convexity,
    /// Monotonicity of the body under the current variable bounds.
    pub monotonicity: Monotonicity,
    /// True if any linear terms are present.
    pub has_linear_terms: bool,
    /// True if any quadratic terms are present.
    pub has_quadratic_terms: bool,
    /// True if any monomial terms are present.
    pub has_monomial_terms: bool,
    /// True if any signomial terms are present.
    pub has_signomial_terms: bool,
    /// True if a nonlinear expression is attached.
    pub has_nonlinear_expression: bool,
}

impl Default for ConstraintProperties {
    fn default() -> Self {
        Self {
            class: ConstraintClass::Linear,
            convexity: Convexity::Unknown,
            monotonicity: Monotonicity::Unknown,
            has_linear_terms: false,
            has_quadratic_terms: false,
            has_monomial_terms: false,
            has_signomial_terms: false,
            has_nonlinear_expression: false,
        }
    }
}

/// The value of a constraint body at a point, with its normalized deviation.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintValue {
    /// Index of the constraint in its problem.
    pub index: usize,
    /// Body value (terms plus constant).
    pub value: f64,
    /// Positive part of the violation against both bounds.
    pub error: f64,
    /// `(body - RHS) / max(1, |RHS|)`; negative when strictly feasible.
    pub normalized_value: f64,
    /// True if the body lies within `[LHS, RHS]`.
    pub is_fulfilled: bool,
}

/// A numeric constraint.
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Dense index within the owning problem.
    pub index: usize,
    /// Constraint name.
    pub name: String,
    /// Left bound (−inf for canonical inequalities).
    pub lhs: f64,
    /// Right bound.
    pub rhs: f64,
    /// Constant part of the body.
    pub constant: f64,
    /// Linear terms (always allowed).
    pub linear_terms: Vec<LinearTerm>,
    /// Quadratic terms.
    pub quadratic_terms: Vec<QuadraticTerm>,
    /// Monomial terms.
    pub monomial_terms: Vec<MonomialTerm>,
    /// Signomial terms.
    pub signomial_terms: Vec<SignomialTerm>,
    /// Nonlinear expression part.
    pub expression: Option<Arc<Expression>>,
    /// Derived properties.
    pub properties: ConstraintProperties,
    /// Differentiation oracle for the expression part, built at finalize.
    pub(crate) ad: Option<Arc<SymbolicOracle>>,
}

impl Constraint {
    /// Create an empty constraint `lhs <= 0 <= rhs`.
    pub fn new(index: usize, name: impl Into<String>, lhs: f64, rhs: f64) -> Self {
        // Inverted bounds are swapped on construction.
        let (lhs, rhs) = if lhs > rhs { (rhs, lhs) } else { (lhs, rhs) };
        Self {
            index,
            name: name.into(),
            lhs,
            rhs,
            constant: 0.0,
            linear_terms: Vec::new(),
            quadratic_terms: Vec::new(),
            monomial_terms: Vec::new(),
            signomial_terms: Vec::new(),
            expression: None,
            properties: ConstraintProperties::default(),
            ad: None,
        }
    }

    /// True when both bounds coincide.
    pub fn is_equality(&self) -> bool {
        self.lhs == self.rhs && self.lhs.is_finite()
    }

    /// True once standardized to `body <= RHS`.
    pub fn is_canonical(&self) -> bool {
        self.lhs == f64::NEG_INFINITY
    }

    /// Refresh the derived-property block (classification, flags,
    /// convexity/monotonicity under the given bounds).
    pub fn update_properties(&mut self, bounds: &[Interval]) {
        let is_equality = self.is_equality();
        let p = &mut self.properties;
        p.has_linear_terms = !self.linear_terms.is_empty();
        p.has_quadratic_terms = !self.quadratic_terms.is_empty();
        p.has_monomial_terms = !self.monomial_terms.is_empty();
        p.has_signomial_terms = !self.signomial_terms.is_empty();
        p.has_nonlinear_expression = self.expression.is_some();

        p.class = if p.has_monomial_terms || p.has_signomial_terms || p.has_nonlinear_expression {
            ConstraintClass::Nonlinear
        } else if p.has_quadratic_terms {
            ConstraintClass::Quadratic
        } else {
            ConstraintClass::Linear
        };

        let mut convexity = Convexity::Linear;
        let mut monotonicity = Monotonicity::Constant;
        for t in &self.quadratic_terms {
            convexity = convexity.combine(t.convexity());
            monotonicity = monotonicity.combine(t.monotonicity());
        }
        for t in &self.monomial_terms {
            convexity = convexity.combine(t.convexity());
            monotonicity = monotonicity.combine(t.monotonicity());
        }
        for t in &self.signomial_terms {
            convexity = convexity.combine(t.convexity());
            monotonicity = monotonicity.combine(t.monotonicity());
        }
        for t in &self.linear_terms {
            monotonicity = monotonicity.combine(t.monotonicity());
        }
        if let Some(e) = &self.expression {
            convexity = convexity.combine(e.convexity(bounds));
            monotonicity = monotonicity.combine(e.monotonicity(bounds));
        }
        // Equalities with nonlinear content cannot be convex regions.
        if is_equality && p.class != ConstraintClass::Linear {
            convexity = Convexity::Nonconvex;
        }
        p.convexity = convexity;
        p.monotonicity = monotonicity;
    }

    /// Body value (all terms plus constant) at a point.
    pub fn body_value(&self, point: &[f64]) -> f64 {
        let mut v = self.constant;
        for t in &self.linear_terms {
            v += t.value(point);
        }
        for t in &self.quadratic_terms {
            v += t.value(point);
        }
        for t in &self.monomial_terms {
            v += t.value(point);
        }
        for t in &self.signomial_terms {
            v += t.value(point);
        }
        if let Some(e) = &self.expression {
            v += e.evaluate(point);
        }
        v
    }

    /// Numeric value with normalized deviation at a point.
    pub fn calculate(&self, point: &[f64]) -> ConstraintValue {
        let body = self.body_value(point);
        let over = if self.rhs.is_finite() {
            body - self.rhs
        } else {
            f64::NEG_INFINITY
        };
        let under = if self.lhs.is_finite() {
            self.lhs - body
        } else {
            f64::NEG_INFINITY
        };
        let error = over.max(under).max(0.0);
        let normalized = if self.rhs.is_finite() {
            (body - self.rhs) / self.rhs.abs().max(1.0)
        } else {
            (self.lhs - body) / self.lhs.abs().max(1.0)
        };
        ConstraintValue {
            index: self.index,
            value: body,
            error,
            normalized_value: normalized,
            is_fulfilled: error == 0.0,
        }
    }

    /// True if the body lies within the bounds up to `tolerance`.
    pub fn is_fulfilled(&self, point: &[f64], tolerance: f64) -> bool {
        self.calculate(point).error <= tolerance
    }

    /// Sparse gradient of the body at a point, keyed by variable index.
    pub fn gradient(&self, point: &[f64]) -> GradientMap {
        let mut g = GradientMap::new();
        for t in &self.linear_terms {
            t.add_gradient(&mut g);
        }
        for t in &self.quadratic_terms {
            t.add_gradient(point, &mut g);
        }
        for t in &self.monomial_terms {
            t.add_gradient(point, &mut g);
        }
        for t in &self.signomial_terms {
            t.add_gradient(point, &mut g);
        }
        if let Some(ad) = &self.ad {
            ad.add_gradient(point, &mut g);
        } else if let Some(e) = &self.expression {
            // No oracle yet (problem not finalized): differentiate directly.
            let mut vars = BTreeSet::new();
            e.collect_variables(&mut vars);
            for v in vars {
                let d = e.differentiate(v).evaluate(point);
                if d.is_finite() {
                    *g.entry(v).or_insert(0.0) += d;
                }
            }
        }
        g
    }

    /// Sparse upper-triangular Hessian of the body at a point.
    pub fn hessian(&self, point: &[f64]) -> HessianMap {
        let mut h = HessianMap::new();
        for t in &self.quadratic_terms {
            t.add_hessian(&mut h);
        }
        for t in &self.monomial_terms {
            t.add_hessian(point, &mut h);
        }
        for t in &self.signomial_terms {
            t.add_hessian(point, &mut h);
        }
        if let Some(ad) = &self.ad {
            ad.add_hessian(point, &mut h);
        }
        h
    }

    /// Interval bounds of the body over a variable box.
    pub fn body_interval(&self, bounds: &[Interval]) -> Interval {
        let mut v = Interval::singleton(self.constant);
        for t in &self.linear_terms {
            v = v + t.interval(bounds);
        }
        for t in &self.quadratic_terms {
            v = v + t.interval(bounds);
        }
        for t in &self.monomial_terms {
            v = v + t.interval(bounds);
        }
        for t in &self.signomial_terms {
            v = v + t.interval(bounds);
        }
        if let Some(e) = &self.expression {
            v = v + e.interval(bounds);
        }
        v
    }

    /// First-order linearization of `body - RHS <= 0` at a point:
    /// returns `(coefficients, rhs)` for the supporting hyperplane
    /// `grad * x <= grad * p - (body(p) - RHS)`.
    ///
    /// Returns None when the gradient contains non-finite entries.
    pub fn linearization_at(&self, point: &[f64]) -> Option<(GradientMap, f64)> {
        let body = self.body_value(point);
        if !body.is_finite() {
            log::debug!("constraint {}: non-finite body value, skipping cut", self.name);
            return None;
        }
        let gradient = self.gradient(point);
        if gradient.values().any(|v| !v.is_finite()) {
            log::debug!("constraint {}: non-finite gradient, skipping cut", self.name);
            return None;
        }
        let grad_dot_p: f64 = gradient.iter().map(|(&v, &c)| c * point[v]).sum();
        let rhs = grad_dot_p - (body - self.rhs);
        if !rhs.is_finite() {
            return None;
        }
        Some((gradient, rhs))
    }

    /// All variable indices referenced by this constraint.
    pub fn variables(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for t in &self.linear_terms {
            out.insert(t.variable);
        }
        for t in &self.quadratic_terms {
            out.insert(t.first);
            out.insert(t.second);
        }
        for t in &self.monomial_terms {
            out.extend(t.variables.iter().copied());
        }
        for t in &self.signomial_terms {
            out.extend(t.elements.iter().map(|e| e.variable));
        }
        if let Some(e) = &self.expression {
            e.collect_variables(&mut out);
        }
        out
    }

    /// Build the differentiation oracle for the expression part.
    pub(crate) fn build_oracle(&mut self) {
        if let Some(e) = &self.expression {
            self.ad = Some(Arc::new(SymbolicOracle::new(e.clone())));
        }
    }
}

/// Sort constraint values by descending normalized deviation.
pub fn sort_by_deviation(values: &mut [ConstraintValue]) {
    values.sort_by(|a, b| {
        b.normalized_value
            .partial_cmp(&a.normalized_value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_constraint() -> Constraint {
        // x^2 + y^2 <= 1
        let mut c = Constraint::new(0, "circle", f64::NEG_INFINITY, 1.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, 0, 0));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, 1, 1));
        c
    }

    #[test]
    fn test_inverted_bounds_swapped() {
        let c = Constraint::new(0, "c", 5.0, 2.0);
        assert_eq!(c.lhs, 2.0);
        assert_eq!(c.rhs, 5.0);
    }

    #[test]
    fn test_calculate_and_normalized_deviation() {
        let c = circle_constraint();

        let v = c.calculate(&[1.0, 1.0]);
        assert_eq!(v.value, 2.0);
        assert!((v.error - 1.0).abs() < 1e-12);
        assert!((v.normalized_value - 1.0).abs() < 1e-12);
        assert!(!v.is_fulfilled);

        let v = c.calculate(&[0.5, 0.5]);
        assert!(v.is_fulfilled);
        assert!(v.normalized_value < 0.0);
    }

    #[test]
    fn test_gradient() {
        let c = circle_constraint();
        let g = c.gradient(&[0.5, -1.0]);
        assert!((g[&0] - 1.0).abs() < 1e-12);
        assert!((g[&1] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_linearization_is_first_order_exact_for_linear() {
        // 2x + 3y <= 6
        let mut c = Constraint::new(0, "lin", f64::NEG_INFINITY, 6.0);
        c.linear_terms.push(LinearTerm::new(2.0, 0));
        c.linear_terms.push(LinearTerm::new(3.0, 1));

        let p = [1.0, 1.0];
        let (coefs, rhs) = c.linearization_at(&p).unwrap();

        // For linear constraints the cut reproduces the constraint itself.
        for y in [[0.0, 0.0], [2.0, -1.0], [5.0, 5.0]] {
            let lhs: f64 = coefs.iter().map(|(&v, &cf)| cf * y[v]).sum();
            let body = c.body_value(&y);
            assert!((lhs - rhs - (body - c.rhs)).abs() < 1e-10);
        }
    }

    #[test]
    fn test_hyperplane_valid_for_feasible_points() {
        let c = circle_constraint();
        // Linearize at an exterior point.
        let (coefs, rhs) = c.linearization_at(&[2.0, 2.0]).unwrap();

        // Every feasible point must satisfy the cut.
        for y in [[0.0, 0.0], [1.0, 0.0], [0.6, 0.6], [-0.7, 0.7]] {
            if c.is_fulfilled(&y, 1e-9) {
                let lhs: f64 = coefs.iter().map(|(&v, &cf)| cf * y[v]).sum();
                assert!(lhs <= rhs + 1e-6);
            }
        }
    }

    #[test]
    fn test_classification() {
        let mut c = circle_constraint();
        c.update_properties(&[Interval::whole(), Interval::whole()]);
        assert_eq!(c.properties.class, ConstraintClass::Quadratic);
        assert_eq!(c.properties.convexity, Convexity::Convex);

        let mut c = Constraint::new(1, "exp", f64::NEG_INFINITY, 0.0);
        c.expression = Some(Arc::new(Expression::exp(Expression::variable(0))));
        c.update_properties(&[Interval::whole()]);
        assert_eq!(c.properties.class, ConstraintClass::Nonlinear);
        assert_eq!(c.properties.convexity, Convexity::Convex);
    }

    #[test]
    fn test_interval_body() {
        let c = circle_constraint();
        let b = c.body_interval(&[Interval::new(-1.0, 1.0), Interval::new(-1.0, 1.0)]);
        assert_eq!(b.lo, 0.0);
        assert_eq!(b.hi, 2.0);
    }
}
