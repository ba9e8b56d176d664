//! Polymorphic term variants: linear, quadratic, monomial and signomial.
//!
//! Every term kind offers numeric evaluation, interval bounds, convexity and
//! monotonicity classification, and sparse gradient/Hessian contributions.
//! Gradient maps are keyed by variable index; Hessian maps by ordered pairs
//! `(i, j)` with `i <= j` (upper triangle).

use std::collections::BTreeMap;

use crate::convexity::{Convexity, Monotonicity};
use crate::interval::Interval;

/// Sparse gradient keyed by variable index.
pub type GradientMap = BTreeMap<usize, f64>;
/// Sparse upper-triangular Hessian keyed by `(i, j)` with `i <= j`.
pub type HessianMap = BTreeMap<(usize, usize), f64>;

fn gradient_add(map: &mut GradientMap, var: usize, value: f64) {
    *map.entry(var).or_insert(0.0) += value;
}

fn hessian_add(map: &mut HessianMap, i: usize, j: usize, value: f64) {
    let key = if i <= j { (i, j) } else { (j, i) };
    *map.entry(key).or_insert(0.0) += value;
}

/// A linear term `c * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTerm {
    /// Coefficient (finite).
    pub coefficient: f64,
    /// Variable index.
    pub variable: usize,
}

impl LinearTerm {
    /// Create a linear term.
    pub fn new(coefficient: f64, variable: usize) -> Self {
        Self {
            coefficient,
            variable,
        }
    }

    /// Numeric value at a point.
    pub fn value(&self, point: &[f64]) -> f64 {
        self.coefficient * point[self.variable]
    }

    /// Interval bounds over a variable box.
    pub fn interval(&self, bounds: &[Interval]) -> Interval {
        bounds[self.variable] * self.coefficient
    }

    /// Always `Linear`.
    pub fn convexity(&self) -> Convexity {
        Convexity::Linear
    }

    /// Sign of the coefficient decides monotonicity.
    pub fn monotonicity(&self) -> Monotonicity {
        if self.coefficient > 0.0 {
            Monotonicity::Nondecreasing
        } else if self.coefficient < 0.0 {
            Monotonicity::Nonincreasing
        } else {
            Monotonicity::Constant
        }
    }

    /// Accumulate the gradient contribution.
    pub fn add_gradient(&self, gradient: &mut GradientMap) {
        gradient_add(gradient, self.variable, self.coefficient);
    }
}

/// A quadratic term `c * x_i * x_j` (diagonal when `i == j`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticTerm {
    /// Coefficient (finite).
    pub coefficient: f64,
    /// First variable index.
    pub first: usize,
    /// Second variable index.
    pub second: usize,
}

impl QuadraticTerm {
    /// Create a quadratic term.
    pub fn new(coefficient: f64, first: usize, second: usize) -> Self {
        Self {
            coefficient,
            first,
            second,
        }
    }

    /// True when both variables coincide.
    pub fn is_square(&self) -> bool {
        self.first == self.second
    }

    /// Numeric value at a point.
    pub fn value(&self, point: &[f64]) -> f64 {
        self.coefficient * point[self.first] * point[self.second]
    }

    /// Interval bounds over a variable box.
    pub fn interval(&self, bounds: &[Interval]) -> Interval {
        if self.is_square() {
            bounds[self.first].square() * self.coefficient
        } else {
            (bounds[self.first] * bounds[self.second]) * self.coefficient
        }
    }

    /// Diagonal terms are convex/concave by coefficient sign; off-diagonal
    /// bilinear terms are nonconvex.
    pub fn convexity(&self) -> Convexity {
        if self.is_square() {
            if self.coefficient > 0.0 {
                Convexity::Convex
            } else if self.coefficient < 0.0 {
                Convexity::Concave
            } else {
                Convexity::Linear
            }
        } else {
            Convexity::Nonconvex
        }
    }

    /// Monotonicity over the nonnegative orthant, by coefficient sign.
    pub fn monotonicity(&self) -> Monotonicity {
        if self.coefficient > 0.0 {
            Monotonicity::Nondecreasing
        } else if self.coefficient < 0.0 {
            Monotonicity::Nonincreasing
        } else {
            Monotonicity::Constant
        }
    }

    /// Accumulate the gradient contribution at a point.
    pub fn add_gradient(&self, point: &[f64], gradient: &mut GradientMap) {
        if self.is_square() {
            gradient_add(gradient, self.first, 2.0 * self.coefficient * point[self.first]);
        } else {
            gradient_add(gradient, self.first, self.coefficient * point[self.second]);
            gradient_add(gradient, self.second, self.coefficient * point[self.first]);
        }
    }

    /// Accumulate the (constant) Hessian contribution.
    pub fn add_hessian(&self, hessian: &mut HessianMap) {
        if self.is_square() {
            hessian_add(hessian, self.first, self.first, 2.0 * self.coefficient);
        } else {
            hessian_add(hessian, self.first, self.second, self.coefficient);
        }
    }
}

/// A monomial term `c * x_1 * x_2 * ... * x_k` (variables may repeat).
#[derive(Debug, Clone, PartialEq)]
pub struct MonomialTerm {
    /// Coefficient (finite).
    pub coefficient: f64,
    /// Variable index multiset, product form.
    pub variables: Vec<usize>,
}

impl MonomialTerm {
    /// Create a monomial term.
    pub fn new(coefficient: f64, variables: Vec<usize>) -> Self {
        Self {
            coefficient,
            variables,
        }
    }

    /// Numeric value at a point.
    pub fn value(&self, point: &[f64]) -> f64 {
        self.variables
            .iter()
            .fold(self.coefficient, |acc, &v| acc * point[v])
    }

    /// Interval bounds over a variable box.
    pub fn interval(&self, bounds: &[Interval]) -> Interval {
        self.variables
            .iter()
            .fold(Interval::singleton(self.coefficient), |acc, &v| {
                acc * bounds[v]
            })
    }

    /// General products are not classified.
    pub fn convexity(&self) -> Convexity {
        Convexity::Unknown
    }

    /// General products are not classified.
    pub fn monotonicity(&self) -> Monotonicity {
        Monotonicity::Unknown
    }

    /// Occurrence count of a variable in the product.
    pub fn multiplicity(&self, variable: usize) -> usize {
        self.variables.iter().filter(|&&v| v == variable).count()
    }

    /// Product of all factors except `skip` occurrences of `variable`.
    fn partial_product(&self, point: &[f64], variable: usize, skip: usize) -> f64 {
        let mut skipped = 0;
        let mut value = 1.0;
        for &v in &self.variables {
            if v == variable && skipped < skip {
                skipped += 1;
                continue;
            }
            value *= point[v];
        }
        value
    }

    /// Accumulate the gradient contribution at a point.
    pub fn add_gradient(&self, point: &[f64], gradient: &mut GradientMap) {
        let mut seen: Vec<usize> = Vec::new();
        for &v in &self.variables {
            if seen.contains(&v) {
                continue;
            }
            seen.push(v);
            let m = self.multiplicity(v);
            let d = self.coefficient
                * m as f64
                * point[v].powi(m as i32 - 1)
                * self.partial_product(point, v, m);
            gradient_add(gradient, v, d);
        }
    }

    /// Accumulate the Hessian contribution at a point.
    pub fn add_hessian(&self, point: &[f64], hessian: &mut HessianMap) {
        let mut distinct: Vec<usize> = Vec::new();
        for &v in &self.variables {
            if !distinct.contains(&v) {
                distinct.push(v);
            }
        }
        for (a, &u) in distinct.iter().enumerate() {
            let mu = self.multiplicity(u);
            // Diagonal entry: m(m-1) x^(m-2) times the rest of the product.
            if mu >= 2 {
                let d = self.coefficient
                    * (mu * (mu - 1)) as f64
                    * point[u].powi(mu as i32 - 2)
                    * self.partial_product(point, u, mu);
                hessian_add(hessian, u, u, d);
            }
            for &v in distinct.iter().skip(a + 1) {
                let mv = self.multiplicity(v);
                let mut rest = 1.0;
                for &w in &distinct {
                    if w == u || w == v {
                        continue;
                    }
                    rest *= point[w].powi(self.multiplicity(w) as i32);
                }
                let d = self.coefficient
                    * (mu * mv) as f64
                    * point[u].powi(mu as i32 - 1)
                    * point[v].powi(mv as i32 - 1)
                    * rest;
                hessian_add(hessian, u, v, d);
            }
        }
    }
}

/// One factor `x^p` of a signomial term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignomialElement {
    /// Variable index.
    pub variable: usize,
    /// Real exponent.
    pub exponent: f64,
}

impl SignomialElement {
    /// Create an element.
    pub fn new(variable: usize, exponent: f64) -> Self {
        Self { variable, exponent }
    }

    /// Numeric value at a point.
    pub fn value(&self, point: &[f64]) -> f64 {
        point[self.variable].powf(self.exponent)
    }

    /// Interval image over a variable box. Fractional exponents require a
    /// positive base; even integer exponents force a nonnegative image.
    pub fn interval(&self, bounds: &[Interval]) -> Interval {
        let mut base = bounds[self.variable];
        let is_integer = self.exponent.fract() == 0.0;
        if base.lo <= 0.0 && (!is_integer || self.exponent < 0.0) {
            base.lo = f64::EPSILON;
        }
        base.powf(self.exponent)
    }
}

/// A signomial term `c * x_1^{p_1} * ... * x_k^{p_k}` with real exponents.
#[derive(Debug, Clone, PartialEq)]
pub struct SignomialTerm {
    /// Coefficient (finite).
    pub coefficient: f64,
    /// Elements, one per distinct variable.
    pub elements: Vec<SignomialElement>,
}

impl SignomialTerm {
    /// Create a signomial term.
    pub fn new(coefficient: f64, elements: Vec<SignomialElement>) -> Self {
        Self {
            coefficient,
            elements,
        }
    }

    /// Numeric value at a point.
    pub fn value(&self, point: &[f64]) -> f64 {
        self.elements
            .iter()
            .fold(self.coefficient, |acc, e| acc * e.value(point))
    }

    /// Interval bounds over a variable box.
    pub fn interval(&self, bounds: &[Interval]) -> Interval {
        self.elements
            .iter()
            .fold(Interval::singleton(self.coefficient), |acc, e| {
                acc * e.interval(bounds)
            })
    }

    /// Tabled signomial convexity rule over the positive orthant.
    pub fn convexity(&self) -> Convexity {
        let positive_powers = self.elements.iter().filter(|e| e.exponent > 0.0).count();
        let power_sum: f64 = self.elements.iter().map(|e| e.exponent).sum();

        if self.elements.len() == 1 && power_sum == 1.0 {
            return Convexity::Linear;
        }

        if self.coefficient > 0.0 {
            if positive_powers == 1 && power_sum > 1.0 {
                return Convexity::Convex;
            }
            if self.elements.len() == 1 && power_sum > 0.0 && power_sum < 1.0 {
                return Convexity::Concave;
            }
            if positive_powers == 0 {
                return Convexity::Convex;
            }
            return Convexity::Nonconvex;
        } else if self.coefficient < 0.0 {
            if positive_powers == 1 && power_sum > 1.0 {
                return Convexity::Concave;
            }
            if positive_powers == self.elements.len() && power_sum > 0.0 && power_sum <= 1.0 {
                return Convexity::Convex;
            }
            if positive_powers == 0 {
                return Convexity::Concave;
            }
        }

        Convexity::Nonconvex
    }

    /// Monotonicity over the positive orthant.
    pub fn monotonicity(&self) -> Monotonicity {
        if self.coefficient == 0.0 {
            return Monotonicity::Constant;
        }
        let all_positive = self.elements.iter().all(|e| e.exponent > 0.0);
        let all_negative = self.elements.iter().all(|e| e.exponent < 0.0);
        match (self.coefficient > 0.0, all_positive, all_negative) {
            (true, true, _) => Monotonicity::Nondecreasing,
            (true, _, true) => Monotonicity::Nonincreasing,
            (false, true, _) => Monotonicity::Nonincreasing,
            (false, _, true) => Monotonicity::Nondecreasing,
            _ => Monotonicity::Unknown,
        }
    }

    /// Accumulate the gradient contribution at a point.
    ///
    /// The partial derivative w.r.t. `x_k` is `c * p_k * x_k^{p_k - 1}`
    /// times the remaining factors; each factor is recomputed directly so a
    /// zero base never divides.
    pub fn add_gradient(&self, point: &[f64], gradient: &mut GradientMap) {
        for (k, e) in self.elements.iter().enumerate() {
            let mut d = self.coefficient * e.exponent * point[e.variable].powf(e.exponent - 1.0);
            for (l, other) in self.elements.iter().enumerate() {
                if l != k {
                    d *= other.value(point);
                }
            }
            if d.is_finite() {
                gradient_add(gradient, e.variable, d);
            } else {
                log::debug!(
                    "skipping non-finite signomial gradient entry for variable {}",
                    e.variable
                );
            }
        }
    }

    /// Accumulate the Hessian contribution at a point.
    pub fn add_hessian(&self, point: &[f64], hessian: &mut HessianMap) {
        for (a, ea) in self.elements.iter().enumerate() {
            // Diagonal: c p(p-1) x^{p-2} times the other factors.
            let mut d =
                self.coefficient * ea.exponent * (ea.exponent - 1.0) * point[ea.variable].powf(ea.exponent - 2.0);
            for (l, other) in self.elements.iter().enumerate() {
                if l != a {
                    d *= other.value(point);
                }
            }
            if d.is_finite() && d != 0.0 {
                hessian_add(hessian, ea.variable, ea.variable, d);
            }

            for (b, eb) in self.elements.iter().enumerate().skip(a + 1) {
                let mut d = self.coefficient
                    * ea.exponent
                    * eb.exponent
                    * point[ea.variable].powf(ea.exponent - 1.0)
                    * point[eb.variable].powf(eb.exponent - 1.0);
                for (l, other) in self.elements.iter().enumerate() {
                    if l != a && l != b {
                        d *= other.value(point);
                    }
                }
                if d.is_finite() && d != 0.0 {
                    hessian_add(hessian, ea.variable, eb.variable, d);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_term() {
        let t = LinearTerm::new(2.0, 0);
        assert_eq!(t.value(&[3.0]), 6.0);
        assert_eq!(t.convexity(), Convexity::Linear);
        assert_eq!(t.monotonicity(), Monotonicity::Nondecreasing);

        let mut g = GradientMap::new();
        t.add_gradient(&mut g);
        assert_eq!(g[&0], 2.0);
    }

    #[test]
    fn test_quadratic_square_term() {
        let t = QuadraticTerm::new(3.0, 1, 1);
        assert!(t.is_square());
        assert_eq!(t.value(&[0.0, 2.0]), 12.0);
        assert_eq!(t.convexity(), Convexity::Convex);

        let mut g = GradientMap::new();
        t.add_gradient(&[0.0, 2.0], &mut g);
        assert_eq!(g[&1], 12.0);

        let mut h = HessianMap::new();
        t.add_hessian(&mut h);
        assert_eq!(h[&(1, 1)], 6.0);
    }

    #[test]
    fn test_quadratic_bilinear_term() {
        let t = QuadraticTerm::new(1.0, 0, 1);
        assert!(!t.is_square());
        assert_eq!(t.convexity(), Convexity::Nonconvex);

        let mut g = GradientMap::new();
        t.add_gradient(&[2.0, 5.0], &mut g);
        assert_eq!(g[&0], 5.0);
        assert_eq!(g[&1], 2.0);

        let mut h = HessianMap::new();
        t.add_hessian(&mut h);
        assert_eq!(h[&(0, 1)], 1.0);
    }

    #[test]
    fn test_monomial_gradient_with_repeated_variable() {
        // 2 * x0^2 * x1; d/dx0 = 4 x0 x1, d/dx1 = 2 x0^2
        let t = MonomialTerm::new(2.0, vec![0, 0, 1]);
        assert_eq!(t.value(&[3.0, 4.0]), 72.0);

        let mut g = GradientMap::new();
        t.add_gradient(&[3.0, 4.0], &mut g);
        assert_eq!(g[&0], 48.0);
        assert_eq!(g[&1], 18.0);
    }

    #[test]
    fn test_monomial_hessian() {
        // x0 * x1: d2/dx0dx1 = 1
        let t = MonomialTerm::new(1.0, vec![0, 1]);
        let mut h = HessianMap::new();
        t.add_hessian(&[2.0, 3.0], &mut h);
        assert_eq!(h[&(0, 1)], 1.0);
        assert!(!h.contains_key(&(0, 0)));
    }

    #[test]
    fn test_signomial_convexity_table() {
        // x^2 with positive coefficient: one positive power, sum > 1.
        let t = SignomialTerm::new(1.0, vec![SignomialElement::new(0, 2.0)]);
        assert_eq!(t.convexity(), Convexity::Convex);

        // sqrt(x) is concave.
        let t = SignomialTerm::new(1.0, vec![SignomialElement::new(0, 0.5)]);
        assert_eq!(t.convexity(), Convexity::Concave);

        // 1/(x y) with positive coefficient: no positive powers.
        let t = SignomialTerm::new(
            1.0,
            vec![SignomialElement::new(0, -1.0), SignomialElement::new(1, -1.0)],
        );
        assert_eq!(t.convexity(), Convexity::Convex);

        // x y is not convex.
        let t = SignomialTerm::new(
            1.0,
            vec![SignomialElement::new(0, 1.0), SignomialElement::new(1, 1.0)],
        );
        assert_eq!(t.convexity(), Convexity::Nonconvex);

        // -sqrt(x): convex.
        let t = SignomialTerm::new(-1.0, vec![SignomialElement::new(0, 0.5)]);
        assert_eq!(t.convexity(), Convexity::Convex);
    }

    #[test]
    fn test_signomial_gradient() {
        // 2 x^3: derivative 6 x^2.
        let t = SignomialTerm::new(2.0, vec![SignomialElement::new(0, 3.0)]);
        let mut g = GradientMap::new();
        t.add_gradient(&[2.0], &mut g);
        assert!((g[&0] - 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_signomial_interval_even_power() {
        let t = SignomialTerm::new(1.0, vec![SignomialElement::new(0, 2.0)]);
        let b = t.interval(&[Interval::new(-2.0, 1.0)]);
        assert!(b.lo >= 0.0);
        assert!((b.hi - 4.0).abs() < 1e-12);
    }
}
