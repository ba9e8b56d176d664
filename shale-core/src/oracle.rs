//! Gradient/Hessian oracle abstraction.
//!
//! The engine only needs values, sparse first and second derivatives, and
//! interval enclosures of the nonlinear expression part. The trait keeps the
//! differentiation backend pluggable; the default backend differentiates the
//! expression tree symbolically and caches the derivative trees, playing the
//! role of an AD tape.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::expression::Expression;
use crate::interval::Interval;

/// Sparse gradient keyed by variable index.
pub type SparseGradient = BTreeMap<usize, f64>;
/// Sparse upper-triangular Hessian keyed by `(i, j)`, `i <= j`.
pub type SparseHessian = BTreeMap<(usize, usize), f64>;

/// Differentiation backend contract.
pub trait GradientOracle: Send + Sync {
    /// Function value at a point.
    fn value(&self, point: &[f64]) -> f64;

    /// Accumulate the sparse gradient at a point. Non-finite entries are
    /// skipped with a debug log, never propagated.
    fn add_gradient(&self, point: &[f64], out: &mut SparseGradient);

    /// Accumulate the sparse upper-triangular Hessian at a point.
    fn add_hessian(&self, point: &[f64], out: &mut SparseHessian);

    /// Interval enclosure over a variable box.
    fn interval(&self, bounds: &[Interval]) -> Interval;
}

/// Symbolic-differentiation oracle over an expression tree.
///
/// First and second derivative trees are built once at construction; the
/// sparsity pattern is the set of variables appearing in the expression.
pub struct SymbolicOracle {
    expression: Arc<Expression>,
    gradients: BTreeMap<usize, Expression>,
    hessians: BTreeMap<(usize, usize), Expression>,
}

impl SymbolicOracle {
    /// Differentiate `expression` once and twice for every referenced
    /// variable (pair), dropping identically-zero entries.
    pub fn new(expression: Arc<Expression>) -> Self {
        let mut vars = BTreeSet::new();
        expression.collect_variables(&mut vars);
        let vars: Vec<usize> = vars.into_iter().collect();

        let mut gradients = BTreeMap::new();
        for &v in &vars {
            let d = expression.differentiate(v);
            if d.as_constant() != Some(0.0) {
                gradients.insert(v, d);
            }
        }

        let mut hessians = BTreeMap::new();
        for (&i, di) in &gradients {
            for &j in &vars {
                if j < i {
                    continue;
                }
                let dij = di.differentiate(j);
                if dij.as_constant() != Some(0.0) {
                    hessians.insert((i, j), dij);
                }
            }
        }

        Self {
            expression,
            gradients,
            hessians,
        }
    }

    /// Variables with a structurally nonzero partial derivative.
    pub fn sparsity(&self) -> Vec<usize> {
        self.gradients.keys().copied().collect()
    }
}

impl GradientOracle for SymbolicOracle {
    fn value(&self, point: &[f64]) -> f64 {
        self.expression.evaluate(point)
    }

    fn add_gradient(&self, point: &[f64], out: &mut SparseGradient) {
        for (&v, d) in &self.gradients {
            let g = d.evaluate(point);
            if g.is_finite() {
                *out.entry(v).or_insert(0.0) += g;
            } else {
                log::debug!("non-finite gradient entry for variable {}, skipped", v);
            }
        }
    }

    fn add_hessian(&self, point: &[f64], out: &mut SparseHessian) {
        for (&key, d) in &self.hessians {
            let h = d.evaluate(point);
            if h.is_finite() {
                if h != 0.0 {
                    *out.entry(key).or_insert(0.0) += h;
                }
            } else {
                log::debug!("non-finite Hessian entry at {:?}, skipped", key);
            }
        }
    }

    fn interval(&self, bounds: &[Interval]) -> Interval {
        self.expression.interval(bounds)
    }
}

impl std::fmt::Debug for SymbolicOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolicOracle")
            .field("expression", &self.expression)
            .field("nonzeros", &self.gradients.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_of_sum_of_squares() {
        // f = x^2 + y^2
        let e = Expression::sum(vec![
            Expression::powi(Expression::variable(0), 2),
            Expression::powi(Expression::variable(1), 2),
        ]);
        let oracle = SymbolicOracle::new(Arc::new(e));

        assert_eq!(oracle.value(&[1.0, 2.0]), 5.0);

        let mut g = SparseGradient::new();
        oracle.add_gradient(&[1.0, 2.0], &mut g);
        assert!((g[&0] - 2.0).abs() < 1e-12);
        assert!((g[&1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_hessian_upper_triangle() {
        // f = x*y (as expression): Hessian entry only at (0, 1).
        let e = Expression::product(vec![
            Expression::variable(0),
            Expression::variable(1),
        ]);
        let oracle = SymbolicOracle::new(Arc::new(e));

        let mut h = SparseHessian::new();
        oracle.add_hessian(&[3.0, 4.0], &mut h);
        assert_eq!(h.len(), 1);
        assert!((h[&(0, 1)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sparsity_skips_absent_variables() {
        let e = Expression::exp(Expression::variable(2));
        let oracle = SymbolicOracle::new(Arc::new(e));
        assert_eq!(oracle.sparsity(), vec![2]);
    }

    #[test]
    fn test_taylor_exactness_for_linear_expression() {
        // For affine f, f(x) + grad.(y - x) == f(y).
        let e = Expression::sum(vec![
            Expression::product(vec![Expression::constant(2.0), Expression::variable(0)]),
            Expression::product(vec![Expression::constant(-3.0), Expression::variable(1)]),
            Expression::constant(1.0),
        ]);
        let oracle = SymbolicOracle::new(Arc::new(e));

        let x = [1.0, 1.0];
        let y = [4.0, -2.0];
        let mut g = SparseGradient::new();
        oracle.add_gradient(&x, &mut g);
        let taylor = oracle.value(&x)
            + g.iter().map(|(&v, &c)| c * (y[v] - x[v])).sum::<f64>();
        assert!((taylor - oracle.value(&y)).abs() < 1e-12);
    }
}
