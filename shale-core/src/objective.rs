//! Objective functions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constraint::ConstraintClass;
use crate::convexity::Convexity;
use crate::expression::Expression;
use crate::interval::Interval;
use crate::oracle::{GradientOracle, SymbolicOracle};
use crate::term::{GradientMap, LinearTerm, MonomialTerm, QuadraticTerm, SignomialTerm};

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveSense {
    /// Minimize the objective.
    Minimize,
    /// Maximize the objective.
    Maximize,
}

impl ObjectiveSense {
    /// The worst possible objective value for this sense.
    pub fn worst(&self) -> f64 {
        match self {
            ObjectiveSense::Minimize => f64::INFINITY,
            ObjectiveSense::Maximize => f64::NEG_INFINITY,
        }
    }

    /// True if `candidate` is a strictly better value than `incumbent`.
    pub fn is_improvement(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ObjectiveSense::Minimize => candidate < incumbent,
            ObjectiveSense::Maximize => candidate > incumbent,
        }
    }
}

/// The objective function: same shape as a constraint body plus a sense.
#[derive(Debug, Clone)]
pub struct Objective {
    /// Optimization direction.
    pub sense: ObjectiveSense,
    /// Constant offset.
    pub constant: f64,
    /// Linear terms.
    pub linear_terms: Vec<LinearTerm>,
    /// Quadratic terms.
    pub quadratic_terms: Vec<QuadraticTerm>,
    /// Monomial terms.
    pub monomial_terms: Vec<MonomialTerm>,
    /// Signomial terms.
    pub signomial_terms: Vec<SignomialTerm>,
    /// Nonlinear expression part.
    pub expression: Option<Arc<Expression>>,
    /// Classification by content.
    pub class: ConstraintClass,
    /// Convexity under the current variable bounds.
    pub convexity: Convexity,
    /// Differentiation oracle for the expression part.
    pub(crate) ad: Option<Arc<SymbolicOracle>>,
}

impl Default for Objective {
    fn default() -> Self {
        Objective::new(ObjectiveSense::Minimize)
    }
}

impl Objective {
    /// A zero objective with the given sense.
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            sense,
            constant: 0.0,
            linear_terms: Vec::new(),
            quadratic_terms: Vec::new(),
            monomial_terms: Vec::new(),
            signomial_terms: Vec::new(),
            expression: None,
            class: ConstraintClass::Linear,
            convexity: Convexity::Linear,
            ad: None,
        }
    }

    /// Objective value at a point.
    pub fn value(&self, point: &[f64]) -> f64 {
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

    /// Sparse gradient at a point.
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
        }
        g
    }

    /// True if the objective contains anything beyond linear terms.
    pub fn is_nonlinear(&self) -> bool {
        self.class != ConstraintClass::Linear
    }

    /// Refresh classification and convexity under the given bounds.
    pub fn update_properties(&mut self, bounds: &[Interval]) {
        self.class = if !self.monomial_terms.is_empty()
            || !self.signomial_terms.is_empty()
            || self.expression.is_some()
        {
            ConstraintClass::Nonlinear
        } else if !self.quadratic_terms.is_empty() {
            ConstraintClass::Quadratic
        } else {
            ConstraintClass::Linear
        };

        let mut convexity = Convexity::Linear;
        for t in &self.quadratic_terms {
            convexity = convexity.combine(t.convexity());
        }
        for t in &self.monomial_terms {
            convexity = convexity.combine(t.convexity());
        }
        for t in &self.signomial_terms {
            convexity = convexity.combine(t.convexity());
        }
        if let Some(e) = &self.expression {
            convexity = convexity.combine(e.convexity(bounds));
        }
        self.convexity = convexity;
    }

    /// Build the differentiation oracle for the expression part.
    pub(crate) fn build_oracle(&mut self) {
        if let Some(e) = &self.expression {
            self.ad = Some(Arc::new(SymbolicOracle::new(e.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sense_improvement() {
        assert!(ObjectiveSense::Minimize.is_improvement(1.0, 2.0));
        assert!(!ObjectiveSense::Minimize.is_improvement(2.0, 1.0));
        assert!(ObjectiveSense::Maximize.is_improvement(2.0, 1.0));
        assert_eq!(ObjectiveSense::Minimize.worst(), f64::INFINITY);
    }

    #[test]
    fn test_value_and_classification() {
        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.quadratic_terms.push(QuadraticTerm::new(1.0, 0, 0));
        obj.quadratic_terms.push(QuadraticTerm::new(1.0, 1, 1));
        obj.update_properties(&[Interval::whole(), Interval::whole()]);

        assert_eq!(obj.class, ConstraintClass::Quadratic);
        assert_eq!(obj.convexity, Convexity::Convex);
        assert!((obj.value(&[1.0, 2.0]) - 5.0).abs() < 1e-12);
    }
}
