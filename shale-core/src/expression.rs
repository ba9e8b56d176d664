//! Nonlinear expression trees.
//!
//! An [`Expression`] is an immutable recursive tree with one constructor per
//! operator. Nodes are shared via `Arc` and never mutated after
//! construction; reformulation produces copies. Every node supports numeric
//! and interval evaluation, convexity/monotonicity classification under an
//! interval context, symbolic differentiation, and bound pushdown for FBBT.
//!
//! The `build` constructors perform light constant folding so that symbolic
//! derivatives stay compact.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::convexity::{Convexity, Monotonicity};
use crate::interval::Interval;

/// A node in a nonlinear expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A numeric constant.
    Constant(f64),
    /// Reference to a variable by index.
    Variable(usize),
    /// Negation of the child.
    Negate(Arc<Expression>),
    /// Sum of the children.
    Sum(Vec<Arc<Expression>>),
    /// Product of the children.
    Product(Vec<Arc<Expression>>),
    /// Quotient `numerator / denominator`.
    Divide(Arc<Expression>, Arc<Expression>),
    /// Power `base ^ exponent`.
    Power(Arc<Expression>, Arc<Expression>),
    /// Natural exponential.
    Exp(Arc<Expression>),
    /// Natural logarithm.
    Log(Arc<Expression>),
    /// Square root.
    Sqrt(Arc<Expression>),
    /// Absolute value.
    Abs(Arc<Expression>),
    /// Sine.
    Sin(Arc<Expression>),
    /// Cosine.
    Cos(Arc<Expression>),
}

impl Expression {
    // --- constructors with light folding ---

    /// Constant node.
    pub fn constant(v: f64) -> Expression {
        Expression::Constant(v)
    }

    /// Variable-reference node.
    pub fn variable(index: usize) -> Expression {
        Expression::Variable(index)
    }

    /// Negation, folding constants and double negation.
    pub fn negate(e: Expression) -> Expression {
        match e {
            Expression::Constant(c) => Expression::Constant(-c),
            Expression::Negate(inner) => inner.as_ref().clone(),
            other => Expression::Negate(Arc::new(other)),
        }
    }

    /// Sum, folding constants and dropping zeros.
    pub fn sum(children: Vec<Expression>) -> Expression {
        let mut constant = 0.0;
        let mut rest: Vec<Arc<Expression>> = Vec::new();
        for c in children {
            match c {
                Expression::Constant(v) => constant += v,
                Expression::Sum(inner) => rest.extend(inner),
                other => rest.push(Arc::new(other)),
            }
        }
        if constant != 0.0 {
            rest.push(Arc::new(Expression::Constant(constant)));
        }
        match rest.len() {
            0 => Expression::Constant(0.0),
            1 => rest.into_iter().next().map(|a| a.as_ref().clone()).unwrap_or(Expression::Constant(0.0)),
            _ => Expression::Sum(rest),
        }
    }

    /// Product, folding constants; a zero factor collapses the node.
    pub fn product(children: Vec<Expression>) -> Expression {
        let mut constant = 1.0;
        let mut rest: Vec<Arc<Expression>> = Vec::new();
        for c in children {
            match c {
                Expression::Constant(v) => constant *= v,
                Expression::Product(inner) => rest.extend(inner),
                other => rest.push(Arc::new(other)),
            }
        }
        if constant == 0.0 {
            return Expression::Constant(0.0);
        }
        if constant != 1.0 {
            rest.insert(0, Arc::new(Expression::Constant(constant)));
        }
        match rest.len() {
            0 => Expression::Constant(1.0),
            1 => rest.into_iter().next().map(|a| a.as_ref().clone()).unwrap_or(Expression::Constant(1.0)),
            _ => Expression::Product(rest),
        }
    }

    /// Quotient, folding constant denominators into a product.
    pub fn divide(num: Expression, den: Expression) -> Expression {
        match (&num, &den) {
            (_, Expression::Constant(c)) if *c != 0.0 => {
                Expression::product(vec![Expression::Constant(1.0 / c), num])
            }
            (Expression::Constant(c), _) if *c == 0.0 => Expression::Constant(0.0),
            _ => Expression::Divide(Arc::new(num), Arc::new(den)),
        }
    }

    /// Power, folding constant bases/exponents where trivial.
    pub fn power(base: Expression, exponent: Expression) -> Expression {
        match (&base, &exponent) {
            (Expression::Constant(b), Expression::Constant(p)) => Expression::Constant(b.powf(*p)),
            (_, Expression::Constant(p)) if *p == 1.0 => base,
            (_, Expression::Constant(p)) if *p == 0.0 => Expression::Constant(1.0),
            _ => Expression::Power(Arc::new(base), Arc::new(exponent)),
        }
    }

    /// Integer power shorthand.
    pub fn powi(base: Expression, p: i32) -> Expression {
        Expression::power(base, Expression::Constant(p as f64))
    }

    /// Exponential node.
    pub fn exp(e: Expression) -> Expression {
        match e {
            Expression::Constant(c) => Expression::Constant(c.exp()),
            other => Expression::Exp(Arc::new(other)),
        }
    }

    /// Logarithm node.
    pub fn log(e: Expression) -> Expression {
        match e {
            Expression::Constant(c) if c > 0.0 => Expression::Constant(c.ln()),
            other => Expression::Log(Arc::new(other)),
        }
    }

    /// Square-root node.
    pub fn sqrt(e: Expression) -> Expression {
        match e {
            Expression::Constant(c) if c >= 0.0 => Expression::Constant(c.sqrt()),
            other => Expression::Sqrt(Arc::new(other)),
        }
    }

    /// Absolute-value node.
    pub fn abs(e: Expression) -> Expression {
        match e {
            Expression::Constant(c) => Expression::Constant(c.abs()),
            other => Expression::Abs(Arc::new(other)),
        }
    }

    /// Sine node.
    pub fn sin(e: Expression) -> Expression {
        Expression::Sin(Arc::new(e))
    }

    /// Cosine node.
    pub fn cos(e: Expression) -> Expression {
        Expression::Cos(Arc::new(e))
    }

    /// The constant value, if this node is a constant.
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Expression::Constant(c) => Some(*c),
            _ => None,
        }
    }

    // --- evaluation ---

    /// Evaluate at a point. Out-of-domain inputs produce NaN/inf, which the
    /// caller's numerical-error policy absorbs.
    pub fn evaluate(&self, point: &[f64]) -> f64 {
        match self {
            Expression::Constant(c) => *c,
            Expression::Variable(i) => point[*i],
            Expression::Negate(e) => -e.evaluate(point),
            Expression::Sum(cs) => cs.iter().map(|c| c.evaluate(point)).sum(),
            Expression::Product(cs) => cs.iter().map(|c| c.evaluate(point)).product(),
            Expression::Divide(a, b) => a.evaluate(point) / b.evaluate(point),
            Expression::Power(b, p) => b.evaluate(point).powf(p.evaluate(point)),
            Expression::Exp(e) => e.evaluate(point).exp(),
            Expression::Log(e) => e.evaluate(point).ln(),
            Expression::Sqrt(e) => e.evaluate(point).sqrt(),
            Expression::Abs(e) => e.evaluate(point).abs(),
            Expression::Sin(e) => e.evaluate(point).sin(),
            Expression::Cos(e) => e.evaluate(point).cos(),
        }
    }

    /// Interval evaluation over a variable box.
    pub fn interval(&self, bounds: &[Interval]) -> Interval {
        match self {
            Expression::Constant(c) => Interval::singleton(*c),
            Expression::Variable(i) => bounds[*i],
            Expression::Negate(e) => -e.interval(bounds),
            Expression::Sum(cs) => cs
                .iter()
                .fold(Interval::singleton(0.0), |acc, c| acc + c.interval(bounds)),
            Expression::Product(cs) => cs
                .iter()
                .fold(Interval::singleton(1.0), |acc, c| acc * c.interval(bounds)),
            Expression::Divide(a, b) => a.interval(bounds) / b.interval(bounds),
            Expression::Power(b, p) => {
                let base = b.interval(bounds);
                match p.as_constant() {
                    Some(pc) => base.powf(pc),
                    None => {
                        // Variable exponent: reduce through exp(p * ln b).
                        (p.interval(bounds) * base.ln()).exp()
                    }
                }
            }
            Expression::Exp(e) => e.interval(bounds).exp(),
            Expression::Log(e) => e.interval(bounds).ln(),
            Expression::Sqrt(e) => e.interval(bounds).sqrt(),
            Expression::Abs(e) => e.interval(bounds).abs(),
            Expression::Sin(e) => e.interval(bounds).sin(),
            Expression::Cos(e) => e.interval(bounds).cos(),
        }
    }

    /// Collect referenced variable indices.
    pub fn collect_variables(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expression::Constant(_) => {}
            Expression::Variable(i) => {
                out.insert(*i);
            }
            Expression::Negate(e)
            | Expression::Exp(e)
            | Expression::Log(e)
            | Expression::Sqrt(e)
            | Expression::Abs(e)
            | Expression::Sin(e)
            | Expression::Cos(e) => e.collect_variables(out),
            Expression::Sum(cs) | Expression::Product(cs) => {
                for c in cs {
                    c.collect_variables(out);
                }
            }
            Expression::Divide(a, b) | Expression::Power(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }

    // --- classification ---

    /// Convexity under an interval context, by operator-specific
    /// composition rules. Conservative: Unknown when no rule applies.
    pub fn convexity(&self, bounds: &[Interval]) -> Convexity {
        match self {
            Expression::Constant(_) | Expression::Variable(_) => Convexity::Linear,
            Expression::Negate(e) => e.convexity(bounds).negate(),
            Expression::Sum(cs) => cs
                .iter()
                .fold(Convexity::Linear, |acc, c| acc.combine(c.convexity(bounds))),
            Expression::Product(cs) => {
                // Only constant scaling preserves a classification.
                let mut scale = 1.0;
                let mut nonconstant: Option<&Arc<Expression>> = None;
                for c in cs.iter() {
                    match c.as_constant() {
                        Some(v) => scale *= v,
                        None if nonconstant.is_none() => nonconstant = Some(c),
                        None => return Convexity::Unknown,
                    }
                }
                match nonconstant {
                    Some(c) => c.convexity(bounds).scale(scale),
                    None => Convexity::Linear,
                }
            }
            Expression::Divide(a, b) => {
                if let Some(c) = b.as_constant() {
                    if c != 0.0 {
                        return a.convexity(bounds).scale(1.0 / c);
                    }
                    return Convexity::Unknown;
                }
                if let Some(c) = a.as_constant() {
                    // c / g over a sign-fixed denominator range.
                    let gi = b.interval(bounds);
                    let gc = b.convexity(bounds);
                    if c >= 0.0 && gi.lo > 0.0 && gc.is_concave_or_linear() {
                        return Convexity::Convex;
                    }
                    if c >= 0.0 && gi.hi < 0.0 && gc.is_convex_or_linear() {
                        return Convexity::Concave;
                    }
                    if c < 0.0 && gi.lo > 0.0 && gc.is_concave_or_linear() {
                        return Convexity::Concave;
                    }
                    if c < 0.0 && gi.hi < 0.0 && gc.is_convex_or_linear() {
                        return Convexity::Convex;
                    }
                }
                Convexity::Unknown
            }
            Expression::Power(base, exponent) => match (base.as_constant(), exponent.as_constant()) {
                (Some(_), Some(_)) => Convexity::Linear,
                (None, Some(p)) => power_convexity(base, p, bounds),
                (Some(c), None) if c > 0.0 => {
                    // c^g = exp(g ln c): convex iff g.scale(ln c) is convex.
                    let inner = exponent.convexity(bounds).scale(c.ln());
                    if inner.is_convex_or_linear() {
                        Convexity::Convex
                    } else {
                        Convexity::Unknown
                    }
                }
                _ => Convexity::Unknown,
            },
            Expression::Exp(e) => {
                // exp is convex and nondecreasing.
                if e.convexity(bounds).is_convex_or_linear() {
                    Convexity::Convex
                } else {
                    Convexity::Unknown
                }
            }
            Expression::Log(e) => {
                // log is concave and nondecreasing.
                if e.convexity(bounds).is_concave_or_linear() {
                    Convexity::Concave
                } else {
                    Convexity::Unknown
                }
            }
            Expression::Sqrt(e) => {
                if e.convexity(bounds).is_concave_or_linear() {
                    Convexity::Concave
                } else {
                    Convexity::Unknown
                }
            }
            Expression::Abs(e) => match e.convexity(bounds) {
                Convexity::Linear => Convexity::Convex,
                _ => Convexity::Unknown,
            },
            Expression::Sin(_) | Expression::Cos(_) => Convexity::Unknown,
        }
    }

    /// Monotonicity under an interval context.
    pub fn monotonicity(&self, bounds: &[Interval]) -> Monotonicity {
        match self {
            Expression::Constant(_) => Monotonicity::Constant,
            Expression::Variable(_) => Monotonicity::Nondecreasing,
            Expression::Negate(e) => e.monotonicity(bounds).negate(),
            Expression::Sum(cs) => cs.iter().fold(Monotonicity::Constant, |acc, c| {
                acc.combine(c.monotonicity(bounds))
            }),
            Expression::Product(cs) => {
                let mut scale = 1.0;
                let mut nonconstant: Option<&Arc<Expression>> = None;
                for c in cs.iter() {
                    match c.as_constant() {
                        Some(v) => scale *= v,
                        None if nonconstant.is_none() => nonconstant = Some(c),
                        None => return Monotonicity::Unknown,
                    }
                }
                match nonconstant {
                    Some(c) => {
                        let m = c.monotonicity(bounds);
                        if scale >= 0.0 {
                            m
                        } else {
                            m.negate()
                        }
                    }
                    None => Monotonicity::Constant,
                }
            }
            Expression::Divide(a, b) => {
                if b.as_constant().is_some() {
                    // Folded form only appears for unsimplified trees.
                    let c = b.as_constant().unwrap_or(1.0);
                    let m = a.monotonicity(bounds);
                    if c >= 0.0 {
                        m
                    } else {
                        m.negate()
                    }
                } else {
                    Monotonicity::Unknown
                }
            }
            Expression::Power(base, exponent) => match exponent.as_constant() {
                Some(p) if p > 0.0 && base.interval(bounds).lo >= 0.0 => base.monotonicity(bounds),
                Some(p) if p < 0.0 && base.interval(bounds).lo > 0.0 => {
                    base.monotonicity(bounds).negate()
                }
                _ => Monotonicity::Unknown,
            },
            Expression::Exp(e) => e.monotonicity(bounds),
            Expression::Log(e) | Expression::Sqrt(e) => e.monotonicity(bounds),
            Expression::Abs(e) => {
                let i = e.interval(bounds);
                if i.lo >= 0.0 {
                    e.monotonicity(bounds)
                } else if i.hi <= 0.0 {
                    e.monotonicity(bounds).negate()
                } else {
                    Monotonicity::Unknown
                }
            }
            Expression::Sin(_) | Expression::Cos(_) => Monotonicity::Unknown,
        }
    }

    // --- symbolic differentiation ---

    /// Symbolic partial derivative with respect to `var`.
    pub fn differentiate(&self, var: usize) -> Expression {
        match self {
            Expression::Constant(_) => Expression::Constant(0.0),
            Expression::Variable(i) => {
                Expression::Constant(if *i == var { 1.0 } else { 0.0 })
            }
            Expression::Negate(e) => Expression::negate(e.differentiate(var)),
            Expression::Sum(cs) => {
                Expression::sum(cs.iter().map(|c| c.differentiate(var)).collect())
            }
            Expression::Product(cs) => {
                // Product rule: sum over k of child_k' * (others).
                let mut parts = Vec::with_capacity(cs.len());
                for (k, ck) in cs.iter().enumerate() {
                    let d = ck.differentiate(var);
                    if d.as_constant() == Some(0.0) {
                        continue;
                    }
                    let mut factors = vec![d];
                    for (l, cl) in cs.iter().enumerate() {
                        if l != k {
                            factors.push(cl.as_ref().clone());
                        }
                    }
                    parts.push(Expression::product(factors));
                }
                Expression::sum(parts)
            }
            Expression::Divide(a, b) => {
                // (a' b - a b') / b^2
                let da = a.differentiate(var);
                let db = b.differentiate(var);
                let num = Expression::sum(vec![
                    Expression::product(vec![da, b.as_ref().clone()]),
                    Expression::negate(Expression::product(vec![a.as_ref().clone(), db])),
                ]);
                Expression::divide(num, Expression::powi(b.as_ref().clone(), 2))
            }
            Expression::Power(base, exponent) => {
                match (base.as_constant(), exponent.as_constant()) {
                    (_, Some(p)) => {
                        // p * base^(p-1) * base'
                        Expression::product(vec![
                            Expression::Constant(p),
                            Expression::power(base.as_ref().clone(), Expression::Constant(p - 1.0)),
                            base.differentiate(var),
                        ])
                    }
                    (Some(c), None) if c > 0.0 => {
                        // c^e * ln c * e'
                        Expression::product(vec![
                            self.clone(),
                            Expression::Constant(c.ln()),
                            exponent.differentiate(var),
                        ])
                    }
                    _ => {
                        // f^g = exp(g ln f): f^g * (g' ln f + g f' / f)
                        let df = base.differentiate(var);
                        let dg = exponent.differentiate(var);
                        Expression::product(vec![
                            self.clone(),
                            Expression::sum(vec![
                                Expression::product(vec![
                                    dg,
                                    Expression::log(base.as_ref().clone()),
                                ]),
                                Expression::divide(
                                    Expression::product(vec![
                                        exponent.as_ref().clone(),
                                        df,
                                    ]),
                                    base.as_ref().clone(),
                                ),
                            ]),
                        ])
                    }
                }
            }
            Expression::Exp(e) => {
                Expression::product(vec![self.clone(), e.differentiate(var)])
            }
            Expression::Log(e) => {
                Expression::divide(e.differentiate(var), e.as_ref().clone())
            }
            Expression::Sqrt(e) => Expression::divide(
                e.differentiate(var),
                Expression::product(vec![Expression::Constant(2.0), self.clone()]),
            ),
            Expression::Abs(e) => {
                // sign(e) * e', written as e / |e| * e'.
                Expression::product(vec![
                    Expression::divide(e.as_ref().clone(), self.clone()),
                    e.differentiate(var),
                ])
            }
            Expression::Sin(e) => Expression::product(vec![
                Expression::cos(e.as_ref().clone()),
                e.differentiate(var),
            ]),
            Expression::Cos(e) => Expression::negate(Expression::product(vec![
                Expression::sin(e.as_ref().clone()),
                e.differentiate(var),
            ])),
        }
    }

    // --- bound pushdown (FBBT) ---

    /// Push a target interval down the tree, intersecting variable bounds.
    ///
    /// Returns true if any entry of `bounds` was narrowed by more than
    /// `min_improvement`. The traversal is conservative: operators without a
    /// usable inverse are skipped.
    pub fn tighten_bounds(
        &self,
        target: Interval,
        bounds: &mut [Interval],
        min_improvement: f64,
    ) -> bool {
        if target.is_empty() || !(target.lo.is_finite() || target.hi.is_finite()) {
            return false;
        }
        match self {
            Expression::Constant(_) => false,
            Expression::Variable(i) => {
                let old = bounds[*i];
                let new = old.intersect(&target);
                if new.is_empty() {
                    return false;
                }
                let improved = new.lo > old.lo + min_improvement || new.hi < old.hi - min_improvement;
                if improved {
                    bounds[*i] = new;
                }
                improved
            }
            Expression::Negate(e) => e.tighten_bounds(-target, bounds, min_improvement),
            Expression::Sum(cs) => {
                let mut changed = false;
                let child_intervals: Vec<Interval> =
                    cs.iter().map(|c| c.interval(bounds)).collect();
                let total = child_intervals
                    .iter()
                    .fold(Interval::singleton(0.0), |acc, i| acc + *i);
                for (k, c) in cs.iter().enumerate() {
                    let others = total - child_intervals[k];
                    changed |= c.tighten_bounds(target - others, bounds, min_improvement);
                }
                changed
            }
            Expression::Product(cs) => {
                let mut changed = false;
                let child_intervals: Vec<Interval> =
                    cs.iter().map(|c| c.interval(bounds)).collect();
                for (k, c) in cs.iter().enumerate() {
                    let mut others = Interval::singleton(1.0);
                    for (l, i) in child_intervals.iter().enumerate() {
                        if l != k {
                            others = others * *i;
                        }
                    }
                    if others.straddles_zero() {
                        continue;
                    }
                    changed |= c.tighten_bounds(target / others, bounds, min_improvement);
                }
                changed
            }
            Expression::Divide(a, b) => {
                let ia = a.interval(bounds);
                let ib = b.interval(bounds);
                let mut changed = a.tighten_bounds(target * ib, bounds, min_improvement);
                if !target.straddles_zero() {
                    changed |= b.tighten_bounds(ia / target, bounds, min_improvement);
                }
                changed
            }
            Expression::Power(base, exponent) => {
                let Some(p) = exponent.as_constant() else {
                    return false;
                };
                if p == 0.0 {
                    return false;
                }
                let is_integer = p.fract() == 0.0;
                let even = is_integer && (p as i64) % 2 == 0;
                let inverted = if even {
                    // base^p in target with even p bounds |base|.
                    let hi = target.hi.max(0.0).powf(1.0 / p);
                    Interval::new(-hi, hi)
                } else if is_integer {
                    // Odd powers are monotone.
                    let lo = signed_root(target.lo, p);
                    let hi = signed_root(target.hi, p);
                    if p > 0.0 {
                        Interval::new(lo, hi)
                    } else {
                        Interval::new(hi, lo)
                    }
                } else {
                    // Fractional exponents require a positive base.
                    target
                        .intersect(&Interval::new(0.0, f64::INFINITY))
                        .powf(1.0 / p)
                };
                if inverted.is_empty() {
                    return false;
                }
                base.tighten_bounds(inverted, bounds, min_improvement)
            }
            Expression::Exp(e) => {
                let dom = target.intersect(&Interval::new(0.0, f64::INFINITY));
                e.tighten_bounds(dom.ln(), bounds, min_improvement)
            }
            Expression::Log(e) => e.tighten_bounds(target.exp(), bounds, min_improvement),
            Expression::Sqrt(e) => {
                let dom = target.intersect(&Interval::new(0.0, f64::INFINITY));
                e.tighten_bounds(dom.square(), bounds, min_improvement)
            }
            Expression::Abs(e) => {
                if target.hi < 0.0 {
                    return false;
                }
                let r = target.hi;
                e.tighten_bounds(Interval::new(-r, r), bounds, min_improvement)
            }
            Expression::Sin(_) | Expression::Cos(_) => false,
        }
    }
}

/// Convexity of `base^p` for a constant exponent, dispatching on the
/// exponent class and the sign of the base range.
fn power_convexity(base: &Expression, p: f64, bounds: &[Interval]) -> Convexity {
    let bc = base.convexity(bounds);
    let bi = base.interval(bounds);
    let is_integer = p.fract() == 0.0;
    let even = is_integer && (p as i64) % 2 == 0;

    if even && p > 0.0 && bc == Convexity::Linear {
        // Affine^even is convex on the whole line.
        return Convexity::Convex;
    }
    if p >= 1.0 && bi.lo >= 0.0 && bc.is_convex_or_linear() {
        return Convexity::Convex;
    }
    if p > 0.0 && p < 1.0 && bi.lo >= 0.0 && bc.is_concave_or_linear() {
        return Convexity::Concave;
    }
    if p < 0.0 && bi.lo > 0.0 && bc.is_concave_or_linear() {
        return Convexity::Convex;
    }
    if p < 0.0 && bi.hi < 0.0 && even && bc.is_convex_or_linear() {
        return Convexity::Convex;
    }
    Convexity::Unknown
}

/// Real p-th root preserving sign for odd integer exponents.
fn signed_root(v: f64, p: f64) -> f64 {
    if v >= 0.0 {
        v.powf(1.0 / p)
    } else {
        -(-v).powf(1.0 / p)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(c) => write!(f, "{}", c),
            Expression::Variable(i) => write!(f, "x{}", i),
            Expression::Negate(e) => write!(f, "-({})", e),
            Expression::Sum(cs) => {
                let parts: Vec<String> = cs.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(" + "))
            }
            Expression::Product(cs) => {
                let parts: Vec<String> = cs.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join("*"))
            }
            Expression::Divide(a, b) => write!(f, "({})/({})", a, b),
            Expression::Power(a, b) => write!(f, "({})^({})", a, b),
            Expression::Exp(e) => write!(f, "exp({})", e),
            Expression::Log(e) => write!(f, "log({})", e),
            Expression::Sqrt(e) => write!(f, "sqrt({})", e),
            Expression::Abs(e) => write!(f, "abs({})", e),
            Expression::Sin(e) => write!(f, "sin({})", e),
            Expression::Cos(e) => write!(f, "cos({})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expression {
        Expression::variable(0)
    }

    fn y() -> Expression {
        Expression::variable(1)
    }

    #[test]
    fn test_evaluate() {
        // exp(x) + y^2
        let e = Expression::sum(vec![
            Expression::exp(x()),
            Expression::powi(y(), 2),
        ]);
        let v = e.evaluate(&[0.0, 3.0]);
        assert!((v - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_folding() {
        let e = Expression::sum(vec![
            Expression::constant(1.0),
            Expression::constant(2.0),
        ]);
        assert_eq!(e.as_constant(), Some(3.0));

        let e = Expression::product(vec![Expression::constant(0.0), x()]);
        assert_eq!(e.as_constant(), Some(0.0));

        let e = Expression::power(x(), Expression::constant(1.0));
        assert_eq!(e, x());
    }

    #[test]
    fn test_interval_evaluation() {
        // x^2 over [-1, 2] is [0, 4].
        let e = Expression::powi(x(), 2);
        let i = e.interval(&[Interval::new(-1.0, 2.0)]);
        assert_eq!(i.lo, 0.0);
        assert_eq!(i.hi, 4.0);
    }

    #[test]
    fn test_differentiate_polynomial() {
        // d/dx (x^3) = 3 x^2
        let e = Expression::powi(x(), 3);
        let d = e.differentiate(0);
        assert!((d.evaluate(&[2.0]) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_differentiate_exp_chain() {
        // d/dx exp(2x) = 2 exp(2x)
        let e = Expression::exp(Expression::product(vec![Expression::constant(2.0), x()]));
        let d = e.differentiate(0);
        let expected = 2.0 * (2.0f64).exp();
        assert!((d.evaluate(&[1.0]) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_differentiate_quotient() {
        // d/dx (x / (x+1)) = 1/(x+1)^2
        let e = Expression::divide(x(), Expression::sum(vec![x(), Expression::constant(1.0)]));
        let d = e.differentiate(0);
        assert!((d.evaluate(&[1.0]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_differentiate_other_variable_is_zero() {
        let e = Expression::exp(x());
        let d = e.differentiate(1);
        assert_eq!(d.evaluate(&[5.0, 7.0]), 0.0);
    }

    #[test]
    fn test_convexity_rules() {
        let whole = vec![Interval::whole(); 2];

        // exp(x) is convex.
        assert_eq!(Expression::exp(x()).convexity(&whole), Convexity::Convex);

        // log(x) is concave.
        assert_eq!(Expression::log(x()).convexity(&whole), Convexity::Concave);

        // x^2 is convex.
        assert_eq!(Expression::powi(x(), 2).convexity(&whole), Convexity::Convex);

        // -x^2 is concave.
        assert_eq!(
            Expression::negate(Expression::powi(x(), 2)).convexity(&whole),
            Convexity::Concave
        );

        // x + y is linear.
        assert_eq!(
            Expression::sum(vec![x(), y()]).convexity(&whole),
            Convexity::Linear
        );

        // x^2 + exp(y) is convex.
        let e = Expression::sum(vec![Expression::powi(x(), 2), Expression::exp(y())]);
        assert_eq!(e.convexity(&whole), Convexity::Convex);

        // x^2 - y^2 is nonconvex.
        let e = Expression::sum(vec![
            Expression::powi(x(), 2),
            Expression::negate(Expression::powi(y(), 2)),
        ]);
        assert_eq!(e.convexity(&whole), Convexity::Nonconvex);
    }

    #[test]
    fn test_power_convexity_on_nonnegative_domain() {
        let nonneg = vec![Interval::new(0.0, 10.0)];
        // x^1.5 on x >= 0 is convex; x^0.5 concave.
        assert_eq!(
            Expression::power(x(), Expression::constant(1.5)).convexity(&nonneg),
            Convexity::Convex
        );
        assert_eq!(
            Expression::power(x(), Expression::constant(0.5)).convexity(&nonneg),
            Convexity::Concave
        );
    }

    #[test]
    fn test_reciprocal_convexity() {
        let pos = vec![Interval::new(0.5, 10.0)];
        // 1/x on x > 0 is convex.
        let e = Expression::divide(Expression::constant(1.0), x());
        assert_eq!(e.convexity(&pos), Convexity::Convex);
    }

    #[test]
    fn test_tighten_exp() {
        // exp(x) <= e  =>  x <= 1.
        let e = Expression::exp(x());
        let mut bounds = vec![Interval::new(-10.0, 10.0)];
        let changed = e.tighten_bounds(
            Interval::new(f64::NEG_INFINITY, std::f64::consts::E),
            &mut bounds,
            1e-10,
        );
        assert!(changed);
        assert!((bounds[0].hi - 1.0).abs() < 1e-9);
        assert_eq!(bounds[0].lo, -10.0);
    }

    #[test]
    fn test_tighten_square() {
        // x^2 <= 4  =>  x in [-2, 2].
        let e = Expression::powi(x(), 2);
        let mut bounds = vec![Interval::new(-10.0, 10.0)];
        let changed = e.tighten_bounds(Interval::new(0.0, 4.0), &mut bounds, 1e-10);
        assert!(changed);
        assert!((bounds[0].lo + 2.0).abs() < 1e-9);
        assert!((bounds[0].hi - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tighten_sum_distributes_residual() {
        // x + y <= 3 with y in [1, 2] forces x <= 2.
        let e = Expression::sum(vec![x(), y()]);
        let mut bounds = vec![Interval::new(-10.0, 10.0), Interval::new(1.0, 2.0)];
        let changed =
            e.tighten_bounds(Interval::new(f64::NEG_INFINITY, 3.0), &mut bounds, 1e-10);
        assert!(changed);
        assert!((bounds[0].hi - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tighten_noop_reports_false() {
        let e = Expression::powi(x(), 2);
        let mut bounds = vec![Interval::new(-2.0, 2.0)];
        // Target already looser than the image; nothing changes.
        let changed = e.tighten_bounds(Interval::new(0.0, 100.0), &mut bounds, 1e-10);
        assert!(!changed);
    }

    #[test]
    fn test_collect_variables() {
        let e = Expression::sum(vec![
            Expression::exp(x()),
            Expression::product(vec![y(), Expression::variable(3)]),
        ]);
        let mut vars = BTreeSet::new();
        e.collect_variables(&mut vars);
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec![0, 1, 3]);
    }
}
