//! Convexity and monotonicity classification lattices.

/// Convexity classification of a term, expression or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convexity {
    /// Affine in the variables.
    Linear,
    /// Convex (includes affine as a degenerate case where classified so).
    Convex,
    /// Concave.
    Concave,
    /// Provably neither convex nor concave.
    Nonconvex,
    /// Could not be classified.
    Unknown,
}

impl Convexity {
    /// Combine convexities of additive operands.
    ///
    /// Linear is the identity; matching curvature is preserved; mixing
    /// convex with concave yields Nonconvex; Unknown is absorbing except
    /// against Linear.
    pub fn combine(self, other: Convexity) -> Convexity {
        use Convexity::*;
        match (self, other) {
            (Linear, x) | (x, Linear) => x,
            (Convex, Convex) => Convex,
            (Concave, Concave) => Concave,
            (Unknown, _) | (_, Unknown) => Unknown,
            _ => Nonconvex,
        }
    }

    /// Convexity of the negated function.
    pub fn negate(self) -> Convexity {
        match self {
            Convexity::Convex => Convexity::Concave,
            Convexity::Concave => Convexity::Convex,
            other => other,
        }
    }

    /// Convexity after scaling by a constant.
    pub fn scale(self, coefficient: f64) -> Convexity {
        if coefficient >= 0.0 {
            self
        } else {
            self.negate()
        }
    }

    /// True for Linear or Convex.
    pub fn is_convex_or_linear(&self) -> bool {
        matches!(self, Convexity::Linear | Convexity::Convex)
    }

    /// True for Linear or Concave.
    pub fn is_concave_or_linear(&self) -> bool {
        matches!(self, Convexity::Linear | Convexity::Concave)
    }
}

/// Monotonicity of a term or expression over a variable box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monotonicity {
    /// Independent of all variables.
    Constant,
    /// Nondecreasing in every variable.
    Nondecreasing,
    /// Nonincreasing in every variable.
    Nonincreasing,
    /// Mixed or unclassified.
    Unknown,
}

impl Monotonicity {
    /// Combine monotonicities of additive operands.
    pub fn combine(self, other: Monotonicity) -> Monotonicity {
        use Monotonicity::*;
        match (self, other) {
            (Constant, x) | (x, Constant) => x,
            (Nondecreasing, Nondecreasing) => Nondecreasing,
            (Nonincreasing, Nonincreasing) => Nonincreasing,
            _ => Unknown,
        }
    }

    /// Monotonicity of the negated function.
    pub fn negate(self) -> Monotonicity {
        match self {
            Monotonicity::Nondecreasing => Monotonicity::Nonincreasing,
            Monotonicity::Nonincreasing => Monotonicity::Nondecreasing,
            other => other,
        }
    }
}
