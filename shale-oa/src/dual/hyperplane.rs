//! Hyperplane records and fingerprints.

use std::hash::{Hash, Hasher};

/// Where a hyperplane's generation point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HyperplaneSource {
    /// Root search from the master's optimal point.
    MipOptimalRootsearch,
    /// Root search from a master solution-pool point.
    MipSolutionPoolRootsearch,
    /// Root search from an LP-relaxation point.
    LpRelaxedRootsearch,
    /// The master's optimal point itself (ECP).
    MipOptimalSolutionPoint,
    /// A solution-pool point itself (ECP).
    MipSolutionPoolSolutionPoint,
    /// An LP-relaxation point itself (ECP).
    LpRelaxedSolutionPoint,
    /// A relaxation point seen inside a single-tree callback.
    MipCallbackRelaxed,
    /// Generated while searching for an interior point.
    InteriorPointSearch,
    /// The iterate of an infeasible fixed-integer NLP solve.
    PrimalNlp,
}

impl HyperplaneSource {
    /// True for cuts injected lazily from inside a master solve.
    pub fn is_lazy(&self) -> bool {
        matches!(self, HyperplaneSource::MipCallbackRelaxed)
    }
}

/// A supporting-hyperplane record: the constraint it supports and the point
/// it was generated at. The master row is derived on flush.
#[derive(Debug, Clone)]
pub struct Hyperplane {
    /// Index of the source constraint in the reformulated problem.
    pub source_constraint: usize,
    /// Full variable vector the linearization is taken at.
    pub generated_point: Vec<f64>,
    /// Generation context.
    pub source: HyperplaneSource,
    /// Iteration the hyperplane was generated in.
    pub iteration: usize,
}

/// Deduplication fingerprint: source-constraint index plus the point hashed
/// with its coordinates rounded to 1e-6.
pub fn fingerprint(constraint: usize, point: &[f64]) -> (usize, u64) {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for v in point {
        ((v / 1e-6).round() as i64).hash(&mut hasher);
    }
    (constraint, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_rounds() {
        // Differences below the rounding grain collide; above it, differ.
        let a = fingerprint(0, &[1.0, 2.0]);
        let b = fingerprint(0, &[1.0 + 1e-9, 2.0]);
        let c = fingerprint(0, &[1.0 + 1e-4, 2.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_separates_constraints() {
        assert_ne!(fingerprint(0, &[1.0]).0, fingerprint(1, &[1.0]).0);
    }
}
