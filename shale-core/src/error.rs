//! Error types for the model layer.

use thiserror::Error;

/// Errors raised while building or finalizing a problem.
///
/// Numerical issues during evaluation (NaN gradients, empty intervals) are
/// deliberately *not* errors: evaluation routines skip the offending entity
/// and log at debug level, per the engine's error-handling policy.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Variable bounds are inverted.
    #[error("variable '{name}' has lower bound {lower} > upper bound {upper}")]
    InvalidBounds {
        /// Variable name.
        name: String,
        /// Offending lower bound.
        lower: f64,
        /// Offending upper bound.
        upper: f64,
    },

    /// A term or expression references a variable index outside the problem.
    #[error("reference to undeclared variable index {0}")]
    UnknownVariable(usize),

    /// A coefficient or bound is NaN where a finite value is required.
    #[error("non-finite coefficient in {0}")]
    NonFiniteCoefficient(String),

    /// A monomial's variable list is empty.
    #[error("monomial term in {0} has no variables")]
    EmptyMonomial(String),

    /// Operation requires a finalized problem.
    #[error("problem '{0}' has not been finalized")]
    NotFinalized(String),

    /// The problem was already finalized and cannot accept new entities.
    #[error("problem '{0}' is already finalized")]
    AlreadyFinalized(String),

    /// Point dimension does not match the number of variables.
    #[error("point has length {got}, problem has {expected} variables")]
    DimensionMismatch {
        /// Provided length.
        got: usize,
        /// Expected length.
        expected: usize,
    },
}

/// Result type for model-layer operations.
pub type CoreResult<T> = Result<T, ModelError>;
