//! Error types for the outer-approximation engine.
//!
//! Tasks never propagate errors across the scheduler boundary: anything that
//! reaches the driver is converted into a termination reason. The error type
//! exists for construction-time failures (bad model, bad options) and for
//! subsolver adapters to report unrecoverable states.

use thiserror::Error;

/// Errors raised by the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Problem validation failed at build time.
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    /// Model-layer error.
    #[error("model error: {0}")]
    Model(#[from] shale_core::ModelError),

    /// An option key or value was rejected.
    #[error("invalid option {key}: {reason}")]
    InvalidOption {
        /// Full `Category.Name` key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The master solver failed unrecoverably.
    #[error("master solver error: {0}")]
    MasterSolver(String),

    /// The NLP oracle failed unrecoverably.
    #[error("NLP solver error: {0}")]
    NlpSolver(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations.
pub type OaResult<T> = Result<T, EngineError>;
