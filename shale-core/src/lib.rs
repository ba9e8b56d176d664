//! Shale: symbolic model layer for convex mixed-integer nonlinear programming.
//!
//! This crate provides the problem representation consumed by the
//! outer-approximation engine in `shale-oa`:
//!
//! - **Variables** with bounds, integrality and derived usage flags
//! - **Terms**: linear, quadratic, monomial and signomial
//! - **Nonlinear expressions**: an immutable recursive tree with evaluation,
//!   interval arithmetic, symbolic differentiation, convexity and
//!   monotonicity classification
//! - **Constraints and objectives** with classification and normalized
//!   deviation values
//! - **Problems** owning all entities in arena vectors, with class/convexity
//!   properties and deviating-constraint queries
//! - **FBBT**: feasibility-based bound tightening over all term kinds
//!
//! # Ownership
//!
//! The problem exclusively owns variables, terms, constraints and expression
//! nodes. Entities refer to variables by dense index; expression nodes are
//! shared via `Arc` and never mutated after construction.

#![warn(clippy::all)]

pub mod constraint;
pub mod convexity;
pub mod error;
pub mod expression;
pub mod fbbt;
pub mod interval;
pub mod objective;
pub mod oracle;
pub mod problem;
pub mod term;
pub mod variable;

pub use constraint::{Constraint, ConstraintClass, ConstraintValue};
pub use convexity::{Convexity, Monotonicity};
pub use error::{CoreResult, ModelError};
pub use expression::Expression;
pub use fbbt::{FbbtReport, FbbtSettings};
pub use interval::Interval;
pub use objective::{Objective, ObjectiveSense};
pub use oracle::{GradientOracle, SparseGradient, SparseHessian, SymbolicOracle};
pub use problem::{Problem, ProblemClass, ProblemConvexity, ProblemProperties};
pub use term::{LinearTerm, MonomialTerm, QuadraticTerm, SignomialElement, SignomialTerm};
pub use variable::{Variable, VariableType};
