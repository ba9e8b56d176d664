//! Shale outer-approximation engine for convex MINLP.
//!
//! The engine solves mixed-integer nonlinear programs whose nonlinearities
//! are convex (nonconvex problems are handled heuristically with a
//! documented loss of the optimality guarantee) by refining a mixed-integer
//! linear master problem with supporting hyperplanes:
//!
//! - **ESH**: hyperplanes at boundary points found by a root search between
//!   an interior point and an infeasible master solution
//! - **ECP**: hyperplanes at the infeasible master solutions themselves
//!
//! The master is abstracted behind [`master::MasterSolver`]; the bundled
//! reference implementation is a branch-and-bound driver over the built-in
//! simplex. Continuous subproblems go through the [`nlp::NlpSolver`]
//! oracle, implemented by a Kelley cutting-plane solver. The algorithm
//! itself is a task list (`tasks`) over a shared [`env::Environment`];
//! multi-tree and single-tree strategies share all engine logic.
//!
//! # Example
//!
//! ```ignore
//! use shale_core::{Problem, VariableType};
//! use shale_oa::{Settings, Solver};
//!
//! let mut problem = Problem::new("example");
//! // ... build variables, constraints, objective ...
//! problem.finalize()?;
//!
//! let mut solver = Solver::with_defaults(problem)?;
//! let report = solver.solve()?;
//! println!("{:?}: {}", report.status, report.primal_bound);
//! ```

#![warn(clippy::all)]

pub mod dual;
pub mod env;
pub mod error;
pub mod lp;
pub mod master;
pub mod nlp;
pub mod primal;
pub mod reformulate;
pub mod results;
pub mod rootsearch;
pub mod settings;
pub mod solver;
pub mod tasks;

pub use error::{EngineError, OaResult};
pub use reformulate::{reformulate, ReformulationMap};
pub use results::{ResultStatus, SolveReport, TerminationReason};
pub use settings::{SettingValue, Settings};
pub use solver::Solver;
