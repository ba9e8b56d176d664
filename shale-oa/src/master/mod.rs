//! Master (dual) problem abstraction.
//!
//! The dual engine talks to the MIP master through [`MasterSolver`]; the
//! trait mirrors the operations a commercial MIP binding would expose
//! (incremental problem building, bound/fixing updates, cut management,
//! cutoff, callbacks, solution pool). The reference implementation in
//! [`milp`] is a branch-and-bound driver over the built-in simplex; adapters
//! for external solvers implement the same contract.
//!
//! The engine's logic is identical across the multi-tree driver (cuts added
//! between solves) and the single-tree driver (lazy cuts added from inside
//! the solve through [`MasterCallback`]).

pub mod milp;

use std::sync::{Arc, Mutex};

use shale_core::{ObjectiveSense, VariableType};

use crate::error::OaResult;

pub use milp::{BranchAndBoundMaster, MilpSettings};

/// Status of a master solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    /// Solved to optimality (within the master's own gap).
    Optimal,
    /// Feasible solutions found, optimality not proven.
    Feasible,
    /// The master is infeasible.
    Infeasible,
    /// The master is unbounded.
    Unbounded,
    /// Time budget exhausted.
    TimeLimit,
    /// Iteration/node budget exhausted.
    IterationLimit,
    /// Stopped at the configured solution limit.
    SolutionLimit,
    /// Unrecoverable solver error.
    Error,
}

impl MasterStatus {
    /// True if at least one feasible point is available.
    pub fn has_solution(&self) -> bool {
        matches!(
            self,
            MasterStatus::Optimal | MasterStatus::Feasible | MasterStatus::SolutionLimit
        )
    }
}

/// One entry of the master's solution pool.
#[derive(Debug, Clone)]
pub struct MasterSolution {
    /// Full variable vector.
    pub point: Vec<f64>,
    /// Objective value.
    pub objective: f64,
}

/// Receiver for lazy cuts added from inside a callback.
pub trait LazyCutSink {
    /// Add the cut `terms . x <= rhs` to the running master.
    fn add_lazy_cut(&mut self, terms: &[(usize, f64)], rhs: f64);
}

/// Hooks invoked by a single-tree master during its solve.
///
/// The master may call these from any of its worker threads; engine state
/// behind the callback is serialized with a single mutex.
pub trait MasterCallback: Send {
    /// A relaxation node was solved to a fractional point.
    fn on_relaxation_node(&mut self, point: &[f64], objective: f64, sink: &mut dyn LazyCutSink);

    /// An integer-feasible candidate is about to become incumbent. Cuts
    /// added here that the candidate violates cause it to be rejected.
    fn on_candidate_incumbent(&mut self, point: &[f64], objective: f64, sink: &mut dyn LazyCutSink);
}

/// Shared handle to a registered callback.
pub type SharedCallback = Arc<Mutex<dyn MasterCallback>>;

/// The master-solver contract.
pub trait MasterSolver {
    // Problem building.

    /// Add a variable, returning its column index.
    fn add_variable(&mut self, name: &str, var_type: VariableType, lb: f64, ub: f64) -> usize;

    /// Begin objective assembly.
    fn initialize_objective(&mut self);

    /// Add a linear objective term.
    fn add_objective_linear_term(&mut self, coefficient: f64, variable: usize);

    /// Add a quadratic objective term. Backends without QP support reject it.
    fn add_objective_quadratic_term(
        &mut self,
        coefficient: f64,
        first: usize,
        second: usize,
    ) -> OaResult<()>;

    /// Finish objective assembly.
    fn finalize_objective(&mut self, sense: ObjectiveSense, constant: f64);

    /// Begin assembly of one constraint row.
    fn initialize_constraint(&mut self);

    /// Add a linear term to the constraint under assembly.
    fn add_constraint_linear_term(&mut self, coefficient: f64, variable: usize);

    /// Finish the constraint under assembly as `lhs <= row <= rhs`.
    fn finalize_constraint(&mut self, name: &str, lhs: f64, rhs: f64);

    /// Finish problem building.
    fn finalize_problem(&mut self) -> OaResult<()>;

    // Variable management.

    /// Enable or disable integrality restrictions.
    fn activate_discrete_variables(&mut self, active: bool);

    /// Fix variables to values (bounds collapse).
    fn fix_variables(&mut self, indices: &[usize], values: &[f64]);

    /// Undo all fixings.
    fn unfix_variables(&mut self);

    /// Update a variable's bounds.
    fn update_variable_bound(&mut self, variable: usize, lb: f64, ub: f64);

    // Cut management.

    /// Add the linear cut `terms . x <= rhs`. Returns the new row index, or
    /// None if an identical row is already present.
    fn add_linear_constraint(&mut self, terms: &[(usize, f64)], rhs: f64, name: &str)
        -> Option<usize>;

    /// Add a no-good cut forbidding the given 0/1 pattern.
    fn create_integer_cut(&mut self, ones: &[usize], zeroes: &[usize]);

    // Controls.

    /// Objective cut-off: prune anything at or beyond this value.
    fn set_cutoff(&mut self, value: f64);

    /// Stop after this many improving solutions.
    fn set_solution_limit(&mut self, limit: usize);

    /// Current solution limit.
    fn solution_limit(&self) -> usize;

    /// Soft time budget for the next solve, in seconds.
    fn set_time_limit(&mut self, seconds: f64);

    /// Inject a known feasible point as an incumbent candidate.
    fn post_heuristic_solution(&mut self, point: &[f64], objective: f64);

    /// Register single-tree callback hooks.
    fn register_callback(&mut self, callback: SharedCallback);

    // Solving and results.

    /// Solve the current master.
    fn solve(&mut self) -> MasterStatus;

    /// Objective value of the best solution of the last solve.
    fn objective_value(&self) -> f64;

    /// Solution pool of the last solve, best first.
    fn solution_pool(&self) -> Vec<MasterSolution>;

    /// Best proven bound of the last solve.
    fn dual_bound(&self) -> f64;

    /// Relax cut rows by the smallest l1 repair; true if the repaired
    /// master is feasible.
    fn repair_infeasibility(&mut self) -> bool;

    // Introspection.

    /// Number of variables.
    fn num_variables(&self) -> usize;

    /// Number of cut rows currently in the master.
    fn num_cuts(&self) -> usize;

    /// Open nodes remaining after the last solve.
    fn open_nodes(&self) -> usize;

    /// Lazy cuts added during the last solve.
    fn lazy_cuts_added(&self) -> usize;

    /// True if integrality restrictions are currently active.
    fn is_discrete_active(&self) -> bool;
}
