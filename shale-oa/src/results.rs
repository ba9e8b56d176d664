//! Run bookkeeping: bounds, iterations, solution points and the final
//! structured result record.
//!
//! The engine works on the reformulated problem, which is always a
//! minimization; bounds here follow that convention. The final
//! [`SolveReport`] translates back to the original problem's sense and
//! variable space.

use std::time::Instant;

use serde::Serialize;

use crate::master::MasterStatus;

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// Absolute objective gap below tolerance.
    AbsoluteGap,
    /// Relative objective gap below tolerance.
    RelativeGap,
    /// Wall-clock limit reached.
    TimeLimit,
    /// Iteration limit reached.
    IterationLimit,
    /// Master solution satisfies all constraints within tolerance.
    ConstraintTolerance,
    /// Dual bound stagnated for the configured number of iterations.
    DualStagnation,
    /// No further dual cuts could be added.
    NoDualCutsAdded,
    /// The problem was proven infeasible.
    InfeasibleProblem,
    /// The problem is unbounded.
    UnboundedProblem,
    /// Infeasibility repair failed repeatedly.
    InfeasibilityRepairFailed,
    /// A subsolver reported an unrecoverable error.
    SubsolverError,
}

/// Overall outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    /// Optimal within gap tolerances.
    Optimal,
    /// A feasible point was found but optimality was not proven.
    Feasible,
    /// No feasible point exists.
    Infeasible,
    /// The problem is unbounded.
    Unbounded,
    /// The run ended without a conclusion.
    Error,
}

/// A master-solution point flowing through the engine.
#[derive(Debug, Clone)]
pub struct SolutionPoint {
    /// Full variable vector in reformulated space.
    pub point: Vec<f64>,
    /// Master objective value at the point.
    pub objective_value: f64,
    /// Iteration in which the point was found.
    pub iteration_found: usize,
    /// Index of the most deviating constraint, if any is violated.
    pub max_deviation_index: Option<usize>,
    /// Normalized value of the most deviating constraint.
    pub max_deviation: f64,
    /// True for points from an LP relaxation or callback relaxation node.
    pub is_relaxed: bool,
}

/// Per-iteration record.
#[derive(Debug, Clone)]
pub struct Iteration {
    /// Monotonically increasing iteration number (1-based).
    pub number: usize,
    /// Master status at the end of the iteration.
    pub solution_status: Option<MasterStatus>,
    /// Master objective value.
    pub objective_value: f64,
    /// Dual bound at the end of the iteration.
    pub dual_bound: f64,
    /// Primal bound at the end of the iteration.
    pub primal_bound: f64,
    /// Hyperplanes added while preparing this iteration.
    pub cuts_added: usize,
    /// Total hyperplanes in the master after this iteration.
    pub total_cuts: usize,
    /// Max normalized constraint deviation of the best master point.
    pub max_deviation: f64,
    /// Index of the most deviating constraint.
    pub max_deviation_index: Option<usize>,
    /// Number of open B&B nodes reported by the master.
    pub open_nodes: usize,
    /// True if integer restrictions were active in the master.
    pub is_mip: bool,
    /// Number of points in the master's solution pool.
    pub solution_points: usize,
    /// True if infeasibility repair ran in this iteration.
    pub was_repaired: bool,
    /// True if the master reported an unrecoverable error.
    pub errored: bool,
    /// Lazy cuts relaxed into the iteration (single-tree).
    pub relaxed_lazy_cuts: usize,
}

impl Iteration {
    /// Start a fresh iteration record.
    pub fn new(number: usize, dual_bound: f64, primal_bound: f64) -> Self {
        Self {
            number,
            solution_status: None,
            objective_value: f64::NAN,
            dual_bound,
            primal_bound,
            cuts_added: 0,
            total_cuts: 0,
            max_deviation: f64::NAN,
            max_deviation_index: None,
            open_nodes: 0,
            is_mip: false,
            solution_points: 0,
            was_repaired: false,
            errored: false,
            relaxed_lazy_cuts: 0,
        }
    }
}

/// Wall-clock tracking with a soft global limit.
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Start the clock.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed seconds since the run started.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Seconds left of `limit`, floored at zero.
    pub fn remaining(&self, limit: f64) -> f64 {
        (limit - self.elapsed()).max(0.0)
    }
}

/// Accumulated run state and bounds (reformulated-minimization sense).
#[derive(Debug, Clone)]
pub struct Results {
    /// Best dual (lower) bound seen so far.
    dual_bound: f64,
    /// Best primal (upper) bound seen so far.
    primal_bound: f64,
    /// Iteration records, in order.
    pub iterations: Vec<Iteration>,
    /// Termination reason once decided.
    pub termination: Option<TerminationReason>,
    /// Free-form description of the termination.
    pub termination_description: String,
    /// Best primal point in reformulated space.
    pub best_primal_point: Option<Vec<f64>>,
    /// True while every bound update has been globally valid.
    pub bounds_are_global: bool,
}

impl Default for Results {
    fn default() -> Self {
        Self::new()
    }
}

impl Results {
    /// Fresh result state with infinite bounds.
    pub fn new() -> Self {
        Self {
            dual_bound: f64::NEG_INFINITY,
            primal_bound: f64::INFINITY,
            iterations: Vec::new(),
            termination: None,
            termination_description: String::new(),
            best_primal_point: None,
            bounds_are_global: true,
        }
    }

    /// Current dual bound.
    pub fn dual_bound(&self) -> f64 {
        self.dual_bound
    }

    /// Current primal bound.
    pub fn primal_bound(&self) -> f64 {
        self.primal_bound
    }

    /// Offer a dual bound candidate; accepted only if it improves
    /// (bound monotonicity invariant).
    ///
    /// Returns true on improvement.
    pub fn update_dual_bound(&mut self, candidate: f64) -> bool {
        if candidate.is_finite() && candidate > self.dual_bound + 1e-12 {
            // A valid dual bound never exceeds the primal bound by more than
            // noise; clamp instead of crossing.
            self.dual_bound = candidate.min(self.primal_bound);
            true
        } else {
            false
        }
    }

    /// Offer a primal bound candidate with its point; accepted only if it
    /// improves. Returns true on improvement.
    pub fn update_primal_bound(&mut self, candidate: f64, point: &[f64]) -> bool {
        if candidate.is_finite() && candidate < self.primal_bound - 1e-12 {
            self.primal_bound = candidate;
            self.best_primal_point = Some(point.to_vec());
            true
        } else {
            false
        }
    }

    /// Absolute objective gap.
    pub fn absolute_gap(&self) -> f64 {
        if self.primal_bound.is_finite() && self.dual_bound.is_finite() {
            (self.primal_bound - self.dual_bound).abs()
        } else {
            f64::INFINITY
        }
    }

    /// Relative objective gap.
    pub fn relative_gap(&self) -> f64 {
        self.absolute_gap() / (self.primal_bound.abs() + 1e-10)
    }

    /// The iteration currently being assembled.
    pub fn current_iteration_mut(&mut self) -> Option<&mut Iteration> {
        self.iterations.last_mut()
    }

    /// The last completed iteration.
    pub fn current_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// Record a termination reason (first one wins).
    pub fn terminate(&mut self, reason: TerminationReason, description: impl Into<String>) {
        if self.termination.is_none() {
            self.termination = Some(reason);
            self.termination_description = description.into();
        }
    }
}

/// Per-iteration statistics row of the final report.
#[derive(Debug, Clone, Serialize)]
pub struct IterationStatistics {
    /// Iteration number.
    pub number: usize,
    /// Dual bound after the iteration.
    pub dual_bound: f64,
    /// Primal bound after the iteration.
    pub primal_bound: f64,
    /// Hyperplanes added in the iteration.
    pub cuts_added: usize,
    /// Max normalized constraint deviation.
    pub max_deviation: f64,
    /// True if the iteration solved a MIP (vs an LP relaxation).
    pub is_mip: bool,
}

/// Timing breakdown of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingReport {
    /// Total wall-clock seconds.
    pub total: f64,
    /// Seconds spent in master solves.
    pub master: f64,
    /// Seconds spent in NLP subsolves.
    pub nlp: f64,
    /// Seconds spent generating cuts (root searches included).
    pub cut_generation: f64,
}

/// The final structured result record, in the original problem's sense and
/// variable space.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    /// Outcome classification.
    pub status: ResultStatus,
    /// Termination reason.
    pub termination: Option<TerminationReason>,
    /// Human-readable termination description.
    pub termination_description: String,
    /// Primal bound (original sense).
    pub primal_bound: f64,
    /// Dual bound (original sense).
    pub dual_bound: f64,
    /// Absolute gap.
    pub absolute_gap: f64,
    /// Relative gap.
    pub relative_gap: f64,
    /// Best primal solution in the original variable space.
    pub solution: Option<Vec<f64>>,
    /// Number of iterations run.
    pub iteration_count: usize,
    /// Per-iteration statistics.
    pub iteration_statistics: Vec<IterationStatistics>,
    /// Timing breakdown.
    pub timing: TimingReport,
}
