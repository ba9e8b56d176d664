//! The task scheduler and the algorithm's task inventory.
//!
//! The outer-approximation algorithm is a linear list of named tasks run by
//! a trivial driver loop. Control flow beyond "next task" exists in two
//! forms: an unconditional `Goto` (the loop-back edge) and conditional
//! reroutes from predicate tasks (the termination checks and the
//! infeasibility repair). Tasks communicate only through the shared
//! [`Environment`]; nothing is ever thrown across the scheduler boundary.

use std::sync::{Arc, Mutex};

use shale_core::{fbbt, FbbtSettings, ProblemConvexity};

use crate::dual::callback::{CallbackShared, EngineCallback};
use crate::dual::interior::{self, MinimaxParameters};
use crate::dual::selection::{
    select_hyperplane_points_ecp, select_hyperplane_points_esh, select_hyperplane_points_pecp,
    SelectionParameters,
};
use crate::env::Environment;
use crate::master::MasterStatus;
use crate::primal::{fixed_nlp, rootsearch as primal_rootsearch, PrimalSource};
use crate::results::{Iteration, SolutionPoint, TerminationReason};

/// What the driver does after a task ran.
pub enum TaskOutcome {
    /// Proceed to the next task in the list.
    Continue,
    /// Jump to the named task.
    Goto(&'static str),
    /// The run is over.
    Finished,
}

/// One named task.
pub trait Task {
    /// Execute against the shared environment.
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome;
}

/// The driver: a name-indexed list executed in order.
pub struct TaskList {
    tasks: Vec<(&'static str, Box<dyn Task>)>,
}

impl TaskList {
    /// Build the standard multi-/single-tree MINLP task list.
    pub fn standard() -> Self {
        let tasks: Vec<(&'static str, Box<dyn Task>)> = vec![
            ("Presolve", Box::new(Presolve)),
            ("CreateDualProblem", Box::new(CreateDualProblem)),
            ("FindInteriorPoint", Box::new(FindInteriorPoint)),
            ("InitializeIteration", Box::new(InitializeIteration)),
            ("AddIntegerCuts", Box::new(AddIntegerCuts)),
            ("AddHyperplanes", Box::new(AddHyperplanes)),
            ("ExecuteRelaxationStrategy", Box::new(ExecuteRelaxationStrategy)),
            ("SolveIteration", Box::new(SolveIteration)),
            (
                "SelectPrimalCandidatesFromSolutionPool",
                Box::new(SelectPrimalCandidatesFromSolutionPool),
            ),
            (
                "SelectPrimalCandidatesFromRootsearch",
                Box::new(SelectPrimalCandidatesFromRootsearch),
            ),
            ("PrintIterationReport", Box::new(PrintIterationReport)),
            ("CheckAbsoluteGap", Box::new(CheckAbsoluteGap)),
            ("CheckRelativeGap", Box::new(CheckRelativeGap)),
            ("CheckTimeLimit", Box::new(CheckTimeLimit)),
            ("CheckIterationLimit", Box::new(CheckIterationLimit)),
            ("CheckIterationError", Box::new(CheckIterationError)),
            ("CheckConstraintTolerance", Box::new(CheckConstraintTolerance)),
            ("CheckDualStagnation", Box::new(CheckDualStagnation)),
            (
                "RepairInfeasibleDualProblem",
                Box::new(RepairInfeasibleDualProblem::default()),
            ),
            ("SelectHyperplanePoints", Box::new(SelectHyperplanePoints)),
            ("UpdateInteriorPoint", Box::new(UpdateInteriorPoint)),
            (
                "SelectPrimalFixedNLPPointsFromSolutionPool",
                Box::new(SelectPrimalFixedNlpPointsFromSolutionPool),
            ),
            ("SelectPrimalCandidatesFromNLP", Box::new(SelectPrimalCandidatesFromNlp)),
            ("LoopBack", Box::new(LoopBack)),
            ("Terminate", Box::new(Terminate)),
        ];
        Self { tasks }
    }

    /// Run tasks until `Finished` (or a safety cap on task executions).
    pub fn run(&mut self, env: &mut Environment) {
        let iteration_limit = env.settings.get_int("Termination.IterationLimit").max(1) as usize;
        let cap = (iteration_limit + 10) * self.tasks.len() * 4;

        let mut pc = 0usize;
        for _ in 0..cap {
            if pc >= self.tasks.len() {
                break;
            }
            let name = self.tasks[pc].0;
            match self.tasks[pc].1.execute(env) {
                TaskOutcome::Continue => pc += 1,
                TaskOutcome::Goto(target) => {
                    match self.tasks.iter().position(|(n, _)| *n == target) {
                        Some(idx) => pc = idx,
                        None => {
                            log::debug!("task '{}' jumped to unknown task '{}'", name, target);
                            pc += 1;
                        }
                    }
                }
                TaskOutcome::Finished => return,
            }
        }
        // The cap is a backstop; record a reason if none was set.
        env.results.terminate(
            TerminationReason::IterationLimit,
            "task execution cap reached",
        );
    }
}

// --- setup tasks ---

/// Feasibility-based bound tightening on the reformulated problem.
struct Presolve;

impl Task for Presolve {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if !env.settings.get_bool("Model.BoundTightening.FeasibilityBased.Use") {
            return TaskOutcome::Continue;
        }
        let settings = FbbtSettings {
            max_iterations: env
                .settings
                .get_int("Model.BoundTightening.FeasibilityBased.MaxIterations")
                .max(1) as usize,
            use_nonlinear: env
                .settings
                .get_bool("Model.BoundTightening.FeasibilityBased.UseNonlinear"),
            min_improvement: 1e-10,
        };
        let report = fbbt::tighten(&mut env.reformulated, &settings);
        log::info!(
            "bound tightening: {} updates in {} passes",
            report.bounds_tightened,
            report.passes
        );
        if report.infeasible {
            env.results.terminate(
                TerminationReason::InfeasibleProblem,
                "bound tightening proved the constraint system infeasible",
            );
            return TaskOutcome::Goto("Terminate");
        }
        // Propagate tightened bounds into the NLP oracle.
        for v in env.reformulated.variables() {
            env.nlp
                .update_variable_bound(v.index, v.lower_bound, v.upper_bound);
        }
        TaskOutcome::Continue
    }
}

/// Populate the master with the reformulated problem's linear part.
struct CreateDualProblem;

impl Task for CreateDualProblem {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        for v in env.reformulated.variables() {
            env.master
                .add_variable(&v.name, v.var_type, v.lower_bound, v.upper_bound);
        }

        env.master.initialize_objective();
        let objective = env.reformulated.objective();
        for t in &objective.linear_terms {
            env.master.add_objective_linear_term(t.coefficient, t.variable);
        }
        let (sense, constant) = (objective.sense, objective.constant);
        env.master.finalize_objective(sense, constant);

        for &ci in env.reformulated.linear_constraint_indices() {
            let c = env.reformulated.constraint(ci);
            env.master.initialize_constraint();
            for t in &c.linear_terms {
                env.master.add_constraint_linear_term(t.coefficient, t.variable);
            }
            env.master
                .finalize_constraint(&c.name, c.lhs - c.constant, c.rhs - c.constant);
        }
        if env.master.finalize_problem().is_err() {
            env.results
                .terminate(TerminationReason::SubsolverError, "master rejected the problem");
            return TaskOutcome::Goto("Terminate");
        }

        env.master.set_solution_limit(
            env.settings.get_int("Dual.MIP.SolutionLimit.Initial").max(1) as usize,
        );

        // Single-tree: register the lazy-cut callback.
        if env.settings.get_text("Dual.TreeStrategy") == "SingleTree" {
            env.dual.single_tree = true;
            let shared = Arc::new(Mutex::new(CallbackShared::new(
                env.reformulated.clone(),
                SelectionParameters::from_settings(&env.settings),
                env.settings.get_int("Dual.Relaxation.MaxLazyConstraints").max(0) as usize,
            )));
            env.callback_state = Some(shared.clone());
            env.master
                .register_callback(Arc::new(Mutex::new(EngineCallback { shared })));
        }
        TaskOutcome::Continue
    }
}

/// Compute the ESH anchor via the cutting-plane minimax strategy.
struct FindInteriorPoint;

impl Task for FindInteriorPoint {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.settings.get_text("Dual.CutStrategy") != "ESH" {
            return TaskOutcome::Continue;
        }
        if env.reformulated.cut_constraint_indices().is_empty() {
            return TaskOutcome::Continue;
        }
        let strategy = env.settings.get_text("Dual.ESH.InteriorPoint.Solver");
        if strategy != "CuttingPlaneMiniMax" {
            log::debug!("interior-point solver '{}' not available, using ECP", strategy);
            return TaskOutcome::Continue;
        }
        let params = MinimaxParameters::from_settings(&env.settings);
        match interior::cutting_plane_minimax(&env.reformulated, &params) {
            Some(point) => {
                log::info!(
                    "interior point found, max constraint value {:.3e}",
                    point.max_constraint_value
                );
                env.dual.interior_points.push(point);
            }
            None => {
                // ESH falls back to ECP; no interior point is not an error.
                log::info!("no interior point found, falling back to cutting planes");
            }
        }
        TaskOutcome::Continue
    }
}

// --- iteration loop tasks ---

/// Open a fresh iteration record.
struct InitializeIteration;

impl Task for InitializeIteration {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let number = env.results.iterations.len() + 1;
        let dual_bound = env.results.dual_bound();
        let primal_bound = env.results.primal_bound();
        env.results
            .iterations
            .push(Iteration::new(number, dual_bound, primal_bound));
        env.current_points.clear();
        TaskOutcome::Continue
    }
}

/// Flush waiting integer cuts into the master.
struct AddIntegerCuts;

impl Task for AddIntegerCuts {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.dual.integer_cut_waiting_list.is_empty() {
            return TaskOutcome::Continue;
        }
        if !env.settings.get_bool("Dual.HyperplaneCuts.UseIntegerCuts") {
            env.dual.integer_cut_waiting_list.clear();
            return TaskOutcome::Continue;
        }
        let added = env.dual.flush_integer_cuts(env.master.as_mut());
        log::debug!("added {} integer cut(s)", added);
        TaskOutcome::Continue
    }
}

/// Flush the hyperplane waiting list into the master.
struct AddHyperplanes;

impl Task for AddHyperplanes {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let iteration = env.results.iterations.len();
        let added = {
            let problem = &env.reformulated;
            let dual = &mut env.dual;
            dual.flush_hyperplanes(problem, env.master.as_mut(), iteration)
        };
        if let Some(it) = env.results.current_iteration_mut() {
            it.cuts_added += added;
            it.total_cuts = env.master.num_cuts();
        }
        TaskOutcome::Continue
    }
}

/// Toggle integrality per the relaxed-iteration schedule.
struct ExecuteRelaxationStrategy;

impl Task for ExecuteRelaxationStrategy {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let discrete = env.reformulated.properties.is_discrete;
        if !discrete {
            return TaskOutcome::Continue;
        }
        let relax = env.settings.get_bool("Dual.Relaxation.Use");
        let limit = env.settings.get_int("Dual.Relaxation.IterationLimit").max(0) as usize;
        let iteration = env.results.iterations.len();
        env.master
            .activate_discrete_variables(!(relax && iteration <= limit));
        TaskOutcome::Continue
    }
}

/// Solve the master and harvest its solution pool.
struct SolveIteration;

impl Task for SolveIteration {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if let Some(cutoff) = env.dual.cutoff_to_use {
            env.master.set_cutoff(cutoff);
        }
        let remaining = env
            .timer
            .remaining(env.settings.get_float("Termination.TimeLimit"));
        let budget = env.settings.get_float("Subsolver.Mip.TimeLimit");
        env.master.set_time_limit(budget.min(remaining.max(0.01)));

        if let Some(state) = &env.callback_state {
            if let Ok(mut shared) = state.lock() {
                shared.refresh_from(&env.dual);
            }
        }

        let started = env.timer.elapsed();
        let status = env.master.solve();
        env.timing.master += env.timer.elapsed() - started;

        let is_mip = env.master.is_discrete_active();
        let iteration_number = env.results.iterations.len();

        // Harvest the solution pool into engine solution points.
        let pool = env.master.solution_pool();
        let cut_indices = env.reformulated.cut_constraint_indices();
        let points: Vec<SolutionPoint> = pool
            .iter()
            .map(|s| {
                let worst = env.reformulated.max_constraint_value(&s.point, &cut_indices);
                SolutionPoint {
                    point: s.point.clone(),
                    objective_value: s.objective,
                    iteration_found: iteration_number,
                    max_deviation_index: worst.map(|w| w.index),
                    max_deviation: worst.map(|w| w.normalized_value).unwrap_or(0.0),
                    is_relaxed: !is_mip,
                }
            })
            .collect();
        env.current_points = points;

        // Single-tree: merge callback results, queue its primal candidates.
        let mut pending: Vec<Vec<f64>> = Vec::new();
        if let Some(state) = &env.callback_state {
            if let Ok(mut shared) = state.lock() {
                shared.drain_into(&mut env.dual);
                pending = std::mem::take(&mut shared.pending_candidates);
            }
        }
        if let Some(it) = env.results.current_iteration_mut() {
            it.relaxed_lazy_cuts = env.master.lazy_cuts_added();
        }
        for point in pending {
            env.offer_primal_candidate(point, PrimalSource::MipSolutionPool);
        }

        // Dual bound: any master relaxation bound is globally valid.
        let improved = match status {
            MasterStatus::Error | MasterStatus::Infeasible | MasterStatus::Unbounded => false,
            _ => env.results.update_dual_bound(env.master.dual_bound()),
        };
        if is_mip {
            if improved {
                env.dual.stagnation_iterations = 0;
            } else {
                env.dual.stagnation_iterations += 1;
            }
        }

        let objective_value = env.master.objective_value();
        let open_nodes = env.master.open_nodes();
        let dual_bound = env.results.dual_bound();
        let primal_bound = env.results.primal_bound();
        let best_deviation = env
            .current_points
            .first()
            .map(|p| (p.max_deviation_index, p.max_deviation));
        if let Some(it) = env.results.current_iteration_mut() {
            it.solution_status = Some(status);
            it.objective_value = objective_value;
            it.open_nodes = open_nodes;
            it.is_mip = is_mip;
            it.solution_points = pool.len();
            it.dual_bound = dual_bound;
            it.primal_bound = primal_bound;
            if let Some((idx, dev)) = best_deviation {
                it.max_deviation_index = idx;
                it.max_deviation = dev;
            }
            it.errored = status == MasterStatus::Error;
        }

        if status == MasterStatus::Unbounded {
            env.results.terminate(
                TerminationReason::UnboundedProblem,
                "the master problem is unbounded",
            );
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Offer every master pool point as a primal candidate.
struct SelectPrimalCandidatesFromSolutionPool;

impl Task for SelectPrimalCandidatesFromSolutionPool {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let points: Vec<Vec<f64>> = env.current_points.iter().map(|p| p.point.clone()).collect();
        for point in points {
            env.offer_primal_candidate(point, PrimalSource::MipSolutionPool);
        }
        TaskOutcome::Continue
    }
}

/// Root-search primal candidates along incumbent-to-master segments.
struct SelectPrimalCandidatesFromRootsearch;

impl Task for SelectPrimalCandidatesFromRootsearch {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        primal_rootsearch::run(env);
        TaskOutcome::Continue
    }
}

/// One log line per iteration, in the master's log format.
struct PrintIterationReport;

impl Task for PrintIterationReport {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if !env.settings.get_bool("Output.IterationDetail") {
            return TaskOutcome::Continue;
        }
        if let Some(it) = env.results.current_iteration() {
            log::info!(
                "iter {:>4} {} | dual {:>13.6e} | primal {:>13.6e} | gap {:>9.2e} | cuts {:>4} (+{:>3}) | dev {:>9.2e} | {:?}",
                it.number,
                if it.is_mip { "MIP" } else { "LP " },
                it.dual_bound,
                it.primal_bound,
                env.results.absolute_gap(),
                it.total_cuts,
                it.cuts_added,
                it.max_deviation,
                it.solution_status,
            );
        }
        TaskOutcome::Continue
    }
}

// --- termination predicate tasks ---

/// Absolute-gap termination.
struct CheckAbsoluteGap;

impl Task for CheckAbsoluteGap {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.results.absolute_gap() <= env.settings.get_float("Termination.ObjectiveGap.Absolute")
        {
            env.results.terminate(
                TerminationReason::AbsoluteGap,
                "absolute objective gap within tolerance",
            );
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Relative-gap termination.
struct CheckRelativeGap;

impl Task for CheckRelativeGap {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.results.relative_gap() <= env.settings.get_float("Termination.ObjectiveGap.Relative")
        {
            env.results.terminate(
                TerminationReason::RelativeGap,
                "relative objective gap within tolerance",
            );
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Wall-clock termination.
struct CheckTimeLimit;

impl Task for CheckTimeLimit {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.timer.elapsed() >= env.settings.get_float("Termination.TimeLimit") {
            env.results
                .terminate(TerminationReason::TimeLimit, "time limit reached");
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Iteration-count termination.
struct CheckIterationLimit;

impl Task for CheckIterationLimit {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.results.iterations.len()
            >= env.settings.get_int("Termination.IterationLimit").max(1) as usize
        {
            env.results
                .terminate(TerminationReason::IterationLimit, "iteration limit reached");
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Unrecoverable-subsolver termination.
struct CheckIterationError;

impl Task for CheckIterationError {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.results.current_iteration().map(|it| it.errored) == Some(true) {
            env.results.terminate(
                TerminationReason::SubsolverError,
                "the master solver reported an unrecoverable error",
            );
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Non-strict termination: the master point satisfies every constraint.
struct CheckConstraintTolerance;

impl Task for CheckConstraintTolerance {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let tolerance = env.settings.get_float("Termination.ConstraintTolerance");
        let qualifies = env.results.current_iteration().is_some_and(|it| {
            it.is_mip
                && it.solution_status == Some(MasterStatus::Optimal)
                && it.max_deviation.is_finite()
                && it.max_deviation <= tolerance
        });
        if !qualifies {
            return TaskOutcome::Continue;
        }
        // The master optimum is (numerically) feasible: close the loop on it.
        if let Some(best) = env.current_points.first() {
            let point = best.point.clone();
            env.offer_primal_candidate(point, PrimalSource::MipSolutionPool);
        }
        env.results.terminate(
            TerminationReason::ConstraintTolerance,
            "master solution satisfies all constraints within tolerance",
        );
        TaskOutcome::Goto("Terminate")
    }
}

/// Dual-stagnation termination.
struct CheckDualStagnation;

impl Task for CheckDualStagnation {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let discrete = env.reformulated.properties.is_discrete;
        let current_is_mip = env
            .results
            .current_iteration()
            .map(|it| it.is_mip)
            .unwrap_or(false);
        if discrete && !current_is_mip {
            return TaskOutcome::Continue;
        }
        let iteration = env.results.iterations.len();
        if !env.dual.single_tree
            && env.dual.total_hyperplanes > 0
            && iteration.saturating_sub(env.dual.iteration_last_cut_added) > 2
        {
            env.results.terminate(
                TerminationReason::NoDualCutsAdded,
                "no additional dual cuts can be added",
            );
            return TaskOutcome::Goto("Terminate");
        }
        if env.dual.stagnation_iterations
            >= env.settings.get_int("Termination.DualStagnation.IterationLimit").max(1) as usize
        {
            env.results.terminate(
                TerminationReason::DualStagnation,
                "the dual bound has stagnated",
            );
            return TaskOutcome::Goto("Terminate");
        }
        TaskOutcome::Continue
    }
}

/// Recover from an infeasible master, or conclude.
#[derive(Default)]
struct RepairInfeasibleDualProblem {
    main_repair_tries: usize,
}

impl Task for RepairInfeasibleDualProblem {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let infeasible = env
            .results
            .current_iteration()
            .and_then(|it| it.solution_status)
            == Some(MasterStatus::Infeasible);
        if !infeasible {
            return TaskOutcome::Continue;
        }

        // An incumbent plus a cut-off means nothing in the master beats it:
        // the incumbent is optimal (up to the cut-off tolerance, and up to
        // cut validity on nonconvex problems).
        if env.dual.cutoff_to_use.is_some() && env.results.primal_bound().is_finite() {
            let primal = env.results.primal_bound();
            env.results.update_dual_bound(primal);
            if env.reformulated.properties.convexity != ProblemConvexity::Convex {
                env.results.bounds_are_global = false;
            }
            env.results.terminate(
                TerminationReason::AbsoluteGap,
                "master infeasible under the cut-off: incumbent is optimal",
            );
            return TaskOutcome::Goto("Terminate");
        }

        // Without a cut-off the master is a relaxation of the problem: for
        // convex problems its infeasibility is conclusive.
        if env.dual.cutoff_to_use.is_none()
            && (env.master.num_cuts() == 0
                || env.reformulated.properties.convexity == ProblemConvexity::Convex)
        {
            env.results.terminate(
                TerminationReason::InfeasibleProblem,
                "the master relaxation is infeasible",
            );
            return TaskOutcome::Goto("Terminate");
        }

        if env.dual.repairs_since_primal_update
            >= env
                .settings
                .get_int("Termination.InfeasibilityRepair.IterationLimit")
                .max(1) as usize
        {
            env.results.terminate(
                TerminationReason::InfeasibilityRepairFailed,
                "infeasibility repair limit reached",
            );
            return TaskOutcome::Goto("Terminate");
        }

        env.master.set_time_limit(
            env.settings
                .get_float("Termination.InfeasibilityRepair.TimeLimit"),
        );
        let repaired = env.master.repair_infeasibility();
        env.dual.total_repairs += 1;
        env.dual.repairs_since_primal_update += 1;
        env.results.bounds_are_global = false;
        if let Some(it) = env.results.current_iteration_mut() {
            it.was_repaired = true;
        }

        if repaired {
            log::info!("infeasibility repair succeeded, continuing");
            env.dual.failed_repairs = 0;
            return TaskOutcome::Goto("InitializeIteration");
        }
        self.main_repair_tries += 1;
        if self.main_repair_tries < 2 {
            // Retry once with the cut-off relaxed to the primal bound.
            env.dual.cutoff_to_use = Some(env.results.primal_bound());
            env.dual.repairs_since_primal_update = 0;
            return TaskOutcome::Goto("InitializeIteration");
        }
        env.results.terminate(
            TerminationReason::InfeasibilityRepairFailed,
            "infeasibility repair failed twice",
        );
        TaskOutcome::Goto("Terminate")
    }
}

// --- cut and primal generation tasks ---

/// ESH or ECP hyperplane selection on the current solution points.
struct SelectHyperplanePoints;

impl Task for SelectHyperplanePoints {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.current_points.is_empty() {
            return TaskOutcome::Continue;
        }
        let params = SelectionParameters::from_settings(&env.settings);
        let iteration = env.results.iterations.len();
        let is_mip = env
            .results
            .current_iteration()
            .map(|it| it.is_mip)
            .unwrap_or(false);
        let strategy = env.settings.get_text("Dual.CutStrategy");
        let added = match strategy.as_str() {
            "ESH" => select_hyperplane_points_esh(
                &env.reformulated,
                &mut env.dual,
                &env.current_points,
                &params,
                iteration,
                is_mip,
            ),
            "PECP" => select_hyperplane_points_pecp(
                &env.reformulated,
                &mut env.dual,
                &env.current_points,
                &params,
                iteration,
                is_mip,
            ),
            _ => select_hyperplane_points_ecp(
                &env.reformulated,
                &mut env.dual,
                &env.current_points,
                &params,
                iteration,
                is_mip,
            ),
        };
        log::debug!("queued {} hyperplane(s)", added);
        TaskOutcome::Continue
    }
}

/// Fold the incumbent into the interior-point list, per policy.
struct UpdateInteriorPoint;

impl Task for UpdateInteriorPoint {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        let policy = env.settings.get_text("Dual.ESH.InteriorPoint.UsePrimalSolution");
        if policy == "No" {
            return TaskOutcome::Continue;
        }
        let n = env.reformulated.num_variables();
        let Some(best) = env.primal.best() else {
            return TaskOutcome::Continue;
        };
        if best.point.len() < n {
            return TaskOutcome::Continue;
        }
        let point = best.point[..n].to_vec();
        interior::update_from_primal(
            &env.reformulated,
            &mut env.dual.interior_points,
            &point,
            &policy,
        );
        TaskOutcome::Continue
    }
}

/// Queue master pool points for the fixed-integer NLP heuristic.
struct SelectPrimalFixedNlpPointsFromSolutionPool;

impl Task for SelectPrimalFixedNlpPointsFromSolutionPool {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if !env.reformulated.properties.is_discrete {
            return TaskOutcome::Continue;
        }
        let is_mip = env
            .results
            .current_iteration()
            .map(|it| it.is_mip)
            .unwrap_or(false);
        if !is_mip {
            return TaskOutcome::Continue;
        }
        for sp in &env.current_points {
            env.primal.fixed_nlp_candidates.push(sp.clone());
        }
        // Keep the queue bounded; newest candidates win.
        let cap = 4 * env.primal.pool_capacity;
        let len = env.primal.fixed_nlp_candidates.len();
        if len > cap {
            env.primal.fixed_nlp_candidates.drain(..len - cap);
        }
        TaskOutcome::Continue
    }
}

/// Run the fixed-integer NLP heuristic when due.
struct SelectPrimalCandidatesFromNlp;

impl Task for SelectPrimalCandidatesFromNlp {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if !fixed_nlp::is_due(env) {
            return TaskOutcome::Continue;
        }
        let outcome = fixed_nlp::run(env);
        log::debug!(
            "fixed-integer NLP: {} solve(s), {} accepted, {} cut(s) queued",
            outcome.solves,
            outcome.accepted,
            outcome.cuts_queued
        );
        TaskOutcome::Continue
    }
}

/// The loop-back edge.
struct LoopBack;

impl Task for LoopBack {
    fn execute(&mut self, _env: &mut Environment) -> TaskOutcome {
        TaskOutcome::Goto("InitializeIteration")
    }
}

/// Final bookkeeping.
struct Terminate;

impl Task for Terminate {
    fn execute(&mut self, env: &mut Environment) -> TaskOutcome {
        if env.results.termination.is_none() {
            env.results.terminate(
                TerminationReason::IterationLimit,
                "scheduler ended without an explicit reason",
            );
        }
        env.timing.total = env.timer.elapsed();
        log::info!(
            "terminated: {:?} ({})",
            env.results.termination,
            env.results.termination_description
        );
        TaskOutcome::Finished
    }
}
