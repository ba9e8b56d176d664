//! The solver facade: reformulate, dispatch, report.
//!
//! Continuous problems collapse to a single NLP-oracle call; anything with
//! discrete variables runs the outer-approximation task list. The report
//! translates bounds and the solution back into the original problem's
//! sense and variable space.

use shale_core::{fbbt, FbbtSettings, Problem};

use crate::env::Environment;
use crate::error::{EngineError, OaResult};
use crate::lp::LpLimits;
use crate::master::{BranchAndBoundMaster, MilpSettings};
use crate::nlp::{CuttingPlaneNlp, NlpSettings, NlpSolver, NlpStatus};
use crate::primal::PrimalState;
use crate::reformulate::{reformulate, ReformulationMap};
use crate::results::{
    IterationStatistics, Results, ResultStatus, SolveReport, TerminationReason, Timer, TimingReport,
};
use crate::settings::Settings;
use crate::tasks::TaskList;

/// The solver: owns the problem and options for one run.
pub struct Solver {
    problem: Problem,
    settings: Settings,
}

impl Solver {
    /// Create a solver for a finalized problem.
    pub fn new(problem: Problem, settings: Settings) -> OaResult<Self> {
        if !problem.is_finalized() {
            return Err(EngineError::InvalidProblem(
                "problem must be finalized before solving".into(),
            ));
        }
        Ok(Self { problem, settings })
    }

    /// Create a solver with default options.
    pub fn with_defaults(problem: Problem) -> OaResult<Self> {
        Self::new(problem, Settings::default())
    }

    /// Access the option store before solving.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Run the solve and produce the structured report.
    pub fn solve(&mut self) -> OaResult<SolveReport> {
        let timer = Timer::new();
        let (mut reformulated, mapping) = reformulate(&self.problem, &self.settings)?;

        if self.problem.discrete_variable_indices().is_empty() {
            return self.solve_continuous(&mut reformulated, &mapping, timer);
        }

        let lp_limits = LpLimits {
            max_iterations: self.settings.get_int("Subsolver.Lp.IterationLimit").max(100) as usize,
            time_limit: self.settings.get_float("Subsolver.Lp.TimeLimit"),
        };
        let master = BranchAndBoundMaster::new(MilpSettings {
            integer_tolerance: self.settings.get_float("Primal.Tolerance.Integer"),
            node_limit: self.settings.get_int("Subsolver.Mip.NodeLimit").max(1) as usize,
            pool_size: self.settings.get_int("Primal.Pool.MaxSize").max(1) as usize,
            lp_limits: lp_limits.clone(),
        });
        let nlp = CuttingPlaneNlp::new(
            reformulated.clone(),
            NlpSettings {
                iteration_limit: self.settings.get_int("Subsolver.Nlp.IterationLimit").max(1)
                    as usize,
                constraint_tolerance: self.settings.get_float("Subsolver.Nlp.ConstraintTolerance"),
                constraint_selection_factor: 1.0,
                lp_limits,
            },
        )?;

        let mut env = Environment {
            primal: PrimalState::from_settings(&self.settings),
            settings: self.settings.clone(),
            original: self.problem.clone(),
            reformulated,
            mapping,
            results: Results::new(),
            dual: Default::default(),
            master: Box::new(master),
            nlp: Box::new(nlp),
            timer,
            current_points: Vec::new(),
            timing: TimingReport::default(),
            callback_state: None,
        };

        TaskList::standard().run(&mut env);
        Ok(build_report(&env))
    }

    /// A problem without discrete variables is one NLP-oracle call.
    fn solve_continuous(
        &self,
        reformulated: &mut Problem,
        mapping: &ReformulationMap,
        timer: Timer,
    ) -> OaResult<SolveReport> {
        let sign = mapping.objective_sign();
        let mut timing = TimingReport::default();

        // Bound tightening first; it may already prove infeasibility.
        if self.settings.get_bool("Model.BoundTightening.FeasibilityBased.Use") {
            let report = fbbt::tighten(
                reformulated,
                &FbbtSettings {
                    max_iterations: self
                        .settings
                        .get_int("Model.BoundTightening.FeasibilityBased.MaxIterations")
                        .max(1) as usize,
                    use_nonlinear: self
                        .settings
                        .get_bool("Model.BoundTightening.FeasibilityBased.UseNonlinear"),
                    min_improvement: 1e-10,
                },
            );
            if report.infeasible {
                timing.total = timer.elapsed();
                return Ok(SolveReport {
                    status: ResultStatus::Infeasible,
                    termination: Some(TerminationReason::InfeasibleProblem),
                    termination_description: "bound tightening proved infeasibility".into(),
                    primal_bound: sign * f64::INFINITY,
                    dual_bound: sign * f64::INFINITY,
                    absolute_gap: f64::INFINITY,
                    relative_gap: f64::INFINITY,
                    solution: None,
                    iteration_count: 0,
                    iteration_statistics: Vec::new(),
                    timing,
                });
            }
        }

        let mut nlp = CuttingPlaneNlp::new(
            reformulated.clone(),
            NlpSettings {
                iteration_limit: self.settings.get_int("Subsolver.Nlp.IterationLimit").max(1)
                    as usize,
                constraint_tolerance: self.settings.get_float("Subsolver.Nlp.ConstraintTolerance"),
                constraint_selection_factor: 1.0,
                lp_limits: LpLimits {
                    max_iterations: self.settings.get_int("Subsolver.Lp.IterationLimit").max(100)
                        as usize,
                    time_limit: self.settings.get_float("Subsolver.Lp.TimeLimit"),
                },
            },
        )?;

        let nlp_start = timer.elapsed();
        let status = nlp.solve();
        timing.nlp = timer.elapsed() - nlp_start;
        timing.total = timer.elapsed();

        let (status, termination) = match status {
            NlpStatus::Optimal | NlpStatus::Feasible => {
                (ResultStatus::Optimal, TerminationReason::AbsoluteGap)
            }
            NlpStatus::Infeasible => (ResultStatus::Infeasible, TerminationReason::InfeasibleProblem),
            NlpStatus::Unbounded => (ResultStatus::Unbounded, TerminationReason::UnboundedProblem),
            NlpStatus::TimeLimit => (ResultStatus::Error, TerminationReason::TimeLimit),
            NlpStatus::IterationLimit => (ResultStatus::Error, TerminationReason::IterationLimit),
            NlpStatus::Error => (ResultStatus::Error, TerminationReason::SubsolverError),
        };

        let (primal, dual, solution) = if status == ResultStatus::Optimal {
            let internal = nlp.objective_value();
            (
                sign * internal,
                sign * internal,
                Some(mapping.back_project(nlp.solution())),
            )
        } else {
            (sign * f64::INFINITY, sign * f64::NEG_INFINITY, None)
        };

        Ok(SolveReport {
            status,
            termination: Some(termination),
            termination_description: String::new(),
            primal_bound: primal,
            dual_bound: dual,
            absolute_gap: if status == ResultStatus::Optimal {
                0.0
            } else {
                f64::INFINITY
            },
            relative_gap: if status == ResultStatus::Optimal {
                0.0
            } else {
                f64::INFINITY
            },
            solution,
            iteration_count: 1,
            iteration_statistics: Vec::new(),
            timing,
        })
    }
}

/// Assemble the final report in the original sense and variable space.
fn build_report(env: &Environment) -> SolveReport {
    let sign = env.objective_sign();
    let has_primal = env.results.primal_bound().is_finite();

    let status = match env.results.termination {
        Some(TerminationReason::InfeasibleProblem) => ResultStatus::Infeasible,
        Some(TerminationReason::UnboundedProblem) => ResultStatus::Unbounded,
        Some(
            TerminationReason::AbsoluteGap
            | TerminationReason::RelativeGap
            | TerminationReason::ConstraintTolerance,
        ) if has_primal => ResultStatus::Optimal,
        _ if has_primal => ResultStatus::Feasible,
        _ => ResultStatus::Error,
    };

    let solution = env
        .results
        .best_primal_point
        .as_ref()
        .map(|p| env.mapping.back_project(p));

    let iteration_statistics: Vec<IterationStatistics> = env
        .results
        .iterations
        .iter()
        .map(|it| IterationStatistics {
            number: it.number,
            dual_bound: sign * it.dual_bound,
            primal_bound: sign * it.primal_bound,
            cuts_added: it.cuts_added,
            max_deviation: it.max_deviation,
            is_mip: it.is_mip,
        })
        .collect();

    SolveReport {
        status,
        termination: env.results.termination,
        termination_description: env.results.termination_description.clone(),
        primal_bound: sign * env.results.primal_bound(),
        dual_bound: sign * env.results.dual_bound(),
        absolute_gap: env.results.absolute_gap(),
        relative_gap: env.results.relative_gap(),
        solution,
        iteration_count: env.results.iterations.len(),
        iteration_statistics,
        timing: env.timing.clone(),
    }
}
