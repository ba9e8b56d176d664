//! The engine environment.
//!
//! All engine state lives in one explicit [`Environment`] carried through
//! every task: settings, both problems, results, the dual and primal engine
//! state, the master and NLP solver handles, and the wall clock. There are
//! no process-wide singletons; multiple solver instances can coexist in one
//! process.

use std::sync::{Arc, Mutex};

use shale_core::Problem;

use crate::dual::callback::CallbackShared;
use crate::dual::DualState;
use crate::master::MasterSolver;
use crate::nlp::NlpSolver;
use crate::primal::{PrimalSource, PrimalState, PrimalTolerances};
use crate::reformulate::ReformulationMap;
use crate::results::{Results, SolutionPoint, Timer, TimingReport};
use crate::settings::Settings;

/// Shared engine state carried through every task.
pub struct Environment {
    /// The option store.
    pub settings: Settings,
    /// The problem as given.
    pub original: Problem,
    /// The dual-friendly reformulated problem.
    pub reformulated: Problem,
    /// Back-projection map.
    pub mapping: ReformulationMap,
    /// Bounds, iterations, termination.
    pub results: Results,
    /// Dual (cut-generation) state.
    pub dual: DualState,
    /// Primal (heuristic) state.
    pub primal: PrimalState,
    /// The master solver handle.
    pub master: Box<dyn MasterSolver>,
    /// The NLP oracle handle.
    pub nlp: Box<dyn NlpSolver>,
    /// Wall clock.
    pub timer: Timer,
    /// Solution points of the current iteration's master solve.
    pub current_points: Vec<SolutionPoint>,
    /// Timing breakdown under construction.
    pub timing: TimingReport,
    /// Shared state of the single-tree callback, when registered.
    pub callback_state: Option<Arc<Mutex<CallbackShared>>>,
}

impl Environment {
    /// Sign converting original-sense objectives to internal minimization.
    pub fn objective_sign(&self) -> f64 {
        self.mapping.objective_sign()
    }

    /// Current iteration number (1-based; 0 before the loop starts).
    pub fn iteration_number(&self) -> usize {
        self.results.iterations.len()
    }

    /// Offer a primal candidate; on acceptance updates the primal bound,
    /// the master cut-off and the heuristic incumbent. Returns true if the
    /// primal bound improved.
    pub fn offer_primal_candidate(&mut self, point: Vec<f64>, source: PrimalSource) -> bool {
        let tolerances = PrimalTolerances::from_settings(&self.settings);
        let iteration = self.iteration_number();
        let sign = self.objective_sign();

        let Some(objective) =
            self.primal
                .add_candidate(&self.original, sign, &tolerances, point, iteration, source)
        else {
            return false;
        };

        let best_point = match self.primal.best() {
            Some(best) => best.point.clone(),
            None => return false,
        };
        let improved = self.results.update_primal_bound(objective, &best_point);
        if improved {
            log::info!(
                "primal bound improved to {:.8e} ({:?})",
                objective,
                source
            );
            self.dual.repairs_since_primal_update = 0;

            // Tell the master: cut-off plus incumbent injection.
            let tolerance = self.settings.get_float("Dual.MIP.CutOff.Tolerance");
            self.dual.cutoff_to_use = Some(objective + tolerance);

            // Inject the incumbent in reformulated space, with auxiliary
            // coordinates made consistent with their definitions.
            let original_prefix = self.mapping.back_project(&best_point);
            if let Some(incumbent) = self.mapping.lift(
                &original_prefix,
                self.reformulated.num_variables(),
                objective,
            ) {
                self.master.post_heuristic_solution(&incumbent, objective);
            }
        }
        improved
    }
}
