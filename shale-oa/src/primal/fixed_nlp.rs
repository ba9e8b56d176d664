//! Fixed-integer NLP primal heuristic.
//!
//! Candidate master points are rounded on their discrete coordinates, the
//! discrete variables are fixed in the NLP oracle, continuous variables are
//! warm-started from the candidate, and the continuous subproblem is
//! solved. A feasible solve yields a primal candidate and contracts the
//! call frequency; an infeasible solve queues a supporting hyperplane at
//! the NLP iterate (plus an integer cut for all-binary problems) and
//! relaxes the frequency. Tested integer patterns are memoized.

use shale_core::VariableType;

use crate::dual::{Hyperplane, HyperplaneSource};
use crate::env::Environment;
use crate::nlp::NlpStatus;
use crate::primal::{PrimalSource, PrimalState};

/// Outcome counts of one heuristic invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedNlpOutcome {
    /// NLP solves performed.
    pub solves: usize,
    /// Primal candidates accepted.
    pub accepted: usize,
    /// Infeasibility cuts queued.
    pub cuts_queued: usize,
}

/// True when the heuristic is due: by iteration count, by elapsed time, or
/// because a MIP-feasible incumbent candidate could improve the primal
/// bound.
pub fn is_due(env: &Environment) -> bool {
    if !env.settings.get_bool("Primal.FixedInteger.Use") {
        return false;
    }
    if env.primal.fixed_nlp_candidates.is_empty() {
        return false;
    }
    // Nothing primal yet: try immediately.
    if !env.results.primal_bound().is_finite() {
        return true;
    }
    let iteration = env.iteration_number();
    let since_iterations = iteration.saturating_sub(env.primal.last_fixed_nlp_iteration);
    let since_time = env.timer.elapsed() - env.primal.last_fixed_nlp_time;
    if since_iterations >= env.primal.iteration_frequency
        || since_time >= env.primal.time_frequency
    {
        return true;
    }
    // A candidate whose master objective beats the incumbent.
    env.primal
        .fixed_nlp_candidates
        .iter()
        .any(|sp| sp.objective_value < env.results.primal_bound() - 1e-9)
}

/// Run the heuristic on all queued, not-yet-tested candidate points.
pub fn run(env: &mut Environment) -> FixedNlpOutcome {
    let mut outcome = FixedNlpOutcome::default();

    let discrete: Vec<usize> = env.reformulated.discrete_variable_indices().to_vec();
    if discrete.is_empty() {
        env.primal.fixed_nlp_candidates.clear();
        return outcome;
    }
    let continuous: Vec<usize> = env.reformulated.real_variable_indices().to_vec();
    let warmstart = env.settings.get_bool("Primal.FixedInteger.Warmstart");
    let make_cut = env.settings.get_bool("Primal.FixedInteger.CreateInfeasibilityCut");
    let dynamic = env.settings.get_bool("Primal.FixedInteger.Frequency.Dynamic");
    let all_binary = env
        .reformulated
        .discrete_variable_indices()
        .iter()
        .all(|&i| env.reformulated.variable(i).var_type == VariableType::Binary);

    let candidates = std::mem::take(&mut env.primal.fixed_nlp_candidates);
    env.primal.last_fixed_nlp_iteration = env.iteration_number();
    env.primal.last_fixed_nlp_time = env.timer.elapsed();

    for candidate in candidates {
        let pattern = PrimalState::pattern_of(&discrete, &candidate.point);
        if !env.primal.tested_patterns.insert(pattern.clone()) {
            continue;
        }

        let fixed_values: Vec<f64> = pattern.iter().map(|&v| v as f64).collect();
        if warmstart {
            let indices: Vec<usize> = continuous.clone();
            let values: Vec<f64> = indices.iter().map(|&i| candidate.point[i]).collect();
            env.nlp.set_starting_point(&indices, &values);
        }
        env.nlp.fix_variables(&discrete, &fixed_values);

        let nlp_start = env.timer.elapsed();
        let status = env.nlp.solve();
        env.nlp.unfix_variables();
        env.nlp.clear_starting_point();
        env.timing.nlp += env.timer.elapsed() - nlp_start;
        env.primal.nlp_solves += 1;
        outcome.solves += 1;

        match status {
            NlpStatus::Optimal | NlpStatus::Feasible => {
                let solution = env.nlp.solution().to_vec();
                if env.offer_primal_candidate(solution, PrimalSource::NlpFixedIntegers) {
                    outcome.accepted += 1;
                }
                if dynamic {
                    // Success: call the heuristic more often, floored at a
                    // tenth of the configured frequencies.
                    let floor = (env.primal.base_iteration_frequency / 10).max(1);
                    env.primal.iteration_frequency = ((env.primal.iteration_frequency as f64
                        * 0.98)
                        .floor() as usize)
                        .max(floor);
                    env.primal.time_frequency =
                        (env.primal.time_frequency * 0.9).max(0.1 * env.primal.base_time_frequency);
                }
            }
            NlpStatus::Infeasible | NlpStatus::IterationLimit => {
                // The fixed pattern admits no continuous completion.
                if make_cut {
                    let iterate = env.nlp.solution().to_vec();
                    if iterate.len() == env.reformulated.num_variables() {
                        if let Some(worst) = env.reformulated.max_constraint_value(
                            &iterate,
                            &env.reformulated.cut_constraint_indices(),
                        ) {
                            if worst.error > 0.0 {
                                let iteration = env.iteration_number();
                                if env.dual.queue_hyperplane(Hyperplane {
                                    source_constraint: worst.index,
                                    generated_point: iterate,
                                    source: HyperplaneSource::PrimalNlp,
                                    iteration,
                                }) {
                                    outcome.cuts_queued += 1;
                                }
                            }
                        }
                    }
                }
                if all_binary && env.settings.get_bool("Dual.HyperplaneCuts.UseIntegerCuts") {
                    let mut ones = Vec::new();
                    let mut zeroes = Vec::new();
                    for (&var, &value) in discrete.iter().zip(pattern.iter()) {
                        if value >= 1 {
                            ones.push(var);
                        } else {
                            zeroes.push(var);
                        }
                    }
                    env.dual.queue_integer_cut(ones, zeroes);
                }
                if dynamic {
                    // Failure: call the heuristic less often.
                    env.primal.iteration_frequency =
                        (env.primal.iteration_frequency as f64 * 1.02).ceil() as usize + 1;
                    env.primal.time_frequency *= 1.1;
                }
            }
            NlpStatus::Unbounded | NlpStatus::TimeLimit | NlpStatus::Error => {
                log::debug!("fixed-integer NLP returned {:?}, skipping candidate", status);
            }
        }
    }

    outcome
}
