//! Root-search primal candidates.
//!
//! Along the segment from the current incumbent to a new master solution
//! point, a feasibility root search on the max-violation merit locates the
//! boundary of the nonlinear-feasible region; the strictly feasible end of
//! the bracket becomes a primal candidate. Only useful when the master
//! point is infeasible and the incumbent is interior, which is exactly the
//! situation after a master solve mid-convergence.

use crate::env::Environment;
use crate::primal::PrimalSource;
use crate::rootsearch::{find_boundary, RootsearchOptions};

/// Try to extract primal candidates from the current iteration's master
/// points. Returns the number of accepted candidates.
pub fn run(env: &mut Environment) -> usize {
    if !env.settings.get_bool("Primal.Rootsearch.Use") {
        return 0;
    }
    let Some(best) = env.primal.best() else {
        return 0;
    };
    let incumbent = best.point.clone();
    let n = env.reformulated.num_variables();
    if incumbent.len() < n {
        return 0;
    }

    let cut_indices = env.reformulated.cut_constraint_indices();
    if cut_indices.is_empty() {
        return 0;
    }
    let options = RootsearchOptions {
        max_iterations: env.settings.get_int("Subsolver.Rootsearch.MaxIterations") as usize,
        termination_tolerance: env.settings.get_float("Subsolver.Rootsearch.TerminationTolerance"),
    };

    let merit_at = |point: &[f64]| -> f64 {
        env.reformulated
            .max_constraint_value(point, &cut_indices)
            .map(|v| v.normalized_value)
            .unwrap_or(f64::NEG_INFINITY)
    };

    let mut candidates: Vec<Vec<f64>> = Vec::new();
    for sp in &env.current_points {
        if sp.point.len() != n {
            continue;
        }
        // Need an infeasible far end and a feasible near end.
        if merit_at(&sp.point) <= 0.0 || merit_at(&incumbent[..n]) > 0.0 {
            continue;
        }
        let blend = |lambda: f64| -> Vec<f64> {
            (0..n)
                .map(|k| incumbent[k] + lambda * (sp.point[k] - incumbent[k]))
                .collect()
        };
        if let Some(result) = find_boundary(|l| merit_at(&blend(l)), 0.0, 1.0, &options) {
            candidates.push(blend(result.inside));
        }
    }

    let mut accepted = 0;
    for candidate in candidates {
        if env.offer_primal_candidate(candidate, PrimalSource::Rootsearch) {
            accepted += 1;
        }
    }
    accepted
}
