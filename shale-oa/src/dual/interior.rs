//! Interior-point computation for the ESH root search.
//!
//! The default strategy is a cutting-plane minimax solve: minimize an
//! auxiliary variable `mu` bounding every (normalized) nonlinear-constraint
//! value from above, over the problem's linear constraints and bounds. Each
//! LP solution is blended with the previous one by a Brent linesearch on
//! the max-violation merit before cuts are added, which is what makes the
//! sequence converge into the interior instead of bouncing along the
//! boundary.

use shale_core::Problem;

use crate::lp::{self, LpLimits, LpProblem, LpRow, LpStatus};
use crate::rootsearch::brent_minimize;
use crate::settings::Settings;

/// A strictly feasible anchor point for ESH root searches.
#[derive(Debug, Clone)]
pub struct InteriorPoint {
    /// Full variable vector (reformulated space).
    pub point: Vec<f64>,
    /// Max normalized nonlinear-constraint value at the point (negative).
    pub max_constraint_value: f64,
}

/// Parameters of the minimax solve.
#[derive(Debug, Clone)]
pub struct MinimaxParameters {
    /// Outer iteration cap.
    pub iteration_limit: usize,
    /// Absolute termination tolerance on the linesearch/LP objective gap.
    pub termination_tolerance_abs: f64,
    /// Relative termination tolerance.
    pub termination_tolerance_rel: f64,
    /// Fraction of deviating constraints cut per iteration.
    pub constraint_selection_factor: f64,
    /// Bit precision of the Brent linesearch.
    pub bit_precision: u32,
    /// Iteration cap of the Brent linesearch.
    pub linesearch_iteration_limit: usize,
    /// Bounds of the auxiliary objective variable.
    pub objective_bounds: (f64, f64),
    /// LP subsolve limits.
    pub lp_limits: LpLimits,
}

impl MinimaxParameters {
    /// Pull the parameters from the option store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            iteration_limit: settings
                .get_int("Dual.ESH.InteriorPoint.CuttingPlane.IterationLimit")
                as usize,
            termination_tolerance_abs: settings
                .get_float("Dual.ESH.InteriorPoint.CuttingPlane.TerminationToleranceAbs"),
            termination_tolerance_rel: settings
                .get_float("Dual.ESH.InteriorPoint.CuttingPlane.TerminationToleranceRel"),
            constraint_selection_factor: settings
                .get_float("Dual.ESH.InteriorPoint.CuttingPlane.ConstraintSelectionFactor"),
            bit_precision: settings.get_int("Dual.ESH.InteriorPoint.CuttingPlane.BitPrecision")
                as u32,
            linesearch_iteration_limit: settings
                .get_int("Dual.ESH.InteriorPoint.CuttingPlane.IterationLimitSubsolver")
                as usize,
            objective_bounds: (
                settings.get_float("Dual.ESH.InteriorPoint.MinimaxObjectiveLowerBound"),
                settings.get_float("Dual.ESH.InteriorPoint.MinimaxObjectiveUpperBound"),
            ),
            lp_limits: LpLimits {
                max_iterations: settings.get_int("Subsolver.Lp.IterationLimit") as usize,
                time_limit: settings.get_float("Subsolver.Lp.TimeLimit"),
            },
        }
    }
}

/// Max normalized value over the cut constraints.
fn max_normalized_value(problem: &Problem, cut_indices: &[usize], point: &[f64]) -> f64 {
    problem
        .max_constraint_value(point, cut_indices)
        .map(|v| v.normalized_value)
        .unwrap_or(f64::NEG_INFINITY)
}

/// Solve the cutting-plane minimax problem. Returns a strictly interior
/// point, or None when none was found (the dual engine then falls back to
/// ECP).
pub fn cutting_plane_minimax(
    problem: &Problem,
    params: &MinimaxParameters,
) -> Option<InteriorPoint> {
    let n = problem.num_variables();
    let cut_indices = problem.cut_constraint_indices();
    if cut_indices.is_empty() {
        return None;
    }

    // LP over (x, mu): min mu subject to the linear constraints.
    let mut lp = LpProblem::new(n + 1);
    let mu = n;
    lp.lower[..n].copy_from_slice(&problem.variable_lower_bounds());
    lp.upper[..n].copy_from_slice(&problem.variable_upper_bounds());
    lp.lower[mu] = params.objective_bounds.0;
    lp.upper[mu] = params.objective_bounds.1;
    lp.objective[mu] = 1.0;
    for &ci in problem.linear_constraint_indices() {
        let c = problem.constraint(ci);
        lp.rows.push(LpRow {
            name: c.name.clone(),
            coefficients: c
                .linear_terms
                .iter()
                .map(|t| (t.variable, t.coefficient))
                .collect(),
            lhs: c.lhs - c.constant,
            rhs: c.rhs - c.constant,
        });
    }

    let mut previous: Option<Vec<f64>> = None;
    let mut current: Vec<f64> = Vec::new();
    let mut current_value = f64::INFINITY;
    let mut cuts_total = 0usize;

    for iteration in 0..params.iteration_limit {
        let sol = lp::solve(&lp, &params.lp_limits);
        match sol.status {
            LpStatus::Optimal => {}
            LpStatus::Infeasible | LpStatus::Unbounded => {
                log::debug!("minimax LP ended {:?}", sol.status);
                return None;
            }
            _ => {
                log::debug!("minimax LP stopped early ({:?})", sol.status);
                return None;
            }
        }
        let lp_objective = sol.objective;
        if !lp_objective.is_finite() {
            return None;
        }
        let lp_point: Vec<f64> = sol.x[..n].to_vec();

        match &previous {
            None => {
                // First iteration: no linesearch, cut at the LP point.
                current = lp_point.clone();
                current_value = max_normalized_value(problem, &cut_indices, &current);
            }
            Some(prev) => {
                // Blend toward the new LP point by minimizing the merit.
                let merit = |lambda: f64| {
                    let blended: Vec<f64> = (0..n)
                        .map(|k| lambda * lp_point[k] + (1.0 - lambda) * prev[k])
                        .collect();
                    max_normalized_value(problem, &cut_indices, &blended)
                };
                let result = brent_minimize(
                    merit,
                    0.0,
                    1.0,
                    params.bit_precision,
                    params.linesearch_iteration_limit,
                );
                current = (0..n)
                    .map(|k| result.x * lp_point[k] + (1.0 - result.x) * prev[k])
                    .collect();
                current_value = result.f_min;

                let diff_abs = (current_value - lp_objective).abs();
                let diff_rel = diff_abs / (1e-10 + lp_objective.abs());
                if current_value < 0.0
                    && (diff_abs < params.termination_tolerance_abs
                        || diff_rel < params.termination_tolerance_rel)
                {
                    log::debug!(
                        "interior point found after {} minimax iterations ({} cuts), value {}",
                        iteration,
                        cuts_total,
                        current_value
                    );
                    return Some(InteriorPoint {
                        point: current,
                        max_constraint_value: current_value,
                    });
                }
            }
        }

        // Cut the most deviating constraints at the blended point:
        // grad . x - mu <= grad . x_hat - violation(x_hat), normalized.
        let selected = problem.fraction_of_deviating_cut_constraints(
            &current,
            f64::NEG_INFINITY,
            params.constraint_selection_factor,
        );
        let mut added = 0;
        for value in &selected {
            let constraint = problem.constraint(value.index);
            let Some((gradient, rhs)) = constraint.linearization_at(&current) else {
                continue;
            };
            let scale = 1.0 / constraint.rhs.abs().max(1.0);
            let mut terms: Vec<(usize, f64)> = gradient
                .into_iter()
                .map(|(v, c)| (v, c * scale))
                .collect();
            terms.push((mu, -1.0));
            lp.rows.push(LpRow::less_equal(
                format!("minimax_{}_{}", value.index, cuts_total),
                terms,
                rhs * scale,
            ));
            cuts_total += 1;
            added += 1;
        }

        previous = Some(current.clone());

        if added == 0 {
            break;
        }
    }

    if current_value < 0.0 && !current.is_empty() {
        Some(InteriorPoint {
            point: current,
            max_constraint_value: current_value,
        })
    } else {
        log::debug!("minimax ended without a strictly interior point");
        None
    }
}

/// Fold an accepted primal solution into the interior-point list,
/// per the configured policy ("Replace", "Average" or "No").
pub fn update_from_primal(
    problem: &Problem,
    interior_points: &mut Vec<InteriorPoint>,
    primal_point: &[f64],
    policy: &str,
) -> bool {
    if policy == "No" {
        return false;
    }
    let cut_indices = problem.cut_constraint_indices();
    let value = max_normalized_value(problem, &cut_indices, primal_point);
    if value >= 0.0 {
        // Not strictly interior: discard.
        return false;
    }
    match (policy, interior_points.first()) {
        ("Replace", _) | ("Average", None) => {
            interior_points.clear();
            interior_points.push(InteriorPoint {
                point: primal_point.to_vec(),
                max_constraint_value: value,
            });
            true
        }
        ("Average", Some(existing)) => {
            let averaged: Vec<f64> = existing
                .point
                .iter()
                .zip(primal_point.iter())
                .map(|(a, b)| 0.5 * (a + b))
                .collect();
            let avg_value = max_normalized_value(problem, &cut_indices, &averaged);
            if avg_value < 0.0 {
                interior_points[0] = InteriorPoint {
                    point: averaged,
                    max_constraint_value: avg_value,
                };
                true
            } else {
                false
            }
        }
        _ => false,
    }
}
