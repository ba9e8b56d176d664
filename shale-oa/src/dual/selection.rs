//! Hyperplane point selection: the ESH and ECP strategies.
//!
//! Both walk the master's solution points, pick the most deviating fraction
//! of the cut (quadratic + nonlinear) constraints, and queue hyperplanes on
//! the dual state's waiting list. ESH root-searches each violated
//! constraint back to its boundary along the segment from an interior
//! point; ECP linearizes at the solution point itself. ESH falls back to
//! ECP when no interior point is known.

use shale_core::{Convexity, Problem};

use crate::results::SolutionPoint;
use crate::rootsearch::{find_boundary, RootsearchOptions};
use crate::settings::Settings;

use super::{fingerprint, DualState, Hyperplane, HyperplaneSource};

/// Selection parameters shared by both strategies.
#[derive(Debug, Clone)]
pub struct SelectionParameters {
    /// Keep at most this fraction of deviating constraints per point.
    pub constraint_selection_factor: f64,
    /// Prune constraints below this fraction of the worst deviation.
    pub max_constraint_factor: f64,
    /// Hard cap on hyperplanes queued per invocation.
    pub max_per_iteration: usize,
    /// Minimum normalized deviation for ESH to engage a constraint.
    pub rootsearch_constraint_tolerance: f64,
    /// Add at most one hyperplane per constraint per invocation.
    pub unique_constraints: bool,
    /// Root-search iteration/termination control.
    pub rootsearch: RootsearchOptions,
}

impl SelectionParameters {
    /// Pull the parameters from the option store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            constraint_selection_factor: settings
                .get_float("Dual.HyperplaneCuts.ConstraintSelectionFactor"),
            max_constraint_factor: settings.get_float("Dual.HyperplaneCuts.MaxConstraintFactor"),
            max_per_iteration: settings.get_int("Dual.HyperplaneCuts.MaxPerIteration") as usize,
            rootsearch_constraint_tolerance: settings
                .get_float("Dual.ESH.Rootsearch.ConstraintTolerance"),
            unique_constraints: settings.get_bool("Dual.ESH.Rootsearch.UniqueConstraints"),
            rootsearch: RootsearchOptions {
                max_iterations: settings.get_int("Subsolver.Rootsearch.MaxIterations") as usize,
                termination_tolerance: settings.get_float("Subsolver.Rootsearch.TerminationTolerance"),
            },
        }
    }
}

/// Source tag for a point's role in the current iteration.
fn ecp_source(point: &SolutionPoint, first: bool, is_mip: bool) -> HyperplaneSource {
    if point.is_relaxed {
        HyperplaneSource::MipCallbackRelaxed
    } else if first && is_mip {
        HyperplaneSource::MipOptimalSolutionPoint
    } else if is_mip {
        HyperplaneSource::MipSolutionPoolSolutionPoint
    } else {
        HyperplaneSource::LpRelaxedSolutionPoint
    }
}

fn esh_source(point: &SolutionPoint, first: bool, is_mip: bool) -> HyperplaneSource {
    if point.is_relaxed {
        HyperplaneSource::MipCallbackRelaxed
    } else if first && is_mip {
        HyperplaneSource::MipOptimalRootsearch
    } else if is_mip {
        HyperplaneSource::MipSolutionPoolRootsearch
    } else {
        HyperplaneSource::LpRelaxedRootsearch
    }
}

/// ECP: queue hyperplanes at the solution points themselves.
///
/// Returns the number of hyperplanes queued.
pub fn select_hyperplane_points_ecp(
    problem: &Problem,
    dual: &mut DualState,
    points: &[SolutionPoint],
    params: &SelectionParameters,
    iteration: usize,
    is_mip: bool,
) -> usize {
    let mut added = 0;

    for (i, sp) in points.iter().enumerate() {
        if added >= params.max_per_iteration {
            break;
        }
        let values = problem.fraction_of_deviating_cut_constraints(
            &sp.point,
            0.0,
            params.constraint_selection_factor,
        );
        if values.is_empty() {
            continue;
        }
        let worst = values[0].error;
        for value in &values {
            if added >= params.max_per_iteration {
                break;
            }
            if !value.normalized_value.is_finite() || value.error <= 0.0 {
                continue;
            }
            if value.error < params.max_constraint_factor * worst {
                continue;
            }
            let hp = Hyperplane {
                source_constraint: value.index,
                generated_point: sp.point.clone(),
                source: ecp_source(sp, i == 0, is_mip),
                iteration,
            };
            if dual.queue_hyperplane(hp) {
                added += 1;
            }
        }
    }

    if added == 0 {
        log::debug!("all nonlinear constraints fulfilled, no cutting planes added");
    }
    added
}

/// ESH: root-search each selected constraint back to its boundary along the
/// segment from an interior point, queueing the hyperplane there.
///
/// Falls back to ECP when the interior-point list is empty. Returns the
/// number of hyperplanes queued.
pub fn select_hyperplane_points_esh(
    problem: &Problem,
    dual: &mut DualState,
    points: &[SolutionPoint],
    params: &SelectionParameters,
    iteration: usize,
    is_mip: bool,
) -> usize {
    if dual.interior_points.is_empty() {
        log::debug!("no interior point known, adding cutting planes instead");
        return select_hyperplane_points_ecp(problem, dual, points, params, iteration, is_mip);
    }

    let mut added = 0;
    let mut added_for_constraint = vec![false; problem.num_constraints()];
    // Nonconvex constraints are deferred: cut only if nothing convex cut.
    let mut deferred: Vec<(usize, usize, usize)> = Vec::new();

    let interior_count = dual.interior_points.len();

    for (i, sp) in points.iter().enumerate() {
        let values = problem.fraction_of_deviating_cut_constraints(
            &sp.point,
            0.0,
            params.constraint_selection_factor,
        );
        if values.is_empty() {
            continue;
        }
        let worst = values[0].error;

        for value in &values {
            for j in 0..interior_count {
                if added >= params.max_per_iteration {
                    break;
                }
                if params.unique_constraints && added_for_constraint[value.index] {
                    continue;
                }
                if !value.normalized_value.is_finite() || !value.error.is_finite() {
                    continue;
                }
                if value.normalized_value < params.rootsearch_constraint_tolerance {
                    continue;
                }
                if value.error < params.max_constraint_factor * worst {
                    continue;
                }
                let convexity = problem.constraint(value.index).properties.convexity;
                if convexity == Convexity::Nonconvex || convexity == Convexity::Unknown {
                    deferred.push((i, j, value.index));
                    continue;
                }
                if root_search_and_queue(
                    problem,
                    dual,
                    sp,
                    j,
                    value.index,
                    params,
                    iteration,
                    esh_source(sp, i == 0, is_mip),
                ) {
                    added_for_constraint[value.index] = true;
                    added += 1;
                }
            }
        }
    }

    // Nonconvex fallback pass, only when nothing else was generated.
    if added == 0 {
        for (i, j, ci) in deferred {
            if added >= params.max_per_iteration {
                break;
            }
            if params.unique_constraints && added_for_constraint[ci] {
                continue;
            }
            let sp = &points[i];
            if root_search_and_queue(
                problem,
                dual,
                sp,
                j,
                ci,
                params,
                iteration,
                esh_source(sp, i == 0, is_mip),
            ) {
                added_for_constraint[ci] = true;
                added += 1;
            }
        }
    }

    added
}

/// PECP: project each selected solution point toward the violated
/// constraint's boundary by damped gradient steps before cutting.
///
/// The projection `p <- p - g(p) / ||grad g(p)||^2 * grad g(p)` walks the
/// linearized boundary; a handful of steps lands close enough that the cut
/// supports the region much more tightly than plain ECP.
pub fn select_hyperplane_points_pecp(
    problem: &Problem,
    dual: &mut DualState,
    points: &[SolutionPoint],
    params: &SelectionParameters,
    iteration: usize,
    is_mip: bool,
) -> usize {
    const PROJECTION_STEPS: usize = 5;
    let mut added = 0;

    for (i, sp) in points.iter().enumerate() {
        if added >= params.max_per_iteration {
            break;
        }
        let values = problem.fraction_of_deviating_cut_constraints(
            &sp.point,
            0.0,
            params.constraint_selection_factor,
        );
        if values.is_empty() {
            continue;
        }
        let worst = values[0].error;
        for value in &values {
            if added >= params.max_per_iteration {
                break;
            }
            if value.error < params.max_constraint_factor * worst || value.error <= 0.0 {
                continue;
            }
            let constraint = problem.constraint(value.index);
            let mut point = sp.point.clone();
            for _ in 0..PROJECTION_STEPS {
                let current = constraint.calculate(&point);
                if current.error <= 0.0 {
                    break;
                }
                let gradient = constraint.gradient(&point);
                let norm2: f64 = gradient.values().map(|g| g * g).sum();
                if norm2 < 1e-14 || !norm2.is_finite() {
                    break;
                }
                let step = (current.value - constraint.rhs) / norm2;
                for (&var, &g) in &gradient {
                    point[var] -= step * g;
                }
            }
            // Never cut from inside the region.
            if constraint.calculate(&point).normalized_value < 0.0 {
                point = sp.point.clone();
            }
            let hp = Hyperplane {
                source_constraint: value.index,
                generated_point: point,
                source: ecp_source(sp, i == 0, is_mip),
                iteration,
            };
            if dual.queue_hyperplane(hp) {
                added += 1;
            }
        }
    }
    added
}

/// Root-search one constraint on the segment interior -> solution point and
/// queue the hyperplane at the boundary crossing. Falls back to the
/// solution point itself when the search fails.
#[allow(clippy::too_many_arguments)]
fn root_search_and_queue(
    problem: &Problem,
    dual: &mut DualState,
    sp: &SolutionPoint,
    interior_index: usize,
    constraint_index: usize,
    params: &SelectionParameters,
    iteration: usize,
    source: HyperplaneSource,
) -> bool {
    let interior = &dual.interior_points[interior_index];
    let constraint = problem.constraint(constraint_index);
    let n = sp.point.len();

    let blend = |lambda: f64| -> Vec<f64> {
        (0..n)
            .map(|k| interior.point[k] + lambda * (sp.point[k] - interior.point[k]))
            .collect()
    };

    let external_point = match find_boundary(
        |lambda| constraint.calculate(&blend(lambda)).normalized_value,
        0.0,
        1.0,
        &params.rootsearch,
    ) {
        Some(result) => blend(result.outside),
        None => {
            log::debug!(
                "root search failed for constraint {}, using solution point",
                constraint.name
            );
            sp.point.clone()
        }
    };

    let external_value = constraint.calculate(&external_point);
    if external_value.normalized_value < 0.0 {
        log::debug!(
            "boundary point for constraint {} ended up interior ({})",
            constraint.name,
            external_value.normalized_value
        );
        return false;
    }

    let fp = fingerprint(constraint_index, &external_point);
    if dual.has_hyperplane_been_added(&fp) {
        return false;
    }

    dual.queue_hyperplane(Hyperplane {
        source_constraint: constraint_index,
        generated_point: external_point,
        source,
        iteration,
    })
}
