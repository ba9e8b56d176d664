//! Invariant checks at the engine level: bound monotonicity across
//! iterations, hyperplane validity against the true feasible region, and
//! cut non-duplication through the selection-to-master pipeline.

use shale_core::{
    Constraint, LinearTerm, Objective, ObjectiveSense, Problem, QuadraticTerm, VariableType,
};
use shale_oa::dual::selection::{select_hyperplane_points_esh, SelectionParameters};
use shale_oa::dual::{DualState, InteriorPoint};
use shale_oa::master::{BranchAndBoundMaster, MasterSolver, MilpSettings};
use shale_oa::results::SolutionPoint;
use shale_oa::rootsearch::RootsearchOptions;
use shale_oa::{ResultStatus, Settings, Solver};

/// min x + 2y s.t. x^2 + y^2 <= 4, x + y >= 1, x integer.
fn convex_minlp() -> Problem {
    let mut p = Problem::new("inv");
    let x = p.add_variable("x", VariableType::Integer, -2.0, 2.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, -2.0, 2.0).unwrap();

    let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 4.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
    p.add_constraint(c).unwrap();

    let mut c = Constraint::new(0, "line", 1.0, f64::INFINITY);
    c.linear_terms.push(LinearTerm::new(1.0, x));
    c.linear_terms.push(LinearTerm::new(1.0, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    obj.linear_terms.push(LinearTerm::new(2.0, y));
    p.set_objective(obj);
    p.finalize().unwrap();
    p
}

#[test]
fn test_bound_monotonicity_across_iterations() {
    let report = Solver::new(convex_minlp(), Settings::default())
        .unwrap()
        .solve()
        .unwrap();
    assert!(report.status == ResultStatus::Optimal || report.status == ResultStatus::Feasible);

    let slack = 1e-9;
    for pair in report.iteration_statistics.windows(2) {
        // Minimization: the dual bound never drops, the primal never rises.
        assert!(
            pair[1].dual_bound >= pair[0].dual_bound - slack,
            "dual bound regressed: {} -> {}",
            pair[0].dual_bound,
            pair[1].dual_bound
        );
        if pair[0].primal_bound.is_finite() {
            assert!(
                pair[1].primal_bound <= pair[0].primal_bound + slack,
                "primal bound regressed: {} -> {}",
                pair[0].primal_bound,
                pair[1].primal_bound
            );
        }
    }

    // At termination the bounds bracket the optimum.
    assert!(report.dual_bound <= report.primal_bound + 1e-6);
}

#[test]
fn test_primal_solution_feasible_in_original_problem() {
    let problem = convex_minlp();
    let check = problem.clone();
    let report = Solver::new(problem, Settings::default())
        .unwrap()
        .solve()
        .unwrap();

    let sol = report.solution.expect("a solution should be found");
    assert!(check.are_variable_bounds_fulfilled(&sol, 1e-6));
    assert!(check.are_linear_constraints_fulfilled(&sol, 1e-6));
    assert!(check.are_quadratic_constraints_fulfilled(&sol, 1e-5));
    assert!(check.are_integrality_constraints_fulfilled(&sol, 1e-5));
}

#[test]
fn test_generated_hyperplanes_are_valid_cuts() {
    // ESH hyperplanes must not cut any truly feasible point.
    let mut p = Problem::new("valid");
    let x = p.add_variable("x", VariableType::Real, -3.0, 3.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, -3.0, 3.0).unwrap();
    let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 2.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
    p.add_constraint(c).unwrap();
    p.finalize().unwrap();

    let mut dual = DualState::default();
    dual.interior_points.push(InteriorPoint {
        point: vec![0.0, 0.0],
        max_constraint_value: -1.0,
    });

    let params = SelectionParameters {
        constraint_selection_factor: 1.0,
        max_constraint_factor: 0.0,
        max_per_iteration: 50,
        rootsearch_constraint_tolerance: 1e-10,
        unique_constraints: false,
        rootsearch: RootsearchOptions::default(),
    };

    // Several exterior points around the disc.
    let exterior = [
        [3.0, 0.0],
        [2.0, 2.0],
        [-2.5, 1.0],
        [0.5, -2.8],
        [-1.7, -1.7],
    ];
    let points: Vec<SolutionPoint> = exterior
        .iter()
        .enumerate()
        .map(|(i, pt)| SolutionPoint {
            point: pt.to_vec(),
            objective_value: 0.0,
            iteration_found: i,
            max_deviation_index: Some(0),
            max_deviation: 1.0,
            is_relaxed: false,
        })
        .collect();

    let added = select_hyperplane_points_esh(&p, &mut dual, &points, &params, 1, true);
    assert!(added >= exterior.len() - 1);

    // Sample the disc of radius sqrt(2) and verify every cut.
    let constraint = p.constraint(0);
    for hp in &dual.hyperplane_waiting_list {
        let (coefs, rhs) = constraint
            .linearization_at(&hp.generated_point)
            .expect("finite linearization");
        for i in 0..40 {
            let angle = i as f64 * 0.157;
            let radius = (i % 5) as f64 / 5.0 * 2.0_f64.sqrt();
            let pt = [radius * angle.cos(), radius * angle.sin()];
            if constraint.is_fulfilled(&pt, 0.0) {
                let lhs: f64 = coefs.iter().map(|(&v, &cf)| cf * pt[v]).sum();
                assert!(
                    lhs <= rhs + 1e-6,
                    "hyperplane at {:?} cuts feasible point {:?}",
                    hp.generated_point,
                    pt
                );
            }
        }
    }
}

#[test]
fn test_cut_pipeline_deduplicates() {
    // Pushing the same selection twice adds each master row only once.
    let p = convex_minlp();
    let mut dual = DualState::default();

    let params = SelectionParameters {
        constraint_selection_factor: 1.0,
        max_constraint_factor: 0.0,
        max_per_iteration: 50,
        rootsearch_constraint_tolerance: 1e-10,
        unique_constraints: false,
        rootsearch: RootsearchOptions::default(),
    };
    let point = SolutionPoint {
        point: vec![2.0, 2.0],
        objective_value: 6.0,
        iteration_found: 1,
        max_deviation_index: Some(0),
        max_deviation: 1.0,
        is_relaxed: false,
    };

    use shale_oa::dual::selection::select_hyperplane_points_ecp;
    let first = select_hyperplane_points_ecp(&p, &mut dual, &[point.clone()], &params, 1, true);
    let second = select_hyperplane_points_ecp(&p, &mut dual, &[point], &params, 2, true);
    assert_eq!(first, 1);
    assert_eq!(second, 0);

    // Flush into a master and replay: the master's own fingerprinting also
    // rejects a byte-identical row.
    let mut master = BranchAndBoundMaster::new(MilpSettings::default());
    master.add_variable("x", VariableType::Integer, -2.0, 2.0);
    master.add_variable("y", VariableType::Real, -2.0, 2.0);
    master.finalize_problem().unwrap();

    let added = dual.flush_hyperplanes(&p, &mut master, 1);
    assert_eq!(added, 1);
    assert_eq!(master.num_cuts(), 1);

    let replay = master.add_linear_constraint(&[(0, 4.0), (1, 4.0)], 12.0, "dup");
    // Same row as the ECP cut at (2, 2): grad (4, 4), rhs 4*2+4*2-(8-4).
    assert!(replay.is_none());
    assert_eq!(master.num_cuts(), 1);
}
