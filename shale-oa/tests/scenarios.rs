//! End-to-end solve scenarios.
//!
//! Each test builds a small MINLP/NLP through the builder API and checks
//! the solver's bounds, solution point and termination against known
//! optima.

use std::sync::Arc;

use shale_core::{
    Constraint, Expression, LinearTerm, Objective, ObjectiveSense, Problem, QuadraticTerm,
    VariableType,
};
use shale_oa::{ResultStatus, SettingValue, Settings, Solver, TerminationReason};

fn settings() -> Settings {
    Settings::default()
}

/// S1: min x^2 + y^2 s.t. x + y >= 2, x, y >= 0.
/// Optimum 2 at (1, 1).
#[test]
fn test_s1_sum_of_squares() {
    let mut p = Problem::new("s1");
    let x = p.add_variable("x", VariableType::Real, 0.0, 10.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, 0.0, 10.0).unwrap();

    let mut c = Constraint::new(0, "sum", 2.0, f64::INFINITY);
    c.linear_terms.push(LinearTerm::new(1.0, x));
    c.linear_terms.push(LinearTerm::new(1.0, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    obj.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    assert_eq!(report.status, ResultStatus::Optimal);
    assert!((report.primal_bound - 2.0).abs() < 1e-4);
    assert!((report.dual_bound - 2.0).abs() < 1e-4);
    let sol = report.solution.unwrap();
    assert!((sol[0] - 1.0).abs() < 1e-2);
    assert!((sol[1] - 1.0).abs() < 1e-2);
}

/// S2: min x s.t. x^2 <= 4, x >= -3. Optimum -2.
#[test]
fn test_s2_single_hyperplane() {
    let mut p = Problem::new("s2");
    let x = p.add_variable("x", VariableType::Real, -3.0, f64::INFINITY).unwrap();

    let mut c = Constraint::new(0, "sq", f64::NEG_INFINITY, 4.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    assert_eq!(report.status, ResultStatus::Optimal);
    assert!((report.primal_bound + 2.0).abs() < 1e-5);
    assert!((report.dual_bound + 2.0).abs() < 1e-5);
    assert!((report.solution.unwrap()[0] + 2.0).abs() < 1e-4);
}

/// S3: min x + y s.t. x^2 + y^2 <= 1, x + y >= 1. Optimum 1.
#[test]
fn test_s3_disc_segment() {
    let mut p = Problem::new("s3");
    let x = p.add_variable("x", VariableType::Real, -2.0, 2.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, -2.0, 2.0).unwrap();

    let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 1.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
    p.add_constraint(c).unwrap();

    let mut c = Constraint::new(0, "line", 1.0, f64::INFINITY);
    c.linear_terms.push(LinearTerm::new(1.0, x));
    c.linear_terms.push(LinearTerm::new(1.0, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    obj.linear_terms.push(LinearTerm::new(1.0, y));
    p.set_objective(obj);
    p.finalize().unwrap();

    let mut s = settings();
    s.set("Dual.HyperplaneCuts.UseIntegerCuts", SettingValue::Bool(false))
        .unwrap();
    let report = Solver::new(p, s).unwrap().solve().unwrap();

    assert_eq!(report.status, ResultStatus::Optimal);
    assert!((report.primal_bound - 1.0).abs() < 1e-4);
    assert!((report.dual_bound - 1.0).abs() < 1e-4);
}

/// S4: min -z s.t. z <= exp(x), x in {-1, 0, 1}. Optimum -e at x = 1.
#[test]
fn test_s4_discrete_exponential() {
    let mut p = Problem::new("s4");
    let x = p.add_variable("x", VariableType::Integer, -1.0, 1.0).unwrap();
    let z = p.add_variable("z", VariableType::Real, 0.0, 10.0).unwrap();

    // z - exp(x) <= 0
    let mut c = Constraint::new(0, "cap", f64::NEG_INFINITY, 0.0);
    c.linear_terms.push(LinearTerm::new(1.0, z));
    c.expression = Some(Arc::new(Expression::negate(Expression::exp(
        Expression::variable(x),
    ))));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(-1.0, z));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    let e = std::f64::consts::E;
    assert!(report.status == ResultStatus::Optimal || report.status == ResultStatus::Feasible);
    assert!((report.primal_bound + e).abs() < 1e-3);
    assert!((report.dual_bound + e).abs() < 1e-3);
    let sol = report.solution.unwrap();
    assert!((sol[0] - 1.0).abs() < 1e-6);
    assert!((sol[1] - e).abs() < 1e-3);
}

/// S5: min x + y s.t. x*y >= 4, x, y integer in [1, 10].
/// The optimum of the stated program is 4 at (2, 2); the reformulation
/// introduces a bilinear auxiliary with its McCormick envelope.
#[test]
fn test_s5_bilinear_integers() {
    let mut p = Problem::new("s5");
    let x = p.add_variable("x", VariableType::Integer, 1.0, 10.0).unwrap();
    let y = p.add_variable("y", VariableType::Integer, 1.0, 10.0).unwrap();

    let mut c = Constraint::new(0, "prod", 4.0, f64::INFINITY);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    obj.linear_terms.push(LinearTerm::new(1.0, y));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    assert!(report.status == ResultStatus::Optimal || report.status == ResultStatus::Feasible);
    assert!((report.primal_bound - 4.0).abs() < 1e-6);
    assert!(report.absolute_gap <= 1e-3);
    let sol = report.solution.unwrap();
    assert!(sol[0] * sol[1] >= 4.0 - 1e-6);
    assert!((sol[0] - 2.0).abs() < 1e-6);
    assert!((sol[1] - 2.0).abs() < 1e-6);
}

/// S6: min x s.t. x^2 <= -1. Infeasible; the primal pool stays empty.
#[test]
fn test_s6_infeasible() {
    let mut p = Problem::new("s6");
    let x = p.add_variable("x", VariableType::Real, -5.0, 5.0).unwrap();

    let mut c = Constraint::new(0, "impossible", f64::NEG_INFINITY, -1.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    assert_eq!(report.status, ResultStatus::Infeasible);
    assert_eq!(report.termination, Some(TerminationReason::InfeasibleProblem));
    assert!(report.solution.is_none());
}

/// A pure LP terminates after the first master solve.
#[test]
fn test_pure_milp_terminates_immediately() {
    let mut p = Problem::new("milp");
    let x = p.add_variable("x", VariableType::Binary, 0.0, 1.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, 0.0, 10.0).unwrap();

    let mut c = Constraint::new(0, "cover", 1.0, f64::INFINITY);
    c.linear_terms.push(LinearTerm::new(1.0, x));
    c.linear_terms.push(LinearTerm::new(1.0, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(2.0, x));
    obj.linear_terms.push(LinearTerm::new(1.0, y));
    p.set_objective(obj);
    p.finalize().unwrap();

    // Disable the relaxed pre-iterations so iteration 1 is the MIP.
    let mut s = settings();
    s.set("Dual.Relaxation.Use", SettingValue::Bool(false)).unwrap();
    let report = Solver::new(p, s).unwrap().solve().unwrap();

    assert_eq!(report.status, ResultStatus::Optimal);
    assert!((report.primal_bound - 1.0).abs() < 1e-6);
    assert_eq!(report.iteration_count, 1);
}

/// An empty-integer convex problem reduces to a single NLP call.
#[test]
fn test_continuous_problem_single_nlp_call() {
    let mut p = Problem::new("nlp-only");
    let x = p.add_variable("x", VariableType::Real, 0.0, 10.0).unwrap();

    // exp(x) <= 5
    let mut c = Constraint::new(0, "cap", f64::NEG_INFINITY, 5.0);
    c.expression = Some(Arc::new(Expression::exp(Expression::variable(x))));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Maximize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    assert_eq!(report.status, ResultStatus::Optimal);
    assert_eq!(report.iteration_count, 1);
    // max x s.t. exp(x) <= 5: x = ln 5.
    assert!((report.primal_bound - 5.0f64.ln()).abs() < 1e-4);
}

/// Maximization round-trips through the internal minimization.
#[test]
fn test_maximization_sense() {
    let mut p = Problem::new("max");
    let x = p.add_variable("x", VariableType::Integer, 0.0, 3.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, 0.0, 3.0).unwrap();

    // x^2 + y^2 <= 8
    let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 8.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Maximize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    obj.linear_terms.push(LinearTerm::new(1.0, y));
    p.set_objective(obj);
    p.finalize().unwrap();

    let report = Solver::new(p, settings()).unwrap().solve().unwrap();

    // Best: x = 2, y = 2 -> 4.
    assert!(report.status == ResultStatus::Optimal || report.status == ResultStatus::Feasible);
    assert!((report.primal_bound - 4.0).abs() < 1e-3);
    assert!(report.primal_bound <= report.dual_bound + 1e-6);
}

/// ECP mode solves the convex scenarios as well.
#[test]
fn test_ecp_strategy() {
    let mut p = Problem::new("ecp");
    let x = p.add_variable("x", VariableType::Integer, 0.0, 5.0).unwrap();
    let y = p.add_variable("y", VariableType::Real, 0.0, 5.0).unwrap();

    // x^2 + y^2 <= 5
    let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 5.0);
    c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
    c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
    p.add_constraint(c).unwrap();

    // x + y >= 2
    let mut c = Constraint::new(0, "line", 2.0, f64::INFINITY);
    c.linear_terms.push(LinearTerm::new(1.0, x));
    c.linear_terms.push(LinearTerm::new(1.0, y));
    p.add_constraint(c).unwrap();

    let mut obj = Objective::new(ObjectiveSense::Minimize);
    obj.linear_terms.push(LinearTerm::new(1.0, x));
    obj.linear_terms.push(LinearTerm::new(2.0, y));
    p.set_objective(obj);
    p.finalize().unwrap();

    let mut s = settings();
    s.set("Dual.CutStrategy", SettingValue::Text("ECP".into()))
        .unwrap();
    let report = Solver::new(p, s).unwrap().solve().unwrap();

    // Optimum: x = 2, y = 0 -> 2.
    assert_eq!(report.status, ResultStatus::Optimal);
    assert!((report.primal_bound - 2.0).abs() < 1e-4);
}

/// Single-tree and multi-tree agree on the optimum.
#[test]
fn test_single_tree_strategy() {
    let build = || {
        let mut p = Problem::new("st");
        let x = p.add_variable("x", VariableType::Integer, 0.0, 4.0).unwrap();
        let y = p.add_variable("y", VariableType::Real, 0.0, 4.0).unwrap();

        let mut c = Constraint::new(0, "ball", f64::NEG_INFINITY, 9.0);
        c.quadratic_terms.push(QuadraticTerm::new(1.0, x, x));
        c.quadratic_terms.push(QuadraticTerm::new(1.0, y, y));
        p.add_constraint(c).unwrap();

        let mut c = Constraint::new(0, "line", 3.0, f64::INFINITY);
        c.linear_terms.push(LinearTerm::new(1.0, x));
        c.linear_terms.push(LinearTerm::new(1.0, y));
        p.add_constraint(c).unwrap();

        let mut obj = Objective::new(ObjectiveSense::Minimize);
        obj.linear_terms.push(LinearTerm::new(1.0, x));
        obj.linear_terms.push(LinearTerm::new(1.5, y));
        p.set_objective(obj);
        p.finalize().unwrap();
        p
    };

    let multi = Solver::new(build(), settings()).unwrap().solve().unwrap();

    let mut s = settings();
    s.set("Dual.TreeStrategy", SettingValue::Text("SingleTree".into()))
        .unwrap();
    let single = Solver::new(build(), s).unwrap().solve().unwrap();

    assert!((multi.primal_bound - single.primal_bound).abs() < 1e-4);
    assert!(single.status == ResultStatus::Optimal || single.status == ResultStatus::Feasible);
}
