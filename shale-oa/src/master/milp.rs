//! Reference master backend: branch and bound over the built-in simplex.
//!
//! Implements the full [`MasterSolver`](super::MasterSolver) contract,
//! including the solution pool, objective cut-off, solution limit,
//! infeasibility repair and single-tree callback hooks. Node selection is
//! best-bound first; branching is most-fractional.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::Instant;

use shale_core::{ObjectiveSense, VariableType};

use crate::error::{EngineError, OaResult};
use crate::lp::{self, LpLimits, LpProblem, LpRow, LpStatus};

use super::{
    LazyCutSink, MasterSolution, MasterStatus, MasterSolver, SharedCallback,
};

/// Tuning knobs of the reference backend.
#[derive(Debug, Clone)]
pub struct MilpSettings {
    /// Integrality tolerance.
    pub integer_tolerance: f64,
    /// Node budget per solve.
    pub node_limit: usize,
    /// Solution-pool capacity.
    pub pool_size: usize,
    /// Limits for each LP subsolve.
    pub lp_limits: LpLimits,
}

impl Default for MilpSettings {
    fn default() -> Self {
        Self {
            integer_tolerance: 1e-6,
            node_limit: 500_000,
            pool_size: 10,
            lp_limits: LpLimits::default(),
        }
    }
}

/// A B&B node: full bound vectors plus the parent relaxation bound.
#[derive(Debug, Clone)]
struct Node {
    lower: Vec<f64>,
    upper: Vec<f64>,
    bound: f64,
    depth: usize,
}

/// Heap entry ordered so the lowest bound pops first.
struct QueuedNode {
    node: Node,
}

impl PartialEq for QueuedNode {
    fn eq(&self, other: &Self) -> bool {
        self.node.bound == other.node.bound
    }
}

impl Eq for QueuedNode {}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: invert so the lowest bound has the highest priority.
        other
            .node
            .bound
            .partial_cmp(&self.node.bound)
            .unwrap_or(Ordering::Equal)
    }
}

/// Collects lazy cuts emitted by a callback invocation.
#[derive(Default)]
struct CollectedCuts {
    cuts: Vec<(Vec<(usize, f64)>, f64)>,
}

impl LazyCutSink for CollectedCuts {
    fn add_lazy_cut(&mut self, terms: &[(usize, f64)], rhs: f64) {
        self.cuts.push((terms.to_vec(), rhs));
    }
}

/// The reference branch-and-bound master.
pub struct BranchAndBoundMaster {
    settings: MilpSettings,

    lp: LpProblem,
    var_types: Vec<VariableType>,
    var_names: Vec<String>,
    num_base_rows: usize,
    finalized: bool,
    maximize: bool,

    // Assembly state.
    pending_row: Vec<(usize, f64)>,

    // Variable management.
    discrete_active: bool,
    saved_bounds: Option<Vec<(usize, f64, f64)>>,

    // Cut bookkeeping.
    cut_fingerprints: HashSet<u64>,
    integer_cut_rows: HashSet<usize>,

    // Controls.
    cutoff: Option<f64>,
    solution_limit: usize,
    time_limit: f64,
    heuristic_incumbent: Option<(Vec<f64>, f64)>,
    callback: Option<SharedCallback>,

    // Last-solve results.
    status: MasterStatus,
    pool: Vec<MasterSolution>,
    objective_value: f64,
    dual_bound: f64,
    open_nodes: usize,
    lazy_cuts: usize,
}

impl BranchAndBoundMaster {
    /// Create an empty backend.
    pub fn new(settings: MilpSettings) -> Self {
        Self {
            settings,
            lp: LpProblem::new(0),
            var_types: Vec::new(),
            var_names: Vec::new(),
            num_base_rows: 0,
            finalized: false,
            maximize: false,
            pending_row: Vec::new(),
            discrete_active: true,
            saved_bounds: None,
            cut_fingerprints: HashSet::new(),
            integer_cut_rows: HashSet::new(),
            cutoff: None,
            solution_limit: usize::MAX,
            time_limit: 300.0,
            heuristic_incumbent: None,
            callback: None,
            status: MasterStatus::Error,
            pool: Vec::new(),
            objective_value: f64::INFINITY,
            dual_bound: f64::NEG_INFINITY,
            open_nodes: 0,
            lazy_cuts: 0,
        }
    }

    fn discrete_columns(&self) -> Vec<usize> {
        if !self.discrete_active {
            return Vec::new();
        }
        self.var_types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_discrete())
            .map(|(i, _)| i)
            .collect()
    }

    fn lp_limits(&self) -> LpLimits {
        LpLimits {
            max_iterations: self.settings.lp_limits.max_iterations,
            time_limit: self.settings.lp_limits.time_limit.min(self.time_limit),
        }
    }

    fn fingerprint(terms: &[(usize, f64)], rhs: f64) -> u64 {
        let mut sorted: Vec<(usize, f64)> = terms.to_vec();
        sorted.sort_by_key(|&(v, _)| v);
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for (v, c) in &sorted {
            v.hash(&mut hasher);
            ((c / 1e-10).round() as i64).hash(&mut hasher);
        }
        ((rhs / 1e-10).round() as i64).hash(&mut hasher);
        hasher.finish()
    }

    fn internal_objective(&self, external: f64) -> f64 {
        if self.maximize {
            -external
        } else {
            external
        }
    }

    fn external_objective(&self, internal: f64) -> f64 {
        if self.maximize {
            -internal
        } else {
            internal
        }
    }

    /// Push a point into the bounded, best-first pool.
    fn pool_push(&mut self, point: Vec<f64>, objective: f64) {
        self.pool.push(MasterSolution { point, objective });
        self.pool.sort_by(|a, b| {
            a.objective
                .partial_cmp(&b.objective)
                .unwrap_or(Ordering::Equal)
        });
        self.pool.truncate(self.settings.pool_size);
    }

    /// Add collected lazy cuts; returns the worst violation at `point`.
    fn apply_lazy_cuts(&mut self, collected: CollectedCuts, point: &[f64]) -> f64 {
        let mut worst = 0.0_f64;
        for (terms, rhs) in collected.cuts {
            let activity: f64 = terms.iter().map(|&(v, c)| c * point[v]).sum();
            worst = worst.max(activity - rhs);
            if self.add_linear_constraint(&terms, rhs, "lazy").is_some() {
                self.lazy_cuts += 1;
            }
        }
        worst
    }

    /// True if `point` satisfies every row and integrality restriction.
    fn is_master_feasible(&self, point: &[f64], tol: f64) -> bool {
        if point.len() != self.lp.num_vars() {
            return false;
        }
        for (j, (&l, &u)) in self.lp.lower.iter().zip(self.lp.upper.iter()).enumerate() {
            if point[j] < l - tol || point[j] > u + tol {
                return false;
            }
        }
        for row in &self.lp.rows {
            let a = row.activity(point);
            if a > row.rhs + tol || a < row.lhs - tol {
                return false;
            }
        }
        for &c in &self.discrete_columns() {
            if (point[c] - point[c].round()).abs() > self.settings.integer_tolerance {
                return false;
            }
        }
        true
    }

    /// Continuous solve path (no active discrete variables).
    fn solve_relaxation(&mut self) -> MasterStatus {
        let sol = lp::solve(&self.lp, &self.lp_limits());
        match sol.status {
            LpStatus::Optimal => {
                self.objective_value = sol.objective;
                self.dual_bound = sol.objective;
                self.pool_push(sol.x, sol.objective);
                MasterStatus::Optimal
            }
            LpStatus::Infeasible => MasterStatus::Infeasible,
            LpStatus::Unbounded => MasterStatus::Unbounded,
            LpStatus::IterationLimit => MasterStatus::IterationLimit,
            LpStatus::TimeLimit => MasterStatus::TimeLimit,
            LpStatus::Error => MasterStatus::Error,
        }
    }

    /// Branch-and-bound solve path.
    fn solve_tree(&mut self, discrete: Vec<usize>) -> MasterStatus {
        let start = Instant::now();
        let int_tol = self.settings.integer_tolerance;

        let mut heap: BinaryHeap<QueuedNode> = BinaryHeap::new();
        heap.push(QueuedNode {
            node: Node {
                lower: self.lp.lower.clone(),
                upper: self.lp.upper.clone(),
                bound: f64::NEG_INFINITY,
                depth: 0,
            },
        });

        let mut incumbent: Option<Vec<f64>> = None;
        let mut incumbent_obj = f64::INFINITY;
        if let Some((point, obj)) = self.heuristic_incumbent.clone() {
            if self.is_master_feasible(&point, 1e-6) {
                incumbent_obj = obj;
                self.pool_push(point.clone(), obj);
                incumbent = Some(point);
            }
        }

        let mut nodes_processed = 0usize;
        let mut solutions_found = 0usize;
        let mut root_seen = false;
        let mut stop: Option<MasterStatus> = None;

        while let Some(QueuedNode { node }) = heap.pop() {
            if start.elapsed().as_secs_f64() > self.time_limit {
                heap.push(QueuedNode { node });
                stop = Some(MasterStatus::TimeLimit);
                break;
            }
            if nodes_processed >= self.settings.node_limit {
                heap.push(QueuedNode { node });
                stop = Some(MasterStatus::IterationLimit);
                break;
            }
            if node.bound >= incumbent_obj - 1e-9 {
                continue;
            }
            if let Some(cut) = self.cutoff {
                if node.bound >= cut {
                    continue;
                }
            }
            nodes_processed += 1;

            // Solve the node relaxation with the node's bounds swapped in.
            let saved = (
                std::mem::replace(&mut self.lp.lower, node.lower.clone()),
                std::mem::replace(&mut self.lp.upper, node.upper.clone()),
            );
            let sol = lp::solve(&self.lp, &self.lp_limits());
            self.lp.lower = saved.0;
            self.lp.upper = saved.1;

            match sol.status {
                LpStatus::Optimal => {}
                LpStatus::Infeasible => continue,
                LpStatus::Unbounded => {
                    if node.depth == 0 {
                        stop = Some(MasterStatus::Unbounded);
                        break;
                    }
                    continue;
                }
                _ => {
                    log::debug!("node LP returned {:?}, pruning node", sol.status);
                    continue;
                }
            }

            let obj = sol.objective;
            if obj >= incumbent_obj - 1e-9 {
                continue;
            }
            if let Some(cut) = self.cutoff {
                if obj >= cut {
                    continue;
                }
            }

            // Most-fractional branching candidate.
            let fractional = discrete
                .iter()
                .map(|&c| {
                    let v = sol.x[c];
                    let frac = (v - v.round()).abs();
                    (c, v, frac)
                })
                .filter(|&(_, _, f)| f > int_tol)
                .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal));

            match fractional {
                Some((col, value, _)) => {
                    // Relaxation hook, root node only.
                    if !root_seen {
                        root_seen = true;
                        if let Some(cb) = self.callback.clone() {
                            let mut collected = CollectedCuts::default();
                            if let Ok(mut hooks) = cb.lock() {
                                hooks.on_relaxation_node(
                                    &sol.x,
                                    self.external_objective(obj),
                                    &mut collected,
                                );
                            }
                            let violation = self.apply_lazy_cuts(collected, &sol.x);
                            if violation > 1e-9 {
                                // Cuts cut off this relaxation: re-solve it.
                                heap.push(QueuedNode { node });
                                continue;
                            }
                        }
                    }

                    let mut down = Node {
                        lower: node.lower.clone(),
                        upper: node.upper.clone(),
                        bound: obj,
                        depth: node.depth + 1,
                    };
                    down.upper[col] = value.floor();
                    let mut up = Node {
                        lower: node.lower,
                        upper: node.upper,
                        bound: obj,
                        depth: node.depth + 1,
                    };
                    up.lower[col] = value.ceil();

                    if down.lower[col] <= down.upper[col] + 1e-9 {
                        heap.push(QueuedNode { node: down });
                    }
                    if up.lower[col] <= up.upper[col] + 1e-9 {
                        heap.push(QueuedNode { node: up });
                    }
                }
                None => {
                    // Integer-feasible candidate.
                    let mut point = sol.x;
                    for &c in &discrete {
                        point[c] = point[c].round();
                    }

                    if let Some(cb) = self.callback.clone() {
                        let mut collected = CollectedCuts::default();
                        if let Ok(mut hooks) = cb.lock() {
                            hooks.on_candidate_incumbent(
                                &point,
                                self.external_objective(obj),
                                &mut collected,
                            );
                        }
                        let violation = self.apply_lazy_cuts(collected, &point);
                        if violation > 1e-7 {
                            // Rejected by lazy cuts: the subtree re-enters
                            // the queue with the new rows in place.
                            heap.push(QueuedNode { node });
                            continue;
                        }
                    }

                    solutions_found += 1;
                    self.pool_push(point.clone(), obj);
                    if obj < incumbent_obj {
                        incumbent_obj = obj;
                        incumbent = Some(point);
                    }
                    if solutions_found >= self.solution_limit {
                        stop = Some(MasterStatus::SolutionLimit);
                        break;
                    }
                }
            }
        }

        self.open_nodes = heap.len();
        let open_bound = heap
            .iter()
            .map(|q| q.node.bound)
            .fold(f64::INFINITY, f64::min);

        match stop {
            Some(MasterStatus::Unbounded) => MasterStatus::Unbounded,
            Some(reason) => {
                self.dual_bound = open_bound.min(incumbent_obj);
                self.objective_value = incumbent_obj;
                reason
            }
            None => {
                // Queue exhausted: proven optimal or proven infeasible
                // (a too-tight cut-off also lands here).
                if incumbent.is_some() {
                    self.dual_bound = incumbent_obj;
                    self.objective_value = incumbent_obj;
                    MasterStatus::Optimal
                } else {
                    MasterStatus::Infeasible
                }
            }
        }
    }
}

impl MasterSolver for BranchAndBoundMaster {
    fn add_variable(&mut self, name: &str, var_type: VariableType, lb: f64, ub: f64) -> usize {
        let idx = self.lp.add_variable(lb, ub);
        self.var_types.push(var_type);
        self.var_names.push(name.to_string());
        idx
    }

    fn initialize_objective(&mut self) {
        for c in self.lp.objective.iter_mut() {
            *c = 0.0;
        }
        self.lp.objective_constant = 0.0;
    }

    fn add_objective_linear_term(&mut self, coefficient: f64, variable: usize) {
        self.lp.objective[variable] += coefficient;
    }

    fn add_objective_quadratic_term(
        &mut self,
        _coefficient: f64,
        _first: usize,
        _second: usize,
    ) -> OaResult<()> {
        Err(EngineError::MasterSolver(
            "the branch-and-bound reference master has no QP support".into(),
        ))
    }

    fn finalize_objective(&mut self, sense: ObjectiveSense, constant: f64) {
        self.maximize = sense == ObjectiveSense::Maximize;
        self.lp.objective_constant = constant;
        if self.maximize {
            for c in self.lp.objective.iter_mut() {
                *c = -*c;
            }
            self.lp.objective_constant = -constant;
        }
    }

    fn initialize_constraint(&mut self) {
        self.pending_row.clear();
    }

    fn add_constraint_linear_term(&mut self, coefficient: f64, variable: usize) {
        self.pending_row.push((variable, coefficient));
    }

    fn finalize_constraint(&mut self, name: &str, lhs: f64, rhs: f64) {
        self.lp.rows.push(LpRow {
            name: name.to_string(),
            coefficients: std::mem::take(&mut self.pending_row),
            lhs,
            rhs,
        });
    }

    fn finalize_problem(&mut self) -> OaResult<()> {
        self.num_base_rows = self.lp.rows.len();
        self.finalized = true;
        Ok(())
    }

    fn activate_discrete_variables(&mut self, active: bool) {
        self.discrete_active = active;
    }

    fn fix_variables(&mut self, indices: &[usize], values: &[f64]) {
        let mut saved = Vec::with_capacity(indices.len());
        for (&i, &v) in indices.iter().zip(values.iter()) {
            saved.push((i, self.lp.lower[i], self.lp.upper[i]));
            self.lp.lower[i] = v;
            self.lp.upper[i] = v;
        }
        self.saved_bounds = Some(saved);
    }

    fn unfix_variables(&mut self) {
        if let Some(saved) = self.saved_bounds.take() {
            for (i, lb, ub) in saved {
                self.lp.lower[i] = lb;
                self.lp.upper[i] = ub;
            }
        }
    }

    fn update_variable_bound(&mut self, variable: usize, lb: f64, ub: f64) {
        self.lp.lower[variable] = lb;
        self.lp.upper[variable] = ub;
    }

    fn add_linear_constraint(
        &mut self,
        terms: &[(usize, f64)],
        rhs: f64,
        name: &str,
    ) -> Option<usize> {
        let fp = Self::fingerprint(terms, rhs);
        if !self.cut_fingerprints.insert(fp) {
            log::debug!("duplicate cut '{}' dropped", name);
            return None;
        }
        let index = self.lp.rows.len();
        self.lp.rows.push(LpRow::less_equal(name, terms.to_vec(), rhs));
        Some(index)
    }

    fn create_integer_cut(&mut self, ones: &[usize], zeroes: &[usize]) {
        // sum(ones) + sum(1 - zeroes) <= |ones| + |zeroes| - 1, i.e.
        // sum(ones) - sum(zeroes) <= |ones| - 1.
        let mut terms: Vec<(usize, f64)> = Vec::with_capacity(ones.len() + zeroes.len());
        for &i in ones {
            terms.push((i, 1.0));
        }
        for &i in zeroes {
            terms.push((i, -1.0));
        }
        let rhs = ones.len() as f64 - 1.0;
        let name = format!("intcut_{}", self.integer_cut_rows.len());
        if let Some(row) = self.add_linear_constraint(&terms, rhs, &name) {
            self.integer_cut_rows.insert(row);
        }
    }

    fn set_cutoff(&mut self, value: f64) {
        self.cutoff = Some(self.internal_objective(value));
    }

    fn set_solution_limit(&mut self, limit: usize) {
        self.solution_limit = limit.max(1);
    }

    fn solution_limit(&self) -> usize {
        self.solution_limit
    }

    fn set_time_limit(&mut self, seconds: f64) {
        self.time_limit = seconds.max(0.0);
    }

    fn post_heuristic_solution(&mut self, point: &[f64], objective: f64) {
        let internal = self.internal_objective(objective);
        match &self.heuristic_incumbent {
            Some((_, existing)) if *existing <= internal => {}
            _ => self.heuristic_incumbent = Some((point.to_vec(), internal)),
        }
    }

    fn register_callback(&mut self, callback: SharedCallback) {
        self.callback = Some(callback);
    }

    fn solve(&mut self) -> MasterStatus {
        self.pool.clear();
        self.open_nodes = 0;
        self.lazy_cuts = 0;
        self.objective_value = f64::INFINITY;
        self.dual_bound = f64::NEG_INFINITY;

        let discrete = self.discrete_columns();
        self.status = if discrete.is_empty() {
            self.solve_relaxation()
        } else {
            self.solve_tree(discrete)
        };
        self.status
    }

    fn objective_value(&self) -> f64 {
        self.external_objective(self.objective_value)
    }

    fn solution_pool(&self) -> Vec<MasterSolution> {
        self.pool
            .iter()
            .map(|s| MasterSolution {
                point: s.point.clone(),
                objective: self.external_objective(s.objective),
            })
            .collect()
    }

    fn dual_bound(&self) -> f64 {
        self.external_objective(self.dual_bound)
    }

    fn repair_infeasibility(&mut self) -> bool {
        let n = self.lp.num_vars();
        let mut repair = self.lp.clone();
        repair.objective = vec![0.0; n];
        repair.objective_constant = 0.0;

        // Elastic variables on cut rows only; base structure and integer
        // cuts stay hard.
        let mut elastic: Vec<(usize, usize)> = Vec::new();
        for r in self.num_base_rows..repair.rows.len() {
            if self.integer_cut_rows.contains(&r) {
                continue;
            }
            let s = repair.add_variable(0.0, f64::INFINITY);
            repair.objective[s] = 1.0;
            repair.rows[r].coefficients.push((s, -1.0));
            elastic.push((r, s));
        }
        if elastic.is_empty() {
            return false;
        }

        let sol = lp::solve(&repair, &self.lp_limits());
        if sol.status != LpStatus::Optimal {
            return false;
        }
        let mut relaxed = 0;
        for (r, s) in elastic {
            let v = sol.x[s];
            if v > 1e-9 {
                self.lp.rows[r].rhs += v * 1.001 + 1e-8;
                relaxed += 1;
            }
        }
        log::debug!("infeasibility repair relaxed {} cut rows", relaxed);
        true
    }

    fn num_variables(&self) -> usize {
        self.lp.num_vars()
    }

    fn num_cuts(&self) -> usize {
        self.lp.rows.len() - self.num_base_rows
    }

    fn open_nodes(&self) -> usize {
        self.open_nodes
    }

    fn lazy_cuts_added(&self) -> usize {
        self.lazy_cuts
    }

    fn is_discrete_active(&self) -> bool {
        self.discrete_active && self.var_types.iter().any(|t| t.is_discrete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min x + y s.t. x + y >= 1, x binary, y in [0, 10].
    fn simple_milp() -> BranchAndBoundMaster {
        let mut m = BranchAndBoundMaster::new(MilpSettings::default());
        m.add_variable("x", VariableType::Binary, 0.0, 1.0);
        m.add_variable("y", VariableType::Real, 0.0, 10.0);
        m.initialize_objective();
        m.add_objective_linear_term(1.0, 0);
        m.add_objective_linear_term(1.0, 1);
        m.finalize_objective(ObjectiveSense::Minimize, 0.0);
        m.initialize_constraint();
        m.add_constraint_linear_term(1.0, 0);
        m.add_constraint_linear_term(1.0, 1);
        m.finalize_constraint("c0", 1.0, f64::INFINITY);
        m.finalize_problem().unwrap();
        m
    }

    #[test]
    fn test_solve_simple_milp() {
        let mut m = simple_milp();
        let status = m.solve();
        assert_eq!(status, MasterStatus::Optimal);
        assert!((m.objective_value() - 1.0).abs() < 1e-6);
        assert!((m.dual_bound() - 1.0).abs() < 1e-6);
        assert!(!m.solution_pool().is_empty());
    }

    #[test]
    fn test_lp_relaxation_mode() {
        let mut m = simple_milp();
        m.activate_discrete_variables(false);
        let status = m.solve();
        assert_eq!(status, MasterStatus::Optimal);
        assert!((m.objective_value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pure_integer_optimum() {
        // min -x - y s.t. 2x + y <= 3, x, y integer in [0, 5].
        let mut m = BranchAndBoundMaster::new(MilpSettings::default());
        m.add_variable("x", VariableType::Integer, 0.0, 5.0);
        m.add_variable("y", VariableType::Integer, 0.0, 5.0);
        m.initialize_objective();
        m.add_objective_linear_term(-1.0, 0);
        m.add_objective_linear_term(-1.0, 1);
        m.finalize_objective(ObjectiveSense::Minimize, 0.0);
        m.initialize_constraint();
        m.add_constraint_linear_term(2.0, 0);
        m.add_constraint_linear_term(1.0, 1);
        m.finalize_constraint("c0", f64::NEG_INFINITY, 3.0);
        m.finalize_problem().unwrap();

        let status = m.solve();
        assert_eq!(status, MasterStatus::Optimal);
        // Best: x = 0, y = 3 -> -3.
        assert!((m.objective_value() + 3.0).abs() < 1e-6);
        let pool = m.solution_pool();
        let best = &pool[0];
        assert!((best.point[0] - best.point[0].round()).abs() < 1e-6);
    }

    #[test]
    fn test_integer_cut_excludes_pattern() {
        // max x0 + x1 over binaries; exclude (1, 1).
        let mut m = BranchAndBoundMaster::new(MilpSettings::default());
        m.add_variable("a", VariableType::Binary, 0.0, 1.0);
        m.add_variable("b", VariableType::Binary, 0.0, 1.0);
        m.initialize_objective();
        m.add_objective_linear_term(-1.0, 0);
        m.add_objective_linear_term(-1.0, 1);
        m.finalize_objective(ObjectiveSense::Minimize, 0.0);
        m.finalize_problem().unwrap();

        m.create_integer_cut(&[0, 1], &[]);
        let status = m.solve();
        assert_eq!(status, MasterStatus::Optimal);
        // (1,1) forbidden, optimum is 1.
        assert!((m.objective_value() + 1.0).abs() < 1e-6);
        let best = &m.solution_pool()[0];
        assert!(best.point[0] + best.point[1] <= 1.0 + 1e-6);
    }

    #[test]
    fn test_duplicate_cut_rejected() {
        let mut m = simple_milp();
        let first = m.add_linear_constraint(&[(0, 1.0), (1, 2.0)], 3.0, "cut");
        assert!(first.is_some());
        let dup = m.add_linear_constraint(&[(1, 2.0), (0, 1.0)], 3.0, "cut2");
        assert!(dup.is_none());
        assert_eq!(m.num_cuts(), 1);
    }

    #[test]
    fn test_cutoff_prunes_everything() {
        let mut m = simple_milp();
        m.set_cutoff(0.5); // optimum is 1.0: nothing survives
        let status = m.solve();
        assert_eq!(status, MasterStatus::Infeasible);
    }

    #[test]
    fn test_repair_restores_feasibility() {
        let mut m = simple_milp();
        // A contradictory cut: x + y <= 0.2 against the base row >= 1.
        m.add_linear_constraint(&[(0, 1.0), (1, 1.0)], 0.2, "bad");
        assert_eq!(m.solve(), MasterStatus::Infeasible);

        assert!(m.repair_infeasibility());
        let status = m.solve();
        assert_eq!(status, MasterStatus::Optimal);
    }

    #[test]
    fn test_fix_and_unfix() {
        let mut m = simple_milp();
        m.fix_variables(&[0], &[1.0]);
        m.solve();
        assert!((m.solution_pool()[0].point[0] - 1.0).abs() < 1e-9);
        m.unfix_variables();
        m.solve();
        assert!((m.objective_value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_heuristic_solution_used() {
        let mut m = simple_milp();
        m.post_heuristic_solution(&[1.0, 0.0], 1.0);
        let status = m.solve();
        assert_eq!(status, MasterStatus::Optimal);
        assert!((m.objective_value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_maximize_sense() {
        // max x over x in [0, 1] binary.
        let mut m = BranchAndBoundMaster::new(MilpSettings::default());
        m.add_variable("x", VariableType::Binary, 0.0, 1.0);
        m.initialize_objective();
        m.add_objective_linear_term(1.0, 0);
        m.finalize_objective(ObjectiveSense::Maximize, 0.0);
        m.finalize_problem().unwrap();

        assert_eq!(m.solve(), MasterStatus::Optimal);
        assert!((m.objective_value() - 1.0).abs() < 1e-6);
    }
}
