//! A self-contained LP solver: two-phase primal simplex on a dense tableau.
//!
//! The row set is assembled sparsely (`sprs` triplets) and expanded into a
//! dense `nalgebra` tableau for pivoting; problem sizes in the
//! outer-approximation loop are small, so the dense tableau with Bland's
//! rule is the robust choice over a factorized revised simplex.
//!
//! General bounds are handled by substitution: shifted for finite lower
//! bounds, mirrored for upper-bounded-only variables, split into a positive
//! pair for free variables. Upper caps become explicit rows.

use nalgebra::DMatrix;
use sprs::TriMat;

/// Outcome of an LP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    /// Optimal solution found.
    Optimal,
    /// No feasible point.
    Infeasible,
    /// Objective unbounded below.
    Unbounded,
    /// Simplex iteration cap reached.
    IterationLimit,
    /// Soft time budget exhausted.
    TimeLimit,
    /// Numerical failure.
    Error,
}

/// One row `lhs <= a.x <= rhs` of an LP.
#[derive(Debug, Clone)]
pub struct LpRow {
    /// Row name (for diagnostics).
    pub name: String,
    /// Sparse coefficients `(variable, value)`.
    pub coefficients: Vec<(usize, f64)>,
    /// Left bound (may be -inf).
    pub lhs: f64,
    /// Right bound (may be +inf).
    pub rhs: f64,
}

impl LpRow {
    /// A `a.x <= rhs` row.
    pub fn less_equal(name: impl Into<String>, coefficients: Vec<(usize, f64)>, rhs: f64) -> Self {
        Self {
            name: name.into(),
            coefficients,
            lhs: f64::NEG_INFINITY,
            rhs,
        }
    }

    /// Row activity at a point.
    pub fn activity(&self, x: &[f64]) -> f64 {
        self.coefficients.iter().map(|&(v, c)| c * x[v]).sum()
    }
}

/// An LP instance: `min c.x + c0  s.t.  rows, bounds`.
#[derive(Debug, Clone, Default)]
pub struct LpProblem {
    /// Objective coefficients (dense, one per variable).
    pub objective: Vec<f64>,
    /// Objective constant.
    pub objective_constant: f64,
    /// Lower bounds.
    pub lower: Vec<f64>,
    /// Upper bounds.
    pub upper: Vec<f64>,
    /// Constraint rows.
    pub rows: Vec<LpRow>,
}

impl LpProblem {
    /// Create an LP with `n` variables, zero objective and free bounds.
    pub fn new(num_vars: usize) -> Self {
        Self {
            objective: vec![0.0; num_vars],
            objective_constant: 0.0,
            lower: vec![f64::NEG_INFINITY; num_vars],
            upper: vec![f64::INFINITY; num_vars],
            rows: Vec::new(),
        }
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }

    /// Append a variable, returning its index.
    pub fn add_variable(&mut self, lb: f64, ub: f64) -> usize {
        self.objective.push(0.0);
        self.lower.push(lb);
        self.upper.push(ub);
        self.objective.len() - 1
    }
}

/// Solver limits.
#[derive(Debug, Clone)]
pub struct LpLimits {
    /// Simplex pivot cap.
    pub max_iterations: usize,
    /// Soft wall-clock budget in seconds.
    pub time_limit: f64,
}

impl Default for LpLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            time_limit: 60.0,
        }
    }
}

/// LP solution.
#[derive(Debug, Clone)]
pub struct LpSolution {
    /// Solve status.
    pub status: LpStatus,
    /// Primal point in the original variable space (empty unless solved).
    pub x: Vec<f64>,
    /// Objective value (includes the constant).
    pub objective: f64,
}

impl LpSolution {
    fn status_only(status: LpStatus) -> Self {
        Self {
            status,
            x: Vec::new(),
            objective: f64::INFINITY,
        }
    }
}

/// How an original variable maps into simplex columns.
#[derive(Debug, Clone, Copy)]
enum ColMap {
    /// `x = offset + y`, `y >= 0`.
    Shifted { col: usize, offset: f64 },
    /// `x = offset - y`, `y >= 0`.
    Mirrored { col: usize, offset: f64 },
    /// `x = y_pos - y_neg`, both `>= 0`.
    Split { pos: usize, neg: usize },
}

const PIVOT_TOL: f64 = 1e-9;
const FEAS_TOL: f64 = 1e-7;

/// Solve an LP by two-phase primal simplex.
pub fn solve(problem: &LpProblem, limits: &LpLimits) -> LpSolution {
    let n = problem.num_vars();
    let start = std::time::Instant::now();

    // Reject inconsistent bounds outright.
    for j in 0..n {
        if problem.lower[j] > problem.upper[j] + 1e-12 {
            return LpSolution::status_only(LpStatus::Infeasible);
        }
    }

    // Column substitution for bounds.
    let mut col_map = Vec::with_capacity(n);
    let mut num_cols = 0usize;
    for j in 0..n {
        let (l, u) = (problem.lower[j], problem.upper[j]);
        if l.is_finite() {
            col_map.push(ColMap::Shifted {
                col: num_cols,
                offset: l,
            });
            num_cols += 1;
        } else if u.is_finite() {
            col_map.push(ColMap::Mirrored {
                col: num_cols,
                offset: u,
            });
            num_cols += 1;
        } else {
            col_map.push(ColMap::Split {
                pos: num_cols,
                neg: num_cols + 1,
            });
            num_cols += 2;
        }
    }

    // Working rows: substituted coefficients, single-sided.
    // Each entry: (coefficients over y-columns as triplets, rhs, is_equality).
    struct WorkRow {
        coefs: Vec<(usize, f64)>,
        rhs: f64,
        equality: bool,
    }
    let mut work: Vec<WorkRow> = Vec::new();

    let mut substitute = |coefficients: &[(usize, f64)]| -> (Vec<(usize, f64)>, f64) {
        let mut out: Vec<(usize, f64)> = Vec::with_capacity(coefficients.len() + 1);
        let mut shift = 0.0;
        for &(var, coef) in coefficients {
            match col_map[var] {
                ColMap::Shifted { col, offset } => {
                    out.push((col, coef));
                    shift += coef * offset;
                }
                ColMap::Mirrored { col, offset } => {
                    out.push((col, -coef));
                    shift += coef * offset;
                }
                ColMap::Split { pos, neg } => {
                    out.push((pos, coef));
                    out.push((neg, -coef));
                }
            }
        }
        (out, shift)
    };

    for row in &problem.rows {
        let (coefs, shift) = substitute(&row.coefficients);
        if row.lhs == row.rhs && row.lhs.is_finite() {
            work.push(WorkRow {
                coefs,
                rhs: row.rhs - shift,
                equality: true,
            });
            continue;
        }
        if row.rhs.is_finite() {
            work.push(WorkRow {
                coefs: coefs.clone(),
                rhs: row.rhs - shift,
                equality: false,
            });
        }
        if row.lhs.is_finite() {
            let negated: Vec<(usize, f64)> = coefs.iter().map(|&(c, v)| (c, -v)).collect();
            work.push(WorkRow {
                coefs: negated,
                rhs: -(row.lhs - shift),
                equality: false,
            });
        }
    }

    // Upper caps for shifted variables with two finite bounds.
    for j in 0..n {
        if let ColMap::Shifted { col, offset } = col_map[j] {
            if problem.upper[j].is_finite() {
                work.push(WorkRow {
                    coefs: vec![(col, 1.0)],
                    rhs: problem.upper[j] - offset,
                    equality: false,
                });
            }
        }
    }

    let m = work.len();

    // Sign-normalize and assign slack/artificial columns.
    // Column layout: [structural | slack | artificial | rhs].
    let mut num_slack = 0usize;
    let mut num_art = 0usize;
    // Per row: (needs_slack_sign, needs_artificial).
    let mut row_kind = Vec::with_capacity(m);
    for r in work.iter_mut() {
        if r.rhs < 0.0 {
            for c in r.coefs.iter_mut() {
                c.1 = -c.1;
            }
            r.rhs = -r.rhs;
            if !r.equality {
                // `<=` flipped to `>=`: surplus plus artificial.
                row_kind.push((Some(-1.0), true));
                num_slack += 1;
                num_art += 1;
                continue;
            }
        } else if !r.equality {
            row_kind.push((Some(1.0), false));
            num_slack += 1;
            continue;
        }
        row_kind.push((None, true));
        num_art += 1;
    }

    let total_cols = num_cols + num_slack + num_art;
    let mut tableau = DMatrix::<f64>::zeros(m, total_cols + 1);
    let mut basis = vec![usize::MAX; m];

    // Assemble the structural block sparsely, then densify.
    let mut triplets = TriMat::new((m, num_cols));
    for (i, r) in work.iter().enumerate() {
        for &(c, v) in &r.coefs {
            triplets.add_triplet(i, c, v);
        }
    }
    let structural: sprs::CsMatI<f64, usize> = triplets.to_csr();
    for (value, (i, j)) in structural.iter() {
        tableau[(i, j)] += *value;
    }

    let mut slack_at = num_cols;
    let mut art_at = num_cols + num_slack;
    let first_artificial = num_cols + num_slack;
    for (i, (slack_sign, needs_art)) in row_kind.iter().enumerate() {
        if let Some(sign) = slack_sign {
            tableau[(i, slack_at)] = *sign;
            if *sign > 0.0 {
                basis[i] = slack_at;
            }
            slack_at += 1;
        }
        if *needs_art {
            tableau[(i, art_at)] = 1.0;
            basis[i] = art_at;
            art_at += 1;
        }
        tableau[(i, total_cols)] = work[i].rhs;
    }

    // Phase-2 cost vector over columns.
    let mut cost = vec![0.0; total_cols];
    let mut obj_shift = problem.objective_constant;
    for j in 0..n {
        let c = problem.objective[j];
        if c == 0.0 {
            continue;
        }
        match col_map[j] {
            ColMap::Shifted { col, offset } => {
                cost[col] += c;
                obj_shift += c * offset;
            }
            ColMap::Mirrored { col, offset } => {
                cost[col] -= c;
                obj_shift += c * offset;
            }
            ColMap::Split { pos, neg } => {
                cost[pos] += c;
                cost[neg] -= c;
            }
        }
    }

    // Phase 1: minimize the sum of artificials.
    if num_art > 0 {
        let phase1_cost: Vec<f64> = (0..total_cols)
            .map(|j| if j >= first_artificial { 1.0 } else { 0.0 })
            .collect();
        match run_simplex(
            &mut tableau,
            &mut basis,
            &phase1_cost,
            total_cols,
            limits,
            start,
            usize::MAX,
        ) {
            SimplexOutcome::Optimal => {}
            SimplexOutcome::Unbounded => return LpSolution::status_only(LpStatus::Error),
            SimplexOutcome::IterationLimit => {
                return LpSolution::status_only(LpStatus::IterationLimit)
            }
            SimplexOutcome::TimeLimit => return LpSolution::status_only(LpStatus::TimeLimit),
        }
        let phase1_obj: f64 = basis
            .iter()
            .enumerate()
            .filter(|(_, &b)| b >= first_artificial)
            .map(|(i, _)| tableau[(i, total_cols)])
            .sum();
        if phase1_obj > FEAS_TOL {
            return LpSolution::status_only(LpStatus::Infeasible);
        }

        // Drive leftover artificials out of the basis so they cannot regain
        // value in phase 2. Rows with no pivotable structural entry are
        // redundant and stay put at zero.
        for i in 0..m {
            if basis[i] < first_artificial {
                continue;
            }
            if let Some(enter) =
                (0..first_artificial).find(|&j| tableau[(i, j)].abs() > PIVOT_TOL)
            {
                let pivot = tableau[(i, enter)];
                for j in 0..=total_cols {
                    tableau[(i, j)] /= pivot;
                }
                for r in 0..m {
                    if r == i {
                        continue;
                    }
                    let factor = tableau[(r, enter)];
                    if factor.abs() > 1e-13 {
                        for j in 0..=total_cols {
                            tableau[(r, j)] -= factor * tableau[(i, j)];
                        }
                    }
                }
                basis[i] = enter;
            }
        }
    }

    // Phase 2: artificials barred from entering.
    match run_simplex(
        &mut tableau,
        &mut basis,
        &cost,
        total_cols,
        limits,
        start,
        first_artificial,
    ) {
        SimplexOutcome::Optimal => {}
        SimplexOutcome::Unbounded => return LpSolution::status_only(LpStatus::Unbounded),
        SimplexOutcome::IterationLimit => return LpSolution::status_only(LpStatus::IterationLimit),
        SimplexOutcome::TimeLimit => return LpSolution::status_only(LpStatus::TimeLimit),
    }

    // Extract the y vector, then map back to x.
    let mut y = vec![0.0; total_cols];
    for (i, &b) in basis.iter().enumerate() {
        if b != usize::MAX {
            y[b] = tableau[(i, total_cols)];
        }
    }
    let mut x = vec![0.0; n];
    for j in 0..n {
        x[j] = match col_map[j] {
            ColMap::Shifted { col, offset } => offset + y[col],
            ColMap::Mirrored { col, offset } => offset - y[col],
            ColMap::Split { pos, neg } => y[pos] - y[neg],
        };
    }
    let objective: f64 = obj_shift
        + (0..total_cols)
            .map(|j| cost[j] * y[j])
            .sum::<f64>();

    LpSolution {
        status: LpStatus::Optimal,
        x,
        objective,
    }
}

enum SimplexOutcome {
    Optimal,
    Unbounded,
    IterationLimit,
    TimeLimit,
}

/// Bland-rule primal simplex on a dense tableau with an assigned basis.
///
/// `barred_from` excludes columns at or past the index from entering
/// (used to keep artificials out in phase 2).
fn run_simplex(
    tableau: &mut DMatrix<f64>,
    basis: &mut [usize],
    cost: &[f64],
    total_cols: usize,
    limits: &LpLimits,
    start: std::time::Instant,
    barred_from: usize,
) -> SimplexOutcome {
    let m = basis.len();

    for iteration in 0..limits.max_iterations {
        if iteration % 128 == 0 && start.elapsed().as_secs_f64() > limits.time_limit {
            return SimplexOutcome::TimeLimit;
        }

        // Reduced costs: r_j = c_j - c_B^T B^-1 A_j (tableau is already
        // B^-1 A). Bland's rule: first negative index enters.
        let mut entering = None;
        for j in 0..total_cols.min(barred_from) {
            if basis.contains(&j) {
                continue;
            }
            let mut reduced = cost[j];
            for (i, &b) in basis.iter().enumerate() {
                if b != usize::MAX && cost[b] != 0.0 {
                    reduced -= cost[b] * tableau[(i, j)];
                }
            }
            if reduced < -PIVOT_TOL {
                entering = Some(j);
                break;
            }
        }
        let Some(enter) = entering else {
            return SimplexOutcome::Optimal;
        };

        // Ratio test; Bland tie-break on the smallest basis column.
        let mut leave: Option<(usize, f64)> = None;
        for i in 0..m {
            let a = tableau[(i, enter)];
            if a > PIVOT_TOL {
                let ratio = tableau[(i, total_cols)] / a;
                match leave {
                    None => leave = Some((i, ratio)),
                    Some((li, lr)) => {
                        if ratio < lr - 1e-12
                            || (ratio < lr + 1e-12 && basis[i] < basis[li])
                        {
                            leave = Some((i, ratio));
                        }
                    }
                }
            }
        }
        let Some((pivot_row, _)) = leave else {
            return SimplexOutcome::Unbounded;
        };

        // Pivot.
        let pivot = tableau[(pivot_row, enter)];
        for j in 0..=total_cols {
            tableau[(pivot_row, j)] /= pivot;
        }
        for i in 0..m {
            if i == pivot_row {
                continue;
            }
            let factor = tableau[(i, enter)];
            if factor.abs() > 1e-13 {
                for j in 0..=total_cols {
                    tableau[(i, j)] -= factor * tableau[(pivot_row, j)];
                }
            }
        }
        basis[pivot_row] = enter;
    }

    SimplexOutcome::IterationLimit
}
