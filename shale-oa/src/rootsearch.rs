//! One-dimensional root search and minimization.
//!
//! Two primitives drive the dual and primal engines:
//!
//! - [`find_boundary`]: given a merit function negative at `a` and positive
//!   at `b`, locate the sign change. Used by ESH to find the point where a
//!   segment from an interior point crosses a constraint boundary.
//! - [`brent_minimize`]: derivative-free scalar minimization by parabolic
//!   interpolation with golden-section fallback. Used by the cutting-plane
//!   minimax interior-point solver's linesearch.

/// Options for the scalar searches.
#[derive(Debug, Clone)]
pub struct RootsearchOptions {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Interval-width termination tolerance.
    pub termination_tolerance: f64,
}

impl Default for RootsearchOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            termination_tolerance: 1e-10,
        }
    }
}

/// Result of a boundary search: the bracketing parameter pair with
/// `f(inside) <= 0 < f(outside)`.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryResult {
    /// Parameter on the feasible side of the boundary.
    pub inside: f64,
    /// Parameter on the infeasible side of the boundary.
    pub outside: f64,
    /// Merit value at `outside`.
    pub value_outside: f64,
    /// Iterations used.
    pub iterations: usize,
}

/// Bisection search for the sign change of `f` on `[a, b]`.
///
/// Requires `f(a) <= 0` and `f(b) > 0`; returns None if the bracket is
/// invalid. The returned pair brackets the boundary within the termination
/// tolerance (or the iteration cap).
pub fn find_boundary<F>(
    mut f: F,
    a: f64,
    b: f64,
    options: &RootsearchOptions,
) -> Option<BoundaryResult>
where
    F: FnMut(f64) -> f64,
{
    let fa = f(a);
    let fb = f(b);
    if !(fa <= 0.0 && fb > 0.0) || !(fa.is_finite() && fb.is_finite()) {
        return None;
    }

    let mut inside = a;
    let mut outside = b;
    let mut value_outside = fb;
    let mut iterations = 0;

    while iterations < options.max_iterations
        && (outside - inside).abs() > options.termination_tolerance
    {
        iterations += 1;
        let mid = 0.5 * (inside + outside);
        let fm = f(mid);
        if !fm.is_finite() {
            // Treat evaluation failures as infeasible side.
            outside = mid;
            value_outside = f64::INFINITY;
            continue;
        }
        if fm <= 0.0 {
            inside = mid;
        } else {
            outside = mid;
            value_outside = fm;
        }
    }

    Some(BoundaryResult {
        inside,
        outside,
        value_outside,
        iterations,
    })
}

/// Result of a scalar minimization.
#[derive(Debug, Clone, Copy)]
pub struct MinimizeResult {
    /// Argument of the minimum found.
    pub x: f64,
    /// Function value at the minimum.
    pub f_min: f64,
    /// Iterations used.
    pub iterations: usize,
}

/// Brent's method: parabolic interpolation with golden-section fallback.
///
/// `bit_precision` sets the x-tolerance to `(b - a) * 2^-bits`, the same
/// convention as Boost's `brent_find_minima` used by cutting-plane
/// interior-point codes.
pub fn brent_minimize<F>(
    mut f: F,
    a: f64,
    b: f64,
    bit_precision: u32,
    max_iterations: usize,
) -> MinimizeResult
where
    F: FnMut(f64) -> f64,
{
    const GOLDEN: f64 = 0.381_966_011_250_105; // (3 - sqrt(5)) / 2

    let tol = (b - a).abs() * (2.0_f64).powi(-(bit_precision as i32));
    let mut lo = a;
    let mut hi = b;

    let mut x = lo + GOLDEN * (hi - lo);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;

    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        let m = 0.5 * (lo + hi);
        let tol1 = tol * x.abs().max(1.0) + 1e-15;
        if (x - m).abs() <= 2.0 * tol1 - 0.5 * (hi - lo) {
            break;
        }

        let mut use_golden = true;
        if e.abs() > tol1 {
            // Fit a parabola through (v, fv), (w, fw), (x, fx).
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            let mut q2 = 2.0 * (q - r);
            if q2 > 0.0 {
                p = -p;
            }
            q2 = q2.abs();
            if p.abs() < (0.5 * q2 * e).abs() && p > q2 * (lo - x) && p < q2 * (hi - x) {
                e = d;
                d = p / q2;
                use_golden = false;
            }
        }
        if use_golden {
            e = if x < m { hi - x } else { lo - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);

        if fu <= fx {
            if u < x {
                hi = x;
            } else {
                lo = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                lo = u;
            } else {
                hi = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    MinimizeResult {
        x,
        f_min: fx,
        iterations,
    }
}
