//! Krylov iterative solvers on [`CsrMatrix`].
//!
//! - [`conjugate_gradient`] — SPD systems (the unconstrained implicit step)
//! - [`minres`] — symmetric indefinite systems (KKT saddle points)
//! - [`bicgstab`] — general nonsymmetric systems
//!
//! Every solver starts from the caller's `x` (warm start), stops when the
//! relative residual `|b - Ax| / |b|` falls below the tolerance, and reports
//! an [`IterativeOutcome`] instead of failing, so the caller decides whether
//! non-convergence is a warning or an error.

use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, Side};
use serde::{Deserialize, Serialize};

use mekano_types::constants::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

use crate::dense::{axpy, dot, norm};
use crate::sparse::CsrMatrix;

/// Iteration cap and tolerance for one iterative method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterativeSettings {
    /// Maximum iterations.
    pub max_iterations: u32,
    /// Relative residual tolerance.
    pub tolerance: f64,
}

impl Default for IterativeSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl IterativeSettings {
    /// Loose settings for interactive use.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1.0e-6,
        }
    }

    /// Tight settings for validation runs.
    #[must_use]
    pub fn precise() -> Self {
        Self {
            max_iterations: 1_000_000,
            tolerance: 1.0e-12,
        }
    }
}

/// Diagnostics from an iterative solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterativeOutcome {
    /// Iterations performed.
    pub iterations: u32,
    /// Final relative residual (estimated for MINRES).
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

impl IterativeOutcome {
    fn trivial() -> Self {
        Self {
            iterations: 0,
            residual: 0.0,
            converged: true,
        }
    }
}

/// Approximate inverse applied as `z = M⁻¹ r`.
pub trait Preconditioner {
    /// Applies the preconditioner.
    fn apply(&self, r: &[f64], z: &mut [f64]);
}

/// No preconditioning.
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }
}

/// Diagonal (Jacobi) preconditioner `M = diag(|A|)`.
///
/// Zero diagonal entries (constraint rows of a KKT matrix) map to one,
/// which keeps the preconditioner SPD for MINRES.
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    pub fn new(a: &CsrMatrix) -> Self {
        let inv_diag = a
            .diagonal()
            .iter()
            .map(|&d| if d.abs() > f64::EPSILON { 1.0 / d.abs() } else { 1.0 })
            .collect();
        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, ri), di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
    }
}

const SCHUR_SHIFT: f64 = 1e-10;

/// Block-diagonal preconditioner for `[[A, Gᵗ], [G, 0]]`:
/// `diag(|A|)⁻¹ ⊕ (G diag(|A|)⁻¹ Gᵗ)⁻¹`.
pub struct SaddlePointPreconditioner {
    n: usize,
    inv_diag: Vec<f64>,
    schur: Llt<f64>,
}

impl SaddlePointPreconditioner {
    /// Builds the preconditioner from the `n × n` block `a` and the `m × n`
    /// constraint block `g`. The approximate Schur complement gets a small
    /// relative diagonal shift; fails if it is still not positive definite.
    pub fn new(a: &CsrMatrix, g: &CsrMatrix) -> Result<Self, String> {
        let n = a.rows;
        let inv_diag: Vec<f64> = a
            .diagonal()
            .iter()
            .map(|&d| if d.abs() > f64::EPSILON { 1.0 / d.abs() } else { 1.0 })
            .collect();

        let m = g.rows;
        let mut schur = Mat::<f64>::zeros(m, m);
        for i in 0..m {
            for j in i..m {
                let mut acc = 0.0;
                for ia in g.row_ptr[i]..g.row_ptr[i + 1] {
                    let c = g.col_idx[ia];
                    let gj = g.get(j, c);
                    if gj != 0.0 {
                        acc += g.values[ia] * inv_diag[c] * gj;
                    }
                }
                schur[(i, j)] = acc;
                schur[(j, i)] = acc;
            }
        }
        let shift = SCHUR_SHIFT * (0..m).fold(0.0_f64, |acc, i| acc.max(schur[(i, i)]));
        for i in 0..m {
            schur[(i, i)] += shift;
        }
        let schur = schur
            .as_ref()
            .llt(Side::Lower)
            .map_err(|e| format!("Schur block factorization failed: {e}"))?;
        Ok(Self { n, inv_diag, schur })
    }
}

impl Preconditioner for SaddlePointPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let (top, bottom) = r.split_at(self.n);
        for ((zi, ri), di) in z[..self.n].iter_mut().zip(top).zip(&self.inv_diag) {
            *zi = ri * di;
        }
        let rhs = Mat::from_fn(bottom.len(), 1, |i, _| bottom[i]);
        let lower = self.schur.solve(&rhs);
        for (i, zi) in z[self.n..].iter_mut().enumerate() {
            *zi = lower[(i, 0)];
        }
    }
}

fn residual(a: &CsrMatrix, b: &[f64], x: &[f64]) -> Vec<f64> {
    let mut r = a.mul_vec(x);
    for (ri, bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    r
}

/// Preconditioned conjugate gradient.
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    settings: &IterativeSettings,
    precond: &dyn Preconditioner,
) -> IterativeOutcome {
    let n = b.len();
    let b_norm = norm(b);
    if b_norm == 0.0 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return IterativeOutcome::trivial();
    }
    let threshold = settings.tolerance * b_norm;

    let mut r = residual(a, b, x);
    let mut r_norm = norm(&r);
    if r_norm <= threshold {
        return IterativeOutcome {
            iterations: 0,
            residual: r_norm / b_norm,
            converged: true,
        };
    }

    let mut z = vec![0.0; n];
    precond.apply(&r, &mut z);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    let mut ap = vec![0.0; n];

    let mut iterations = 0;
    while iterations < settings.max_iterations {
        iterations += 1;
        a.mul_vec_into(&p, &mut ap);
        let pap = dot(&p, &ap);
        if pap == 0.0 {
            break;
        }
        let alpha = rz / pap;
        axpy(alpha, &p, x);
        axpy(-alpha, &ap, &mut r);
        r_norm = norm(&r);
        if r_norm <= threshold {
            break;
        }
        precond.apply(&r, &mut z);
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;
        rz = rz_new;
        for (pi, zi) in p.iter_mut().zip(&z) {
            *pi = zi + beta * *pi;
        }
    }

    IterativeOutcome {
        iterations,
        residual: r_norm / b_norm,
        converged: r_norm <= threshold,
    }
}

/// Preconditioned MINRES (Paige-Saunders) for symmetric, possibly indefinite
/// systems. The preconditioner must be SPD.
pub fn minres(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    settings: &IterativeSettings,
    precond: &dyn Preconditioner,
) -> IterativeOutcome {
    let n = b.len();
    let b_norm2 = dot(b, b);
    if b_norm2 == 0.0 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return IterativeOutcome::trivial();
    }
    let threshold2 = settings.tolerance * settings.tolerance * b_norm2;

    // Lanczos vectors
    let mut v = vec![0.0; n];
    let mut v_new = residual(a, b, x);
    let mut residual2 = dot(&v_new, &v_new);
    if residual2 < threshold2 {
        return IterativeOutcome {
            iterations: 0,
            residual: (residual2 / b_norm2).sqrt(),
            converged: true,
        };
    }
    let mut w = vec![0.0; n];
    let mut w_new = vec![0.0; n];
    precond.apply(&v_new, &mut w_new);
    let mut beta_new = dot(&v_new, &w_new).max(0.0).sqrt();
    let beta_one = beta_new;

    // Givens rotations
    let (mut c, mut c_old, mut s, mut s_old) = (1.0f64, 1.0f64, 0.0f64, 0.0f64);
    let mut p_old = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut eta = 1.0;

    let mut iterations = 0;
    while iterations < settings.max_iterations {
        if beta_new == 0.0 {
            break;
        }
        let beta = beta_new;
        let v_old = std::mem::take(&mut v);
        v_new.iter_mut().for_each(|e| *e /= beta_new);
        w_new.iter_mut().for_each(|e| *e /= beta_new);
        v = v_new.clone();
        w.copy_from_slice(&w_new);

        a.mul_vec_into(&w, &mut v_new);
        axpy(-beta, &v_old, &mut v_new);
        let alpha = dot(&v_new, &w);
        axpy(-alpha, &v, &mut v_new);
        precond.apply(&v_new, &mut w_new);
        beta_new = dot(&v_new, &w_new).max(0.0).sqrt();

        let r2 = s * alpha + c * c_old * beta;
        let r3 = s_old * beta;
        let r1_hat = c * alpha - c_old * s * beta;
        let r1 = (r1_hat * r1_hat + beta_new * beta_new).sqrt();
        c_old = c;
        s_old = s;
        c = r1_hat / r1;
        s = beta_new / r1;

        let p_oldold = std::mem::replace(&mut p_old, p.clone());
        for i in 0..n {
            p[i] = (w[i] - r2 * p_old[i] - r3 * p_oldold[i]) / r1;
        }
        axpy(beta_one * c * eta, &p, x);

        residual2 *= s * s;
        iterations += 1;
        if residual2 < threshold2 {
            break;
        }
        eta = -s * eta;
    }

    IterativeOutcome {
        iterations,
        residual: (residual2 / b_norm2).sqrt(),
        converged: residual2 < threshold2,
    }
}

/// Preconditioned BiCGSTAB for general square systems.
pub fn bicgstab(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    settings: &IterativeSettings,
    precond: &dyn Preconditioner,
) -> IterativeOutcome {
    let n = b.len();
    let b_norm = norm(b);
    if b_norm == 0.0 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return IterativeOutcome::trivial();
    }
    let threshold = settings.tolerance * b_norm;

    let mut r = residual(a, b, x);
    let mut r0 = r.clone();
    let mut r0_sqnorm = dot(&r0, &r0);
    let mut r_norm = r0_sqnorm.sqrt();
    if r_norm <= threshold {
        return IterativeOutcome {
            iterations: 0,
            residual: r_norm / b_norm,
            converged: true,
        };
    }

    let (mut rho, mut alpha, mut omega) = (1.0f64, 1.0f64, 1.0f64);
    let mut v = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut y = vec![0.0; n];
    let mut z = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut t = vec![0.0; n];
    let eps2 = f64::EPSILON * f64::EPSILON;

    let mut iterations = 0;
    while iterations < settings.max_iterations {
        let rho_old = rho;
        rho = dot(&r0, &r);
        if rho.abs() < eps2 * r0_sqnorm {
            // r0 became orthogonal to r: restart with the current residual
            r = residual(a, b, x);
            r0.copy_from_slice(&r);
            r0_sqnorm = dot(&r, &r);
            rho = r0_sqnorm;
            v.iter_mut().for_each(|e| *e = 0.0);
            p.iter_mut().for_each(|e| *e = 0.0);
            alpha = 1.0;
            omega = 1.0;
            if r0_sqnorm == 0.0 {
                break;
            }
        }
        let beta = (rho / rho_old) * (alpha / omega);
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }

        precond.apply(&p, &mut y);
        a.mul_vec_into(&y, &mut v);
        let r0v = dot(&r0, &v);
        if r0v == 0.0 {
            break;
        }
        alpha = rho / r0v;
        for i in 0..n {
            s[i] = r[i] - alpha * v[i];
        }

        precond.apply(&s, &mut z);
        a.mul_vec_into(&z, &mut t);
        let tt = dot(&t, &t);
        omega = if tt > 0.0 { dot(&t, &s) / tt } else { 0.0 };

        axpy(alpha, &y, x);
        axpy(omega, &z, x);
        for i in 0..n {
            r[i] = s[i] - omega * t[i];
        }
        iterations += 1;
        r_norm = norm(&r);
        if r_norm <= threshold || omega == 0.0 {
            break;
        }
    }

    IterativeOutcome {
        iterations,
        residual: r_norm / b_norm,
        converged: r_norm <= threshold,
    }
}
