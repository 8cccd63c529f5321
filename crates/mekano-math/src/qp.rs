//! Convex quadratic programs and an active-set backend.
//!
//! ```text
//! minimize   ½ xᵗ H x + cᵗ x
//! subject to A_eq x  = b_eq
//!            A_in x ≤ b_in
//! ```
//!
//! Stationarity is `H x + c + A_eqᵗ λ + A_inᵗ μ = 0` with `μ ≥ 0`.

use serde::{Deserialize, Serialize};

use crate::faer_solver::{DenseFactorization, FaerDense};
use crate::sparse::{CsrMatrix, SparseSolver, Triplet};

/// A QP instance borrowing its data from the caller.
#[derive(Debug, Clone, Copy)]
pub struct QuadraticProgram<'a> {
    /// Hessian `H` (n × n, symmetric positive definite).
    pub hessian: &'a CsrMatrix,
    /// Linear term `c`.
    pub linear: &'a [f64],
    /// Equality rows `A_eq` and right-hand side `b_eq`.
    pub equality: Option<(&'a CsrMatrix, &'a [f64])>,
    /// Inequality rows `A_in` and right-hand side `b_in`.
    pub inequality: Option<(&'a CsrMatrix, &'a [f64])>,
}

/// Primal-dual solution of a QP.
#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution {
    /// Primal solution.
    pub x: Vec<f64>,
    /// Multipliers of the equality rows.
    pub equality_multipliers: Vec<f64>,
    /// Multipliers of the inequality rows (zero for inactive rows).
    pub inequality_multipliers: Vec<f64>,
    /// Inequality rows binding at the solution.
    pub active_set: Vec<usize>,
    /// Working-set iterations used.
    pub iterations: u32,
}

/// Settings for [`ActiveSetQp`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QpSettings {
    /// Maximum working-set changes.
    pub max_iterations: u32,
    /// Feasibility and multiplier-sign tolerance.
    pub tolerance: f64,
    /// Negative diagonal added to the multiplier block of the KKT matrix,
    /// relative to the largest Hessian diagonal entry. Must be positive so
    /// that duplicated or zero rows still give a nonsingular system.
    pub regularization: f64,
    /// Start from the previous solve's active set.
    pub warm_start: bool,
}

impl Default for QpSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1.0e-9,
            regularization: 1.0e-10,
            warm_start: true,
        }
    }
}

/// Pluggable QP solver.
pub trait QpBackend: Send {
    /// Solves the program.
    fn solve(&mut self, qp: &QuadraticProgram<'_>) -> Result<QpSolution, String>;

    /// Returns the backend's name.
    fn name(&self) -> &str;
}

/// Primal active-set method on the KKT system.
///
/// Each iteration solves the equality-constrained problem with the current
/// working set of inequalities, then either drops the row with the most
/// negative multiplier or adds the most violated row.
pub struct ActiveSetQp {
    settings: QpSettings,
    previous: Vec<usize>,
}

impl ActiveSetQp {
    pub fn new(settings: QpSettings) -> Self {
        Self {
            settings,
            previous: Vec::new(),
        }
    }

    fn solve_kkt(
        &self,
        qp: &QuadraticProgram<'_>,
        working: &[usize],
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>), String> {
        let n = qp.hessian.rows;
        let me = qp.equality.map_or(0, |(a, _)| a.rows);
        let mw = working.len();
        let dim = n + me + mw;

        let mut triplets: Vec<Triplet> = qp.hessian.to_triplets();
        let mut rhs: Vec<f64> = qp.linear.iter().map(|c| -c).collect();
        rhs.resize(dim, 0.0);

        if let Some((a_eq, b_eq)) = qp.equality {
            for t in a_eq.to_triplets() {
                triplets.push(Triplet::new(n + t.row, t.col, t.val));
                triplets.push(Triplet::new(t.col, n + t.row, t.val));
            }
            rhs[n..n + me].copy_from_slice(b_eq);
        }
        if let Some((a_in, b_in)) = qp.inequality {
            for (k, &row) in working.iter().enumerate() {
                let r = n + me + k;
                for idx in a_in.row_ptr[row]..a_in.row_ptr[row + 1] {
                    let c = a_in.col_idx[idx];
                    let v = a_in.values[idx];
                    triplets.push(Triplet::new(r, c, v));
                    triplets.push(Triplet::new(c, r, v));
                }
                rhs[r] = b_in[row];
            }
        }
        let scale = qp
            .hessian
            .diagonal()
            .iter()
            .fold(1.0_f64, |acc, d| acc.max(d.abs()));
        for i in n..dim {
            triplets.push(Triplet::new(i, i, -self.settings.regularization * scale));
        }

        let kkt = CsrMatrix::from_triplets(dim, dim, &triplets);
        let mut lu = FaerDense::new(DenseFactorization::Lu);
        lu.factorize(&kkt)?;
        let mut sol = vec![0.0; dim];
        lu.solve(&rhs, &mut sol)?;

        let mu = sol.split_off(n + me);
        let lambda = sol.split_off(n);
        Ok((sol, lambda, mu))
    }
}

impl Default for ActiveSetQp {
    fn default() -> Self {
        Self::new(QpSettings::default())
    }
}

impl QpBackend for ActiveSetQp {
    fn solve(&mut self, qp: &QuadraticProgram<'_>) -> Result<QpSolution, String> {
        let mi = qp.inequality.map_or(0, |(a, _)| a.rows);
        let tol = self.settings.tolerance;

        let mut working: Vec<usize> = if self.settings.warm_start {
            self.previous.iter().copied().filter(|&r| r < mi).collect()
        } else {
            Vec::new()
        };

        for iteration in 0..self.settings.max_iterations {
            let (x, lambda, mu_w) = self.solve_kkt(qp, &working)?;

            // Drop the most negative multiplier.
            let worst = mu_w
                .iter()
                .enumerate()
                .filter(|(_, &m)| m < -tol)
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| k);
            if let Some(k) = worst {
                working.remove(k);
                continue;
            }

            // Add the most violated inequality.
            let mut violated: Option<(usize, f64)> = None;
            if let Some((a_in, b_in)) = qp.inequality {
                let ax = a_in.mul_vec(&x);
                for (row, (axr, br)) in ax.iter().zip(b_in).enumerate() {
                    if working.contains(&row) {
                        continue;
                    }
                    let excess = axr - br;
                    if excess > tol * (1.0 + br.abs()) && violated.map_or(true, |(_, e)| excess > e) {
                        violated = Some((row, excess));
                    }
                }
            }
            if let Some((row, _)) = violated {
                working.push(row);
                continue;
            }

            check_feasible(qp, &x, &working, tol)?;

            let mut inequality_multipliers = vec![0.0; mi];
            for (&row, &m) in working.iter().zip(&mu_w) {
                inequality_multipliers[row] = m.max(0.0);
            }
            self.previous = working.clone();
            return Ok(QpSolution {
                x,
                equality_multipliers: lambda,
                inequality_multipliers,
                active_set: working,
                iterations: iteration + 1,
            });
        }

        self.previous.clear();
        Err(format!(
            "active-set QP did not converge within {} iterations",
            self.settings.max_iterations
        ))
    }

    fn name(&self) -> &str {
        "active_set"
    }
}

/// Rejects a stationary point that leaves an equality or working-set row
/// violated; the regularized KKT system still solves when the rows are
/// inconsistent, so this is where infeasibility surfaces.
fn check_feasible(
    qp: &QuadraticProgram<'_>,
    x: &[f64],
    working: &[usize],
    tol: f64,
) -> Result<(), String> {
    let feas_tol = |b: f64| FEASIBILITY_FLOOR.max(1.0e3 * tol) * (1.0 + b.abs());
    if let Some((a_eq, b_eq)) = qp.equality {
        let ax = a_eq.mul_vec(x);
        for (row, (axr, br)) in ax.iter().zip(b_eq).enumerate() {
            if (axr - br).abs() > feas_tol(*br) {
                return Err(format!(
                    "infeasible QP: equality row {row} residual {:.3e}",
                    axr - br
                ));
            }
        }
    }
    if let Some((a_in, b_in)) = qp.inequality {
        for &row in working {
            let axr: f64 = (a_in.row_ptr[row]..a_in.row_ptr[row + 1])
                .map(|idx| a_in.values[idx] * x[a_in.col_idx[idx]])
                .sum();
            if axr - b_in[row] > feas_tol(b_in[row]) {
                return Err(format!(
                    "infeasible QP: inequality row {row} violated by {:.3e}",
                    axr - b_in[row]
                ));
            }
        }
    }
    Ok(())
}

const FEASIBILITY_FLOOR: f64 = 1.0e-6;
