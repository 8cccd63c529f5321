//! Direct solvers backed by `faer`.
//!
//! Implements the [`SparseSolver`] trait twice:
//! - [`FaerCholesky`] — supernodal LLᵗ for the SPD implicit system `MDK_r`
//! - [`FaerDense`] — dense LU / LDLᵀ / QR for KKT saddle-point systems,
//!   which stay small in reduced coordinates
//!
//! ## Workflow
//! 1. `factorize(matrix)` — computes and caches the factors
//! 2. `solve(rhs, solution)` — forward/backward substitution
//! 3. Repeat `solve()` with different RHS without re-factorizing

use faer::linalg::solvers::{Ldlt as DenseLdlt, PartialPivLu, Qr as DenseQr, Solve};
use faer::sparse::SparseColMat;
use faer::sparse::Triplet as FaerTriplet;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::{Mat, MatRef, Side};

use crate::sparse::{CsrMatrix, SparseSolver};

/// Convert our CSR matrix to faer's CSC matrix.
///
/// Builds from faer `Triplet`s, which faer assembles into CSC format.
fn csr_to_csc(matrix: &CsrMatrix) -> Result<SparseColMat<usize, f64>, String> {
    let mut triplets: Vec<FaerTriplet<usize, usize, f64>> = Vec::with_capacity(matrix.nnz());
    for row in 0..matrix.rows {
        for idx in matrix.row_ptr[row]..matrix.row_ptr[row + 1] {
            let col = matrix.col_idx[idx];
            let val = matrix.values[idx];
            triplets.push(FaerTriplet { row, col, val });
        }
    }

    SparseColMat::try_new_from_triplets(matrix.rows, matrix.cols, &triplets)
        .map_err(|e| format!("Failed to construct faer CSC matrix: {e:?}"))
}

fn check_square(matrix: &CsrMatrix) -> Result<(), String> {
    if matrix.rows != matrix.cols {
        return Err(format!(
            "Matrix must be square, got {}×{}",
            matrix.rows, matrix.cols
        ));
    }
    if matrix.rows == 0 {
        return Err("Cannot factorize empty matrix".into());
    }
    Ok(())
}

fn check_lengths(dimension: usize, rhs: &[f64], solution: &[f64]) -> Result<(), String> {
    if rhs.len() != dimension {
        return Err(format!(
            "RHS length ({}) != matrix dimension ({})",
            rhs.len(),
            dimension
        ));
    }
    if solution.len() != dimension {
        return Err(format!(
            "Solution length ({}) != matrix dimension ({})",
            solution.len(),
            dimension
        ));
    }
    Ok(())
}

/// Sparse Cholesky (LLᵗ) solver using `faer`.
///
/// Reads the upper triangle only, so a slightly asymmetric stiffness
/// contribution is implicitly symmetrized.
pub struct FaerCholesky {
    /// Cached LLᵗ factorization.
    factorization: Option<Llt<usize, f64>>,
    /// Matrix dimension (N×N).
    dimension: usize,
}

impl FaerCholesky {
    /// Creates a new solver (unfactorized).
    pub fn new() -> Self {
        Self {
            factorization: None,
            dimension: 0,
        }
    }
}

impl Default for FaerCholesky {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseSolver for FaerCholesky {
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String> {
        check_square(matrix)?;
        self.factorization = None;
        self.dimension = matrix.rows;

        let csc = csr_to_csc(matrix)?;

        // Step 1: Symbolic analysis (ordering, fill-in prediction)
        let symbolic = SymbolicLlt::try_new(csc.symbolic().as_ref(), Side::Upper)
            .map_err(|e| format!("Symbolic analysis failed: {e:?}"))?;

        // Step 2: Numeric factorization (fails if not positive definite)
        let llt = Llt::try_new_with_symbolic(symbolic, csc.as_ref(), Side::Upper)
            .map_err(|e| format!("Cholesky factorization failed: {e:?}"))?;

        self.factorization = Some(llt);
        Ok(())
    }

    fn solve(&self, rhs: &[f64], solution: &mut [f64]) -> Result<(), String> {
        let llt = self
            .factorization
            .as_ref()
            .ok_or_else(|| "Solver not factorized. Call factorize() first.".to_string())?;
        check_lengths(self.dimension, rhs, solution)?;

        let rhs_mat = Mat::from_fn(self.dimension, 1, |i, _| rhs[i]);
        let sol = llt.solve(&rhs_mat);
        for (i, s) in solution.iter_mut().enumerate() {
            *s = sol[(i, 0)];
        }
        Ok(())
    }

    fn is_factorized(&self) -> bool {
        self.factorization.is_some()
    }
}

/// Pivots below this fraction of the largest pivot count as zero.
const PIVOT_TOLERANCE: f64 = f64::EPSILON;

/// Dense factorization used by [`FaerDense`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenseFactorization {
    /// Partial-pivoting LU; any nonsingular matrix.
    Lu,
    /// Unpivoted LDLᵀ; symmetric quasi-definite matrices.
    Ldlt,
    /// Householder QR; any nonsingular matrix.
    Qr,
}

enum DenseFactors {
    Lu(PartialPivLu<f64>),
    Ldlt(DenseLdlt<f64>),
    Qr(DenseQr<f64>),
}

/// Dense direct solver using `faer`.
///
/// A pivot that is zero relative to the largest one is reported as an error
/// from `factorize`, never as a panic or a silent `NaN`.
pub struct FaerDense {
    kind: DenseFactorization,
    factors: Option<DenseFactors>,
    dimension: usize,
}

impl FaerDense {
    /// Creates a new solver (unfactorized).
    pub fn new(kind: DenseFactorization) -> Self {
        Self {
            kind,
            factors: None,
            dimension: 0,
        }
    }

    /// Factorization this solver computes.
    pub fn kind(&self) -> DenseFactorization {
        self.kind
    }

    /// Switches the factorization; drops any cached factors.
    pub fn set_kind(&mut self, kind: DenseFactorization) {
        if self.kind != kind {
            self.kind = kind;
            self.factors = None;
        }
    }

    /// Factorizes a dense `faer` matrix directly.
    pub fn factorize_dense(&mut self, a: MatRef<'_, f64>) -> Result<(), String> {
        if a.nrows() != a.ncols() {
            return Err(format!(
                "Matrix must be square, got {}×{}",
                a.nrows(),
                a.ncols()
            ));
        }
        if a.nrows() == 0 {
            return Err("Cannot factorize empty matrix".into());
        }
        self.factors = None;
        self.dimension = a.nrows();

        let factors = match self.kind {
            DenseFactorization::Lu => {
                let lu = a.partial_piv_lu();
                check_pivots("LU", |i| lu.U()[(i, i)], self.dimension)?;
                DenseFactors::Lu(lu)
            }
            DenseFactorization::Ldlt => {
                let ldlt = a
                    .ldlt(Side::Lower)
                    .map_err(|e| format!("LDLᵀ factorization failed: {e}"))?;
                let d = ldlt.D().column_vector();
                check_pivots("LDLᵀ", |i| d[i], self.dimension)?;
                DenseFactors::Ldlt(ldlt)
            }
            DenseFactorization::Qr => {
                let qr = a.qr();
                check_pivots("QR", |i| qr.R()[(i, i)], self.dimension)?;
                DenseFactors::Qr(qr)
            }
        };
        self.factors = Some(factors);
        Ok(())
    }
}

/// Rejects a factorization whose smallest pivot is negligible.
fn check_pivots(name: &str, pivot: impl Fn(usize) -> f64, n: usize) -> Result<(), String> {
    let mut largest = 0.0_f64;
    let mut smallest = (f64::INFINITY, 0);
    for i in 0..n {
        let p = pivot(i).abs();
        if !p.is_finite() {
            return Err(format!("{name} factorization produced a non-finite pivot at {i}"));
        }
        largest = largest.max(p);
        if p < smallest.0 {
            smallest = (p, i);
        }
    }
    if smallest.0 <= PIVOT_TOLERANCE * largest || largest == 0.0 {
        return Err(format!(
            "{name} factorization hit a zero pivot at {} (singular matrix)",
            smallest.1
        ));
    }
    Ok(())
}

impl SparseSolver for FaerDense {
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String> {
        check_square(matrix)?;
        let mut dense = Mat::<f64>::zeros(matrix.rows, matrix.cols);
        for row in 0..matrix.rows {
            for idx in matrix.row_ptr[row]..matrix.row_ptr[row + 1] {
                dense[(row, matrix.col_idx[idx])] += matrix.values[idx];
            }
        }
        self.factorize_dense(dense.as_ref())
    }

    fn solve(&self, rhs: &[f64], solution: &mut [f64]) -> Result<(), String> {
        let factors = self
            .factors
            .as_ref()
            .ok_or_else(|| "Solver not factorized. Call factorize() first.".to_string())?;
        check_lengths(self.dimension, rhs, solution)?;

        let rhs_mat = Mat::from_fn(self.dimension, 1, |i, _| rhs[i]);
        let sol = match factors {
            DenseFactors::Lu(f) => f.solve(&rhs_mat),
            DenseFactors::Ldlt(f) => f.solve(&rhs_mat),
            DenseFactors::Qr(f) => f.solve(&rhs_mat),
        };
        for (i, s) in solution.iter_mut().enumerate() {
            *s = sol[(i, 0)];
        }
        if solution.iter().any(|v| !v.is_finite()) {
            return Err("Dense solve produced non-finite values".into());
        }
        Ok(())
    }

    fn is_factorized(&self) -> bool {
        self.factors.is_some()
    }
}
