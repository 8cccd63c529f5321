//! Sparse matrix representation and solver interface.
//!
//! Provides a CSR (Compressed Sparse Row) matrix assembled from triplets,
//! the [`MatrixSink`] trait that entities append their contributions to,
//! and a trait for sparse direct solvers.

use serde::{Deserialize, Serialize};

use crate::dense::DenseMatrix;

/// A single `(row, col, value)` contribution. Duplicates are summed on assembly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub val: f64,
}

impl Triplet {
    #[inline]
    pub fn new(row: usize, col: usize, val: f64) -> Self {
        Self { row, col, val }
    }
}

/// Destination for matrix contributions.
///
/// Implemented by triplet lists (sparse assembly) and by [`DenseMatrix`]
/// (dense blocks), so element code is written once for both.
pub trait MatrixSink {
    /// Accumulates `val` into entry `(row, col)`.
    fn add(&mut self, row: usize, col: usize, val: f64);
}

impl MatrixSink for Vec<Triplet> {
    #[inline]
    fn add(&mut self, row: usize, col: usize, val: f64) {
        self.push(Triplet { row, col, val });
    }
}

impl MatrixSink for DenseMatrix {
    #[inline]
    fn add(&mut self, row: usize, col: usize, val: f64) {
        self[(row, col)] += val;
    }
}

/// Shifts every contribution by a fixed `(row, col)` offset.
pub struct OffsetSink<'a, S: MatrixSink + ?Sized> {
    sink: &'a mut S,
    row: usize,
    col: usize,
}

impl<'a, S: MatrixSink + ?Sized> OffsetSink<'a, S> {
    pub fn new(sink: &'a mut S, row: usize, col: usize) -> Self {
        Self { sink, row, col }
    }
}

impl<S: MatrixSink + ?Sized> MatrixSink for OffsetSink<'_, S> {
    #[inline]
    fn add(&mut self, row: usize, col: usize, val: f64) {
        self.sink.add(row + self.row, col + self.col, val);
    }
}

/// Compressed Sparse Row (CSR) matrix.
///
/// Stores a sparse matrix in row-major order. Column indices within a row
/// are sorted and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Row pointer array (length = rows + 1).
    /// `row_ptr[i]..row_ptr[i+1]` are the indices into `col_idx` and `values`
    /// for non-zeros in row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices of non-zero entries.
    pub col_idx: Vec<usize>,
    /// Non-zero values.
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Creates an empty CSR matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Identity matrix of size `n`.
    pub fn identity(n: usize) -> Self {
        Self::from_diagonal(&vec![1.0; n])
    }

    /// Square diagonal matrix.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let n = diag.len();
        Self {
            rows: n,
            cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: diag.to_vec(),
        }
    }

    /// Returns the number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Creates a CSR matrix from triplets.
    ///
    /// Duplicate entries are summed.
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[Triplet]) -> Self {
        // Count entries per row
        let mut row_counts = vec![0usize; rows];
        for t in triplets {
            debug_assert!(t.row < rows && t.col < cols, "triplet out of bounds");
            row_counts[t.row] += 1;
        }

        let mut row_start = vec![0usize; rows + 1];
        for i in 0..rows {
            row_start[i + 1] = row_start[i] + row_counts[i];
        }

        // Bucket by row — use row_start as write cursor
        let mut buckets: Vec<(usize, f64)> = vec![(0, 0.0); row_start[rows]];
        let mut cursor = row_start[..rows].to_vec();
        for t in triplets {
            buckets[cursor[t.row]] = (t.col, t.val);
            cursor[t.row] += 1;
        }

        // Sort each row by column and merge duplicates
        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_idx = Vec::with_capacity(buckets.len());
        let mut values = Vec::with_capacity(buckets.len());
        row_ptr.push(0);
        for i in 0..rows {
            let row = &mut buckets[row_start[i]..row_start[i + 1]];
            row.sort_unstable_by_key(|&(c, _)| c);
            let mut last: Option<usize> = None;
            for &(c, v) in row.iter() {
                if last == Some(c) {
                    if let Some(acc) = values.last_mut() {
                        *acc += v;
                    }
                } else {
                    col_idx.push(c);
                    values.push(v);
                    last = Some(c);
                }
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Converts back to a triplet list.
    pub fn to_triplets(&self) -> Vec<Triplet> {
        let mut out = Vec::with_capacity(self.nnz());
        for row in 0..self.rows {
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                out.push(Triplet::new(row, self.col_idx[idx], self.values[idx]));
            }
        }
        out
    }

    /// Entry at `(row, col)`, zero if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        match self.col_idx[range.clone()].binary_search(&col) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    /// Main diagonal (length `min(rows, cols)`).
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }

    /// Computes `y = A x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.rows];
        self.mul_vec_into(x, &mut y);
        y
    }

    /// Computes `y = A x` into a caller-owned buffer.
    pub fn mul_vec_into(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.cols);
        debug_assert_eq!(y.len(), self.rows);
        for (row, yi) in y.iter_mut().enumerate() {
            let mut acc = 0.0;
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                acc += self.values[idx] * x[self.col_idx[idx]];
            }
            *yi = acc;
        }
    }

    /// Computes `y = Aᵗ x` without forming the transpose.
    pub fn transpose_mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.rows);
        let mut y = vec![0.0; self.cols];
        for (row, &xi) in x.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                y[self.col_idx[idx]] += self.values[idx] * xi;
            }
        }
        y
    }

    /// Returns `Aᵗ`.
    pub fn transpose(&self) -> Self {
        let triplets: Vec<Triplet> = self
            .to_triplets()
            .into_iter()
            .map(|t| Triplet::new(t.col, t.row, t.val))
            .collect();
        Self::from_triplets(self.cols, self.rows, &triplets)
    }

    /// Sparse product `A B` (row-wise Gustavson accumulation).
    pub fn mul(&self, other: &CsrMatrix) -> Self {
        assert_eq!(self.cols, other.rows, "dimension mismatch in sparse product");
        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        let mut accum = vec![0.0f64; other.cols];
        let mut marker = vec![usize::MAX; other.cols];
        let mut touched: Vec<usize> = Vec::new();
        row_ptr.push(0);

        for row in 0..self.rows {
            touched.clear();
            for a_idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let k = self.col_idx[a_idx];
                let a = self.values[a_idx];
                for b_idx in other.row_ptr[k]..other.row_ptr[k + 1] {
                    let c = other.col_idx[b_idx];
                    if marker[c] != row {
                        marker[c] = row;
                        accum[c] = 0.0;
                        touched.push(c);
                    }
                    accum[c] += a * other.values[b_idx];
                }
            }
            touched.sort_unstable();
            for &c in &touched {
                col_idx.push(c);
                values.push(accum[c]);
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            rows: self.rows,
            cols: other.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Returns `A + alpha B`.
    pub fn add_scaled(&self, other: &CsrMatrix, alpha: f64) -> Self {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "dimension mismatch in sparse sum"
        );
        let mut triplets = self.to_triplets();
        triplets.extend(
            other
                .to_triplets()
                .into_iter()
                .map(|t| Triplet::new(t.row, t.col, alpha * t.val)),
        );
        Self::from_triplets(self.rows, self.cols, &triplets)
    }

    /// Returns `alpha A`.
    pub fn scale(&self, alpha: f64) -> Self {
        let mut out = self.clone();
        for v in &mut out.values {
            *v *= alpha;
        }
        out
    }

    /// Returns `0.5 (A + Aᵗ)`.
    pub fn symmetrize(&self) -> Self {
        self.add_scaled(&self.transpose(), 1.0).scale(0.5)
    }

    /// Keeps the listed rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for &r in rows {
            let range = self.row_ptr[r]..self.row_ptr[r + 1];
            col_idx.extend_from_slice(&self.col_idx[range.clone()]);
            values.extend_from_slice(&self.values[range]);
            row_ptr.push(col_idx.len());
        }
        Self {
            rows: rows.len(),
            cols: self.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Stacks `top` over `bottom`.
    pub fn vstack(top: &CsrMatrix, bottom: &CsrMatrix) -> Self {
        assert_eq!(top.cols, bottom.cols, "column mismatch in vstack");
        let mut out = top.clone();
        let base = out.col_idx.len();
        out.col_idx.extend_from_slice(&bottom.col_idx);
        out.values.extend_from_slice(&bottom.values);
        out.row_ptr
            .extend(bottom.row_ptr.iter().skip(1).map(|&p| p + base));
        out.rows += bottom.rows;
        out
    }

    /// Largest absolute asymmetry `|A_ij - A_ji|`.
    pub fn asymmetry(&self) -> f64 {
        let diff = self.add_scaled(&self.transpose(), -1.0);
        diff.values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }

    /// Converts to a dense matrix.
    pub fn to_dense(&self) -> DenseMatrix {
        let mut out = DenseMatrix::zeros(self.rows, self.cols);
        for t in self.to_triplets() {
            out[(t.row, t.col)] += t.val;
        }
        out
    }

    /// Converts a dense matrix, dropping entries with `|v| <= drop_tol`.
    pub fn from_dense(dense: &DenseMatrix, drop_tol: f64) -> Self {
        let mut triplets = Vec::new();
        for r in 0..dense.rows {
            for c in 0..dense.cols {
                let v = dense[(r, c)];
                if v.abs() > drop_tol {
                    triplets.push(Triplet::new(r, c, v));
                }
            }
        }
        Self::from_triplets(dense.rows, dense.cols, &triplets)
    }
}

/// Trait for sparse direct solvers.
///
/// The solver pre-factors the system matrix once and then solves
/// for multiple right-hand sides efficiently.
pub trait SparseSolver {
    /// Factorize the system matrix.
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String>;

    /// Solve `A x = b` using the pre-computed factorization.
    fn solve(&self, rhs: &[f64], solution: &mut [f64]) -> Result<(), String>;

    /// Returns true if the solver has been factorized.
    fn is_factorized(&self) -> bool;
}
