//! Small helpers on `DMat3` that glam does not provide.
//!
//! Element access follows math convention: `entry(m, row, col)`,
//! even though glam stores matrices column-major.

use glam::{DMat3, DVec3};

/// Returns `m[row][col]`.
#[inline]
pub fn entry(m: &DMat3, row: usize, col: usize) -> f64 {
    m.col(col)[row]
}

/// Trace of a 3×3 matrix.
#[inline]
pub fn trace(m: &DMat3) -> f64 {
    m.x_axis.x + m.y_axis.y + m.z_axis.z
}

/// Frobenius inner product `A : B`.
#[inline]
pub fn ddot(a: &DMat3, b: &DMat3) -> f64 {
    a.x_axis.dot(b.x_axis) + a.y_axis.dot(b.y_axis) + a.z_axis.dot(b.z_axis)
}

/// Squared Frobenius norm.
#[inline]
pub fn frobenius_norm_sq(m: &DMat3) -> f64 {
    ddot(m, m)
}

/// Cross-product matrix `[v]×` so that `skew(v) * w == v.cross(w)`.
#[inline]
pub fn skew(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

/// Axial vector of the skew-symmetric part of `m`.
///
/// For a skew matrix this inverts [`skew`].
#[inline]
pub fn axial(m: &DMat3) -> DVec3 {
    0.5 * DVec3::new(
        entry(m, 2, 1) - entry(m, 1, 2),
        entry(m, 0, 2) - entry(m, 2, 0),
        entry(m, 1, 0) - entry(m, 0, 1),
    )
}

/// Outer product `a bᵗ`.
#[inline]
pub fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Converts to row-major nested arrays.
pub fn to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = entry(m, r, c);
        }
    }
    out
}

/// Builds a matrix from row-major nested arrays.
pub fn from_rows(rows: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(rows[0][0], rows[1][0], rows[2][0]),
        DVec3::new(rows[0][1], rows[1][1], rows[2][1]),
        DVec3::new(rows[0][2], rows[1][2], rows[2][2]),
    )
}
