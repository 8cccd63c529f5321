//! Matrix decompositions for constitutive models.
//!
//! Provides a symmetric 3×3 eigensolver, the rotation-variant SVD used by
//! the inversion-safe stress path, and polar decomposition (F = R·S) needed
//! by co-rotational FEM.

use glam::{DMat3, DVec3};

use crate::mat3::{from_rows, to_rows};

/// Sweeps of cyclic Jacobi rotations before giving up.
const MAX_JACOBI_SWEEPS: usize = 50;

/// Below this a singular vector is considered undefined.
const SINGULAR_EPS: f64 = 1.0e-12;

/// Eigen-decomposition of a symmetric 3×3 matrix.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricEigen {
    /// Eigenvalues, sorted in descending order.
    pub values: DVec3,
    /// Eigenvectors as columns, matching `values`.
    pub vectors: DMat3,
}

/// Singular value decomposition `F = U · diag(sigma) · Vᵗ`.
///
/// Both `u` and `v` are proper rotations. If `det F < 0` the smallest
/// singular value carries the negative sign.
#[derive(Debug, Clone, Copy)]
pub struct Svd3 {
    /// Left rotation.
    pub u: DMat3,
    /// Signed singular values, descending in magnitude except for the sign of the last.
    pub sigma: DVec3,
    /// Right rotation.
    pub v: DMat3,
}

impl Svd3 {
    /// Reassembles `U · diag(sigma) · Vᵗ`.
    pub fn reconstruct(&self) -> DMat3 {
        self.u * DMat3::from_diagonal(self.sigma) * self.v.transpose()
    }
}

/// Result of a 3×3 polar decomposition: F = R · S
#[derive(Debug, Clone, Copy)]
pub struct PolarDecomposition {
    /// Rotation part (det = +1).
    pub rotation: DMat3,
    /// Symmetric stretch part. Indefinite when the element is inverted.
    pub stretch: DMat3,
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Only the symmetric part of `m` is used.
pub fn symmetric_eigen(m: &DMat3) -> SymmetricEigen {
    let mut a = to_rows(m);
    for r in 0..3 {
        for c in (r + 1)..3 {
            let s = 0.5 * (a[r][c] + a[c][r]);
            a[r][c] = s;
            a[c][r] = s;
        }
    }
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, x| acc.max(x.abs()))
        .max(f64::MIN_POSITIVE);

    for _ in 0..MAX_JACOBI_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off <= (1.0e-30 * scale * scale) {
            break;
        }
        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            jacobi_rotate(&mut a, &mut v, p, q);
        }
    }

    // Sort descending.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| a[j][j].total_cmp(&a[i][i]));

    let values = DVec3::new(a[order[0]][order[0]], a[order[1]][order[1]], a[order[2]][order[2]]);
    let vectors = from_rows(&v);
    let vectors = DMat3::from_cols(
        vectors.col(order[0]),
        vectors.col(order[1]),
        vectors.col(order[2]),
    );

    SymmetricEigen { values, vectors }
}

fn jacobi_rotate(a: &mut [[f64; 3]; 3], v: &mut [[f64; 3]; 3], p: usize, q: usize) {
    let apq = a[p][q];
    if apq == 0.0 {
        return;
    }
    let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    let mut rot = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    rot[p][p] = c;
    rot[q][q] = c;
    rot[p][q] = s;
    rot[q][p] = -s;

    // A' = Pᵗ A P, V' = V P
    let ap = mul3(a, &rot);
    *a = mul3(&transpose3(&rot), &ap);
    a[p][q] = 0.0;
    a[q][p] = 0.0;
    *v = mul3(v, &rot);
}

fn mul3(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, val) in row.iter_mut().enumerate() {
            *val = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c];
        }
    }
    out
}

fn transpose3(a: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            out[r][c] = a[c][r];
        }
    }
    out
}

/// Rotation-variant SVD of a 3×3 matrix.
///
/// 1. Eigendecompose FᵗF to get V and σ²
/// 2. Flip a column of V if it is a reflection
/// 3. U columns from F·vᵢ (Gram-Schmidt), third column by cross product
/// 4. Signed σᵢ = uᵢ · F·vᵢ, so an inverted F gives σ₂ < 0
pub fn svd_rotation(f: &DMat3) -> Svd3 {
    let eig = symmetric_eigen(&(f.transpose() * *f));
    let mut v = eig.vectors;
    if v.determinant() < 0.0 {
        v.z_axis = -v.z_axis;
    }

    let fv0 = *f * v.x_axis;
    let fv1 = *f * v.y_axis;
    let fv2 = *f * v.z_axis;

    let u0 = if fv0.length() > SINGULAR_EPS {
        fv0.normalize()
    } else {
        DVec3::X
    };
    let w1 = fv1 - u0 * u0.dot(fv1);
    let u1 = if w1.length() > SINGULAR_EPS {
        w1.normalize()
    } else {
        u0.any_orthonormal_vector()
    };
    let u2 = u0.cross(u1);

    let u = DMat3::from_cols(u0, u1, u2);
    let sigma = DVec3::new(u0.dot(fv0), u1.dot(fv1), u2.dot(fv2));

    Svd3 { u, sigma, v }
}

/// Polar decomposition `F = R · S` with `R` a proper rotation.
///
/// Built from the rotation-variant SVD: `R = U Vᵗ`, `S = V Σ Vᵗ`.
pub fn polar_decomposition(f: &DMat3) -> PolarDecomposition {
    let svd = svd_rotation(f);
    PolarDecomposition {
        rotation: svd.u * svd.v.transpose(),
        stretch: svd.v * DMat3::from_diagonal(svd.sigma) * svd.v.transpose(),
    }
}

/// Compute the deformation gradient F for a tetrahedron.
///
/// F = Ds · Bm, where the columns of Ds are `x_i - x_3` for i = 0..3 and
/// `bm` is the inverse of the rest-state edge matrix.
pub fn deformation_gradient(x: &[DVec3; 4], bm: &DMat3) -> DMat3 {
    let ds = DMat3::from_cols(x[0] - x[3], x[1] - x[3], x[2] - x[3]);
    ds * *bm
}
