//! Rigid-body (SE(3)) algebra.
//!
//! Twists are stored angular-first: `φ = [ω; v]`, both expressed in the
//! body frame. Transforms are `DMat4` with a rotation block and a
//! translation column.

use std::ops::{Add, Mul};

use glam::{DMat3, DMat4, DQuat, DVec3};

use crate::mat3::{entry, skew};

/// Spatial vector `[angular; linear]`.
pub type Vec6 = [f64; 6];

/// Dense 6×6 matrix, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat6(pub [[f64; 6]; 6]);

impl Mat6 {
    /// All zeros.
    pub const ZERO: Self = Self([[0.0; 6]; 6]);

    /// Identity.
    pub fn identity() -> Self {
        let mut m = Self::ZERO;
        for i in 0..6 {
            m.0[i][i] = 1.0;
        }
        m
    }

    /// Builds `[[a, b], [c, d]]` from four 3×3 blocks.
    pub fn from_blocks(a: &DMat3, b: &DMat3, c: &DMat3, d: &DMat3) -> Self {
        let mut m = Self::ZERO;
        for r in 0..3 {
            for col in 0..3 {
                m.0[r][col] = entry(a, r, col);
                m.0[r][col + 3] = entry(b, r, col);
                m.0[r + 3][col] = entry(c, r, col);
                m.0[r + 3][col + 3] = entry(d, r, col);
            }
        }
        m
    }

    /// Diagonal matrix.
    pub fn from_diagonal(d: &Vec6) -> Self {
        let mut m = Self::ZERO;
        for i in 0..6 {
            m.0[i][i] = d[i];
        }
        m
    }

    /// Entry at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row][col]
    }

    /// Transpose.
    pub fn transpose(&self) -> Self {
        let mut m = Self::ZERO;
        for r in 0..6 {
            for c in 0..6 {
                m.0[r][c] = self.0[c][r];
            }
        }
        m
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &Vec6) -> Vec6 {
        let mut out = [0.0; 6];
        for (r, o) in out.iter_mut().enumerate() {
            *o = (0..6).map(|c| self.0[r][c] * v[c]).sum();
        }
        out
    }

    /// Scales every entry.
    pub fn scale(&self, s: f64) -> Self {
        let mut m = *self;
        for row in m.0.iter_mut() {
            for v in row.iter_mut() {
                *v *= s;
            }
        }
        m
    }
}

impl Mul for Mat6 {
    type Output = Mat6;

    fn mul(self, rhs: Mat6) -> Mat6 {
        let mut m = Mat6::ZERO;
        for r in 0..6 {
            for c in 0..6 {
                m.0[r][c] = (0..6).map(|k| self.0[r][k] * rhs.0[k][c]).sum();
            }
        }
        m
    }
}

impl Add for Mat6 {
    type Output = Mat6;

    fn add(self, rhs: Mat6) -> Mat6 {
        let mut m = self;
        for r in 0..6 {
            for c in 0..6 {
                m.0[r][c] += rhs.0[r][c];
            }
        }
        m
    }
}

/// Splits a twist into `(angular, linear)`.
#[inline]
pub fn split(v: &Vec6) -> (DVec3, DVec3) {
    (DVec3::new(v[0], v[1], v[2]), DVec3::new(v[3], v[4], v[5]))
}

/// Joins `(angular, linear)` into a twist.
#[inline]
pub fn join(w: DVec3, v: DVec3) -> Vec6 {
    [w.x, w.y, w.z, v.x, v.y, v.z]
}

/// Rotation block of a rigid transform.
#[inline]
pub fn rotation(e: &DMat4) -> DMat3 {
    DMat3::from_mat4(*e)
}

/// Translation column of a rigid transform.
#[inline]
pub fn translation(e: &DMat4) -> DVec3 {
    e.w_axis.truncate()
}

/// Rigid transform from a rotation and a translation.
pub fn rigid_transform(r: &DMat3, p: DVec3) -> DMat4 {
    DMat4::from_cols(
        r.x_axis.extend(0.0),
        r.y_axis.extend(0.0),
        r.z_axis.extend(0.0),
        p.extend(1.0),
    )
}

/// Pure translation.
pub fn translation_transform(p: DVec3) -> DMat4 {
    rigid_transform(&DMat3::IDENTITY, p)
}

/// Inverse of a rigid transform without a general 4×4 inversion.
pub fn rigid_inverse(e: &DMat4) -> DMat4 {
    let rt = rotation(e).transpose();
    rigid_transform(&rt, -(rt * translation(e)))
}

/// Adjoint `Ad(E) = [[R, 0], [p̂R, R]]`, mapping twists from frame B to frame A
/// when `E` is the pose of B in A.
pub fn adjoint(e: &DMat4) -> Mat6 {
    let r = rotation(e);
    let pr = skew(translation(e)) * r;
    Mat6::from_blocks(&r, &DMat3::ZERO, &pr, &r)
}

/// Lie bracket operator `ad(φ) = [[ω̂, 0], [v̂, ω̂]]`.
pub fn ad(phi: &Vec6) -> Mat6 {
    let (w, v) = split(phi);
    let wh = skew(w);
    Mat6::from_blocks(&wh, &DMat3::ZERO, &skew(v), &wh)
}

/// Rotation matrix from exponential coordinates.
pub fn exp_rotation(r: DVec3) -> DMat3 {
    DMat3::from_quat(DQuat::from_scaled_axis(r))
}

/// Coefficients `a = (1-cosθ)/θ²`, `b = (θ-sinθ)/θ³` and their
/// derivatives divided by θ.
fn exp_coefficients(theta: f64) -> (f64, f64, f64, f64) {
    if theta < 1.0e-2 {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        (
            0.5 - t2 / 24.0 + t4 / 720.0,
            1.0 / 6.0 - t2 / 120.0 + t4 / 5040.0,
            -1.0 / 12.0 + t2 / 180.0,
            -1.0 / 60.0 + t2 / 1260.0,
        )
    } else {
        let (s, c) = theta.sin_cos();
        let t2 = theta * theta;
        let t3 = t2 * theta;
        let a = (1.0 - c) / t2;
        let b = (theta - s) / t3;
        let da = (theta * s - 2.0 * (1.0 - c)) / (t3 * theta);
        let db = ((1.0 - c) * theta - 3.0 * (theta - s)) / (t3 * t2);
        (a, b, da, db)
    }
}

/// Right Jacobian of SO(3) in exponential coordinates.
///
/// The body angular velocity of `exp(r̂)` is `J_r(r) ṙ`.
pub fn exp_right_jacobian(r: DVec3) -> DMat3 {
    let (a, b, _, _) = exp_coefficients(r.length());
    let rh = skew(r);
    DMat3::IDENTITY - rh * a + rh * rh * b
}

/// Time derivative of [`exp_right_jacobian`] along `ṙ`.
pub fn exp_right_jacobian_dot(r: DVec3, rdot: DVec3) -> DMat3 {
    let (a, b, da, db) = exp_coefficients(r.length());
    let rh = skew(r);
    let rdh = skew(rdot);
    let rrd = r.dot(rdot);
    rh * (-da * rrd) - rdh * a + rh * rh * (db * rrd) + (rdh * rh + rh * rdh) * b
}

/// Wraps exponential coordinates back into the ball of radius π.
///
/// Returns `None` when no reparametrization is needed.
pub fn exp_reparam(r: DVec3) -> Option<DVec3> {
    let theta = r.length();
    if theta > std::f64::consts::PI {
        Some(r * (1.0 - 2.0 * std::f64::consts::PI / theta))
    } else {
        None
    }
}
