//! Compressible neo-Hookean model.
//!
//! Energy: Ψ = μ/2 (I₁ - 3) - μ ln J + λ/2 (ln J)²
//!
//! Stress: P = μ(F - F⁻ᵗ) + λ ln J F⁻ᵗ

use mekano_math::mat3::trace;
use mekano_math::{DMat3, DVec3};

use crate::properties::LameParameters;
use crate::traits::ConstitutiveModel;

/// Compressible neo-Hookean model.
///
/// Undefined for `det F ≤ 0`; inverted elements must go through the
/// inversion-safe path, which evaluates [`diagonal_stress`] on clamped
/// singular values.
///
/// [`diagonal_stress`]: ConstitutiveModel::diagonal_stress
pub struct NeoHookeanModel;

impl NeoHookeanModel {
    /// Creates a new neo-Hookean model.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NeoHookeanModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstitutiveModel for NeoHookeanModel {
    fn pk_stress(&self, f: &DMat3, lame: LameParameters) -> DMat3 {
        let j = f.determinant();
        let f_inv_t = f.inverse().transpose();
        (*f - f_inv_t) * lame.mu + f_inv_t * (lame.lambda * j.ln())
    }

    fn pk_stress_derivative(&self, f: &DMat3, df: &DMat3, lame: LameParameters) -> DMat3 {
        let log_j = f.determinant().ln();
        let f_inv = f.inverse();
        let f_inv_t = f_inv.transpose();
        *df * lame.mu
            + f_inv_t * df.transpose() * f_inv_t * (lame.mu - lame.lambda * log_j)
            + f_inv_t * (lame.lambda * trace(&(f_inv * *df)))
    }

    fn energy_density(&self, f: &DMat3, lame: LameParameters) -> f64 {
        let i1 = trace(&(f.transpose() * *f));
        let log_j = f.determinant().ln();
        0.5 * lame.mu * (i1 - 3.0) - lame.mu * log_j + 0.5 * lame.lambda * log_j * log_j
    }

    /// Invariant form `P̂ = Mᵗ ∂Ψ/∂I` with invariants of `C = F̂²`:
    /// `I_C = Σσ²`, `II_C = Σσ⁴`, `III_C = Πσ²`.
    fn diagonal_stress(&self, fhat: DVec3, lame: LameParameters) -> DVec3 {
        let s = fhat;
        let s2 = s * s;
        let iii_c = s2.x * s2.y * s2.z;

        let d_psi = DVec3::new(
            0.5 * lame.mu,
            0.0,
            (-0.5 * lame.mu + 0.25 * lame.lambda * iii_c.ln()) / iii_c,
        );

        // Rows: ∂I_C/∂σ, ∂II_C/∂σ, ∂III_C/∂σ
        let d_ic = 2.0 * s;
        let d_iic = 4.0 * s * s2;
        let d_iiic = DVec3::new(
            2.0 * s.x * s2.y * s2.z,
            2.0 * s.y * s2.x * s2.z,
            2.0 * s.z * s2.x * s2.y,
        );

        d_ic * d_psi.x + d_iic * d_psi.y + d_iiic * d_psi.z
    }

    fn name(&self) -> &str {
        "neo_hookean"
    }
}
