//! Co-rotated linear elasticity.
//!
//! Performs polar decomposition F = R·S on the deformation gradient and
//! measures strain as `S - I` in the rotated frame. This handles large
//! rotations correctly: a rigid rotation of the element is strain free.
//!
//! Energy: Ψ = μ‖F - R‖² + λ/2 tr(S - I)²
//!
//! Stress: P = 2μ(F - R) + λ tr(RᵗF - I) R

use mekano_math::decomposition::polar_decomposition;
use mekano_math::mat3::{axial, frobenius_norm_sq, skew, trace};
use mekano_math::DMat3;

use crate::properties::LameParameters;
use crate::traits::ConstitutiveModel;

/// Below this `|det(tr(S)I - S)|` the rotation variation is dropped.
const ROTATION_VARIATION_EPS: f64 = 1.0e-12;

/// Co-rotated FEM constitutive model.
pub struct CoRotatedModel;

impl CoRotatedModel {
    /// Creates a new co-rotated model.
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoRotatedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstitutiveModel for CoRotatedModel {
    fn pk_stress(&self, f: &DMat3, lame: LameParameters) -> DMat3 {
        let polar = polar_decomposition(f);
        let r = polar.rotation;
        (*f - r) * (2.0 * lame.mu) + r * (lame.lambda * trace(&(polar.stretch - DMat3::IDENTITY)))
    }

    /// Exact derivative including the rotation variation `dR = R·[ω]×`,
    /// where `(tr(S)I - S) ω = axial(RᵗdF - dFᵗR)`.
    fn pk_stress_derivative(&self, f: &DMat3, df: &DMat3, lame: LameParameters) -> DMat3 {
        let polar = polar_decomposition(f);
        let r = polar.rotation;
        let s = polar.stretch;

        let m = r.transpose() * *df;
        let a = DMat3::IDENTITY * trace(&s) - s;
        let dr = if a.determinant().abs() > ROTATION_VARIATION_EPS {
            let omega = a.inverse() * axial(&(m - m.transpose()));
            r * skew(omega)
        } else {
            DMat3::ZERO
        };

        (*df - dr) * (2.0 * lame.mu)
            + r * (lame.lambda * trace(&m))
            + dr * (lame.lambda * trace(&(s - DMat3::IDENTITY)))
    }

    fn energy_density(&self, f: &DMat3, lame: LameParameters) -> f64 {
        let polar = polar_decomposition(f);
        let tr = trace(&(polar.stretch - DMat3::IDENTITY));
        lame.mu * frobenius_norm_sq(&(*f - polar.rotation)) + 0.5 * lame.lambda * tr * tr
    }

    fn name(&self) -> &str {
        "co_rotated"
    }
}
