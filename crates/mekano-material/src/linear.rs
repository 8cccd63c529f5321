//! Small-strain linear elasticity.
//!
//! Strain is the symmetric part of the displacement gradient,
//! `E = ½(F + Fᵗ) - I`, so a rigid rotation shows up as strain. This is
//! the cheapest model and the only one that never uses the SVD path.
//!
//! Energy: Ψ = μ‖E‖² + λ/2 (tr E)²

use mekano_math::mat3::{frobenius_norm_sq, trace};
use mekano_math::DMat3;

use crate::properties::LameParameters;
use crate::traits::ConstitutiveModel;

/// Linear (small-strain) elastic model.
pub struct LinearModel;

impl LinearModel {
    /// Creates a new linear model.
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::new()
    }
}

fn small_strain(f: &DMat3) -> DMat3 {
    (*f + f.transpose()) * 0.5 - DMat3::IDENTITY
}

impl ConstitutiveModel for LinearModel {
    fn pk_stress(&self, f: &DMat3, lame: LameParameters) -> DMat3 {
        let e = small_strain(f);
        e * (2.0 * lame.mu) + DMat3::IDENTITY * (lame.lambda * trace(&e))
    }

    fn pk_stress_derivative(&self, _f: &DMat3, df: &DMat3, lame: LameParameters) -> DMat3 {
        let de = (*df + df.transpose()) * 0.5;
        de * (2.0 * lame.mu) + DMat3::IDENTITY * (lame.lambda * trace(&de))
    }

    fn energy_density(&self, f: &DMat3, lame: LameParameters) -> f64 {
        let e = small_strain(f);
        let tr = trace(&e);
        lame.mu * frobenius_norm_sq(&e) + 0.5 * lame.lambda * tr * tr
    }

    fn is_rotation_invariant(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "linear"
    }
}
