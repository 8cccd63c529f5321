//! St. Venant-Kirchhoff model.
//!
//! Linear stress-strain law on the Green strain `E = ½(FᵗF - I)`.
//! Rotation invariant, but softens under strong compression.
//!
//! Energy: Ψ = μ‖E‖² + λ/2 (tr E)²

use mekano_math::mat3::{frobenius_norm_sq, trace};
use mekano_math::DMat3;

use crate::properties::LameParameters;
use crate::traits::ConstitutiveModel;

/// St. Venant-Kirchhoff model.
pub struct StvkModel;

impl StvkModel {
    /// Creates a new StVK model.
    pub fn new() -> Self {
        Self
    }
}

impl Default for StvkModel {
    fn default() -> Self {
        Self::new()
    }
}

fn green_strain(f: &DMat3) -> DMat3 {
    (f.transpose() * *f - DMat3::IDENTITY) * 0.5
}

/// Second Piola-Kirchhoff stress `S = 2μE + λ tr(E) I`.
fn second_pk(e: &DMat3, lame: LameParameters) -> DMat3 {
    *e * (2.0 * lame.mu) + DMat3::IDENTITY * (lame.lambda * trace(e))
}

impl ConstitutiveModel for StvkModel {
    fn pk_stress(&self, f: &DMat3, lame: LameParameters) -> DMat3 {
        *f * second_pk(&green_strain(f), lame)
    }

    fn pk_stress_derivative(&self, f: &DMat3, df: &DMat3, lame: LameParameters) -> DMat3 {
        let e = green_strain(f);
        let de = (df.transpose() * *f + f.transpose() * *df) * 0.5;
        *df * second_pk(&e, lame) + *f * second_pk(&de, lame)
    }

    fn energy_density(&self, f: &DMat3, lame: LameParameters) -> f64 {
        let e = green_strain(f);
        let tr = trace(&e);
        lame.mu * frobenius_norm_sq(&e) + 0.5 * lame.lambda * tr * tr
    }

    fn name(&self) -> &str {
        "stvk"
    }
}
