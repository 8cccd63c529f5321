//! Constitutive model trait — the core material abstraction.
//!
//! Every hyperelastic model implements this trait, so the element code
//! can swap material strategies without changing its force or stiffness
//! assembly.

use mekano_math::{DMat3, DVec3};

use crate::properties::LameParameters;

/// Trait for hyperelastic constitutive models.
///
/// All quantities are per unit rest volume and expressed in terms of the
/// deformation gradient `F`.
///
/// # Strategy Pattern
///
/// - `LinearModel` — small strain, not rotation invariant
/// - `NeoHookeanModel` — compressible neo-Hookean
/// - `StvkModel` — St. Venant-Kirchhoff (Green strain)
/// - `CoRotatedModel` — linear elasticity in the polar rotated frame
pub trait ConstitutiveModel: Send + Sync {
    /// First Piola-Kirchhoff stress `P(F)`.
    fn pk_stress(&self, f: &DMat3, lame: LameParameters) -> DMat3;

    /// Directional derivative `dP = ∂P/∂F : dF`.
    fn pk_stress_derivative(&self, f: &DMat3, df: &DMat3, lame: LameParameters) -> DMat3;

    /// Strain energy density `Ψ(F)`.
    fn energy_density(&self, f: &DMat3, lame: LameParameters) -> f64;

    /// Diagonal stress `P̂` for a diagonal deformation gradient `F̂`.
    ///
    /// Used by the inversion-safe path after clamping the singular values.
    fn diagonal_stress(&self, fhat: DVec3, lame: LameParameters) -> DVec3 {
        let p = self.pk_stress(&DMat3::from_diagonal(fhat), lame);
        DVec3::new(p.x_axis.x, p.y_axis.y, p.z_axis.z)
    }

    /// Whether `P(QFR) = Q P(F) R` for rotations `Q`, `R`.
    ///
    /// Models that are not rotation invariant never take the SVD path.
    fn is_rotation_invariant(&self) -> bool {
        true
    }

    /// Returns the name of this constitutive model.
    fn name(&self) -> &str;
}
