//! Inversion-safe stress evaluation.
//!
//! Rotation-invariant models are evaluated in the SVD frame of `F`:
//! `F = U F̂ Vᵗ` with proper rotations `U`, `V`, the singular values are
//! clamped from below, and `P = U P̂(F̂) Vᵗ`. An inverted element
//! (`det F ≤ 0`) therefore gets a finite restoring stress instead of NaN.
//!
//! Stress differentials reuse the same frame: `dP = U dP̂(F̂; UᵗdF V) Vᵗ`.

use serde::{Deserialize, Serialize};

use mekano_math::decomposition::svd_rotation;
use mekano_math::{DMat3, DVec3};
use mekano_types::constants::{
    DEFAULT_CLAMP_THRESHOLD, DEFAULT_DELTA_LOWER, DEFAULT_DELTA_UPPER,
};
use mekano_types::{MekanoError, MekanoResult};

use crate::properties::LameParameters;
use crate::traits::ConstitutiveModel;

/// Tuning of the inversion-safe path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InversionSettings {
    /// Skip the SVD when the analytic test proves all eigenvalues of
    /// `FᵗF` lie in `[delta_lower, delta_upper]`.
    pub svd_skip_test: bool,
    /// Lower eigenvalue bound of the skip test.
    pub delta_lower: f64,
    /// Upper eigenvalue bound of the skip test.
    pub delta_upper: f64,
    /// Singular values below this are clamped to it.
    pub clamp_threshold: f64,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            svd_skip_test: false,
            delta_lower: DEFAULT_DELTA_LOWER,
            delta_upper: DEFAULT_DELTA_UPPER,
            clamp_threshold: DEFAULT_CLAMP_THRESHOLD,
        }
    }
}

impl InversionSettings {
    /// Validates the bounds.
    pub fn validate(&self) -> MekanoResult<()> {
        if !(self.clamp_threshold > 0.0 && self.clamp_threshold < 1.0) {
            return Err(MekanoError::InvalidConfig(format!(
                "clamp_threshold must lie in (0, 1), got {}",
                self.clamp_threshold
            )));
        }
        if self.delta_lower < 0.0 || self.delta_lower >= self.delta_upper {
            return Err(MekanoError::InvalidConfig(format!(
                "SVD skip bounds must satisfy 0 <= delta_lower < delta_upper, got [{}, {}]",
                self.delta_lower, self.delta_upper
            )));
        }
        Ok(())
    }
}

/// Returns `true` if an SVD is needed for `F`.
///
/// The eigenvalues of `C = FᵗF` are the roots of
/// `p(x) = x³ + a x² + b x + c`. All three lie in `[δL, δU]` when
/// `p(δL) < 0`, `p(δU) > 0` and both critical points of `p` lie strictly
/// inside the interval. No eigenvalue is computed.
pub fn check_necessity_for_svd(f: &DMat3, delta_lower: f64, delta_upper: f64) -> bool {
    let (f0, f1, f2) = (f.x_axis, f.y_axis, f.z_axis);
    let c1 = f0.dot(f0);
    let c2 = f0.dot(f1);
    let c3 = f0.dot(f2);
    let c4 = f1.dot(f1);
    let c5 = f1.dot(f2);
    let c6 = f2.dot(f2);

    let a = -(c1 + c4 + c6);
    let b = c1 * c4 + c4 * c6 + c1 * c6 - c2 * c2 - c3 * c3 - c5 * c5;
    let c = c1 * c5 * c5 + c4 * c3 * c3 + c6 * c2 * c2 - c1 * c4 * c6 - 2.0 * c2 * c3 * c5;

    let disc = a * a - 3.0 * b;
    if disc < -1.0e-8 {
        return true;
    }
    let root = disc.abs().sqrt();
    let alpha = (-a - root) / 3.0;
    let beta = (-a + root) / 3.0;

    let p = |x: f64| ((x + a) * x + b) * x + c;
    let small = p(delta_lower) < 0.0
        && p(delta_upper) > 0.0
        && delta_lower < alpha
        && beta < delta_upper;
    !small
}

/// Rotated frame of an SVD evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DiagonalFrame {
    /// Left rotation.
    pub u: DMat3,
    /// Clamped singular values.
    pub fhat: DVec3,
    /// Right rotation.
    pub v: DMat3,
}

/// Stress of one element plus what is needed for its differentials.
#[derive(Debug, Clone, Copy)]
pub struct ElasticResponse {
    /// Deformation gradient the response was evaluated at.
    pub f: DMat3,
    /// First Piola-Kirchhoff stress.
    pub stress: DMat3,
    /// Energy density at the (clamped) configuration.
    pub energy_density: f64,
    /// SVD frame, if the SVD path was taken.
    pub frame: Option<DiagonalFrame>,
    /// Bit `i` set when singular value `i` was clamped.
    pub clamp_mask: u8,
    /// `det F ≤ 0`.
    pub inverted: bool,
}

impl ElasticResponse {
    /// Evaluates `P(F)` for `model`, taking the SVD path when required.
    pub fn evaluate(
        model: &dyn ConstitutiveModel,
        f: &DMat3,
        lame: LameParameters,
        settings: &InversionSettings,
    ) -> Self {
        let inverted = f.determinant() <= 0.0;

        let use_svd = model.is_rotation_invariant()
            && (inverted
                || !settings.svd_skip_test
                || check_necessity_for_svd(f, settings.delta_lower, settings.delta_upper));

        if !use_svd {
            return Self {
                f: *f,
                stress: model.pk_stress(f, lame),
                energy_density: model.energy_density(f, lame),
                frame: None,
                clamp_mask: 0,
                inverted,
            };
        }

        let svd = svd_rotation(f);
        let mut fhat = svd.sigma;
        let mut clamp_mask = 0u8;
        for i in 0..3 {
            if fhat[i] < settings.clamp_threshold {
                fhat[i] = settings.clamp_threshold;
                clamp_mask |= 1 << i;
            }
        }

        let phat = model.diagonal_stress(fhat, lame);
        let stress = svd.u * DMat3::from_diagonal(phat) * svd.v.transpose();
        let energy_density = model.energy_density(&DMat3::from_diagonal(fhat), lame);

        Self {
            f: *f,
            stress,
            energy_density,
            frame: Some(DiagonalFrame {
                u: svd.u,
                fhat,
                v: svd.v,
            }),
            clamp_mask,
            inverted,
        }
    }

    /// Whether the SVD path was taken.
    pub fn used_svd(&self) -> bool {
        self.frame.is_some()
    }

    /// Stress differential `dP` along `dF`, in the frame this response used.
    pub fn stress_differential(
        &self,
        model: &dyn ConstitutiveModel,
        df: &DMat3,
        lame: LameParameters,
    ) -> DMat3 {
        match &self.frame {
            Some(frame) => {
                let local = frame.u.transpose() * *df * frame.v;
                let dphat =
                    model.pk_stress_derivative(&DMat3::from_diagonal(frame.fhat), &local, lame);
                frame.u * dphat * frame.v.transpose()
            }
            None => model.pk_stress_derivative(&self.f, df, lame),
        }
    }
}
