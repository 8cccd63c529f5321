//! Physical solid properties.
//!
//! Engineering constants (Young's modulus, Poisson ratio) are what a user
//! specifies; the constitutive models consume the Lamé parameters derived
//! from them.

use serde::{Deserialize, Serialize};

use mekano_types::{MekanoError, MekanoResult};

use crate::model::MaterialModel;

/// Lamé parameters `(μ, λ)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LameParameters {
    /// Shear modulus μ.
    pub mu: f64,
    /// First Lamé parameter λ.
    pub lambda: f64,
}

impl LameParameters {
    /// `μ = E / (2(1+ν))`, `λ = Eν / ((1+ν)(1-2ν))`.
    pub fn from_young_poisson(young: f64, poisson: f64) -> Self {
        Self {
            mu: young / (2.0 * (1.0 + poisson)),
            lambda: young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson)),
        }
    }
}

/// Physical properties of an elastic solid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidProperties {
    /// Human-readable name (e.g., "rubber").
    pub name: String,

    /// Mass density in kg/m³.
    pub density: f64,

    /// Young's modulus in Pa.
    pub youngs_modulus: f64,

    /// Poisson ratio, in (-1, 0.5).
    pub poisson_ratio: f64,

    /// Constitutive model used by every element of the body.
    pub model: MaterialModel,

    /// Mass-proportional damping coefficient (`D = d·m`).
    #[serde(default)]
    pub damping: f64,
}

impl SolidProperties {
    /// Returns the Lamé parameters.
    pub fn lame(&self) -> LameParameters {
        LameParameters::from_young_poisson(self.youngs_modulus, self.poisson_ratio)
    }

    /// Returns a copy using a different constitutive model.
    #[must_use]
    pub fn with_model(mut self, model: MaterialModel) -> Self {
        self.model = model;
        self
    }

    /// Checks that every parameter is in its physical range.
    pub fn validate(&self) -> MekanoResult<()> {
        if !(self.density > 0.0 && self.density.is_finite()) {
            return Err(MekanoError::InvalidMaterial(format!(
                "{}: density must be positive, got {}",
                self.name, self.density
            )));
        }
        if !(self.youngs_modulus > 0.0 && self.youngs_modulus.is_finite()) {
            return Err(MekanoError::InvalidMaterial(format!(
                "{}: Young's modulus must be positive, got {}",
                self.name, self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(MekanoError::InvalidMaterial(format!(
                "{}: Poisson ratio must lie in (-1, 0.5), got {}",
                self.name, self.poisson_ratio
            )));
        }
        if self.damping < 0.0 {
            return Err(MekanoError::InvalidMaterial(format!(
                "{}: damping must be non-negative, got {}",
                self.name, self.damping
            )));
        }
        Ok(())
    }
}
