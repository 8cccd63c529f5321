//! # mekano-material
//!
//! Hyperelastic constitutive models and material database.
//!
//! ## Design
//!
//! The [`ConstitutiveModel`] trait computes the first Piola-Kirchhoff
//! stress, its directional derivative and the strain energy density from
//! a deformation gradient. [`MaterialModel`] is the serializable tag that
//! selects one of the four built-in implementations.
//!
//! [`ElasticResponse`] wraps a model with the inversion-safe SVD path so
//! that inverted tetrahedra produce finite, restoring forces.
//!
//! The [`MaterialDatabase`] stores named solid presets.

pub mod corotational;
pub mod database;
pub mod invertible;
pub mod linear;
pub mod model;
pub mod neo_hookean;
pub mod properties;
pub mod stvk;
pub mod traits;

pub use database::MaterialDatabase;
pub use invertible::{check_necessity_for_svd, ElasticResponse, InversionSettings};
pub use model::MaterialModel;
pub use properties::{LameParameters, SolidProperties};
pub use traits::ConstitutiveModel;
