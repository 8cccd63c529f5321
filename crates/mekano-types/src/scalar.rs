//! Scalar type alias for the simulation.
//!
//! Implicit stepping with stiff hyperelastic elements and KKT systems
//! needs double precision, so everything runs in `f64`.

/// The floating-point type used throughout the simulation.
pub type Scalar = f64;
