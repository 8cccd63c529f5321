//! # mekano-types
//!
//! Shared types, identifiers, error types, and physical constants
//! for the mekano multibody simulator.
//!
//! This crate has zero domain logic — it defines the vocabulary
//! that all other mekano crates share.

pub mod constants;
pub mod error;
pub mod ids;
pub mod scalar;

pub use error::{MekanoError, MekanoResult};
pub use ids::{BodyId, ComponentId, ConstraintId, JointId, NodeId};
pub use scalar::Scalar;
