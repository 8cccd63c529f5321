//! Error types for the mekano simulator.
//!
//! All crates return `MekanoResult<T>` from fallible operations.

use thiserror::Error;

/// Unified error type for the mekano simulator.
#[derive(Debug, Error)]
pub enum MekanoError {
    /// Mesh data is malformed or inconsistent.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Material parameter is out of valid range or the model is unknown.
    #[error("Invalid material parameter: {0}")]
    InvalidMaterial(String),

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A state vector or matrix does not match the system dimensions.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A factorization or direct solve failed.
    #[error("Linear solve failed: {0}")]
    LinearSolve(String),

    /// Solver failed to converge.
    #[error("Solver did not converge after {iterations} iterations (residual: {residual:.2e})")]
    SolverDivergence {
        iterations: u32,
        residual: f64,
    },

    /// A simulation invariant was violated.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Convenience alias for `Result<T, MekanoError>`.
pub type MekanoResult<T> = Result<T, MekanoError>;
