//! # mekano-math
//!
//! Linear algebra primitives for the mekano simulator.
//!
//! Provides:
//! - Re-exports of `glam` double-precision types (`DVec3`, `DMat3`, ...)
//! - 3×3 helpers, symmetric eigensolver, rotation-variant SVD, polar decomposition
//! - SE(3) algebra (adjoint, twists, exponential coordinates)
//! - Sparse (CSR + triplets) and dense matrices
//! - Direct solvers (faer sparse Cholesky, faer dense LU/LDLᵀ/QR)
//! - Iterative solvers (CG, MINRES, BiCGSTAB) and an active-set QP

pub mod decomposition;
pub mod dense;
pub mod faer_solver;
pub mod iterative;
pub mod mat3;
pub mod qp;
pub mod se3;
pub mod sparse;

pub use dense::DenseMatrix;
pub use sparse::{CsrMatrix, MatrixSink, SparseSolver, Triplet};

// Re-export glam types as the canonical math types for mekano.
pub use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};
