//! # mekano-mesh
//!
//! Tetrahedral mesh representation with Structure-of-Arrays (SoA) layout.
//!
//! ## Key Types
//!
//! - [`TetMesh`] — Vertex positions in contiguous SoA buffers plus flat
//!   tetrahedron indices.
//! - Procedural generators for benchmark meshes (single tet, tet blocks).

pub mod generators;
pub mod mesh;

pub use mesh::TetMesh;
