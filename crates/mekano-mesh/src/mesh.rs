//! Core tetrahedral mesh type with SoA (Structure of Arrays) layout.
//!
//! The SoA layout stores each coordinate channel contiguously:
//! - `pos_x: [x0, x1, x2, ...]`
//! - `pos_y: [y0, y1, y2, ...]`
//! - `pos_z: [z0, z1, z2, ...]`
//!
//! Tetrahedra are stored flat as four vertex indices each. Vertex `3` of a
//! tetrahedron is the origin of its edge matrix `Dm = [x0-x3, x1-x3, x2-x3]`,
//! and a well-oriented tetrahedron has `det Dm > 0`.

use serde::{Deserialize, Serialize};

use mekano_math::{DMat3, DVec3};
use mekano_types::constants::DEGENERATE_VOLUME_THRESHOLD;
use mekano_types::{MekanoError, MekanoResult};

/// A tetrahedral mesh stored in Structure-of-Arrays layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TetMesh {
    /// X coordinates of all vertices.
    pub pos_x: Vec<f64>,
    /// Y coordinates of all vertices.
    pub pos_y: Vec<f64>,
    /// Z coordinates of all vertices.
    pub pos_z: Vec<f64>,

    /// Tetrahedron indices, stored flat: `[t0v0, t0v1, t0v2, t0v3, t1v0, ...]`.
    pub indices: Vec<u32>,
}

impl TetMesh {
    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.pos_x.len()
    }

    /// Returns the number of tetrahedra.
    #[inline]
    pub fn tet_count(&self) -> usize {
        self.indices.len() / 4
    }

    /// Returns the position of vertex `i`.
    #[inline]
    pub fn position(&self, i: usize) -> DVec3 {
        DVec3::new(self.pos_x[i], self.pos_y[i], self.pos_z[i])
    }

    /// Sets the position of vertex `i`.
    #[inline]
    pub fn set_position(&mut self, i: usize, p: DVec3) {
        self.pos_x[i] = p.x;
        self.pos_y[i] = p.y;
        self.pos_z[i] = p.z;
    }

    /// Returns the four vertex indices of tetrahedron `t`.
    #[inline]
    pub fn tet(&self, t: usize) -> [u32; 4] {
        let base = t * 4;
        [
            self.indices[base],
            self.indices[base + 1],
            self.indices[base + 2],
            self.indices[base + 3],
        ]
    }

    /// Appends a vertex and returns its index.
    pub fn push_vertex(&mut self, p: DVec3) -> u32 {
        self.pos_x.push(p.x);
        self.pos_y.push(p.y);
        self.pos_z.push(p.z);
        (self.pos_x.len() - 1) as u32
    }

    /// Appends a tetrahedron.
    pub fn push_tet(&mut self, tet: [u32; 4]) {
        self.indices.extend_from_slice(&tet);
    }

    /// Creates an empty mesh with pre-allocated capacity.
    pub fn with_capacity(vertex_capacity: usize, tet_capacity: usize) -> Self {
        Self {
            pos_x: Vec::with_capacity(vertex_capacity),
            pos_y: Vec::with_capacity(vertex_capacity),
            pos_z: Vec::with_capacity(vertex_capacity),
            indices: Vec::with_capacity(tet_capacity * 4),
        }
    }

    /// Edge matrix `Dm = [x0-x3, x1-x3, x2-x3]` of tetrahedron `t`.
    pub fn edge_matrix(&self, t: usize) -> DMat3 {
        let [a, b, c, d] = self.tet(t).map(|i| self.position(i as usize));
        DMat3::from_cols(a - d, b - d, c - d)
    }

    /// Signed volume of tetrahedron `t` (`det Dm / 6`).
    pub fn signed_volume(&self, t: usize) -> f64 {
        self.edge_matrix(t).determinant() / 6.0
    }

    /// Sum of the absolute tetrahedron volumes.
    pub fn total_volume(&self) -> f64 {
        (0..self.tet_count()).map(|t| self.signed_volume(t).abs()).sum()
    }

    /// Axis-aligned bounding box `(min, max)`. `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        if self.vertex_count() == 0 {
            return None;
        }
        let mut lo = DVec3::splat(f64::INFINITY);
        let mut hi = DVec3::splat(f64::NEG_INFINITY);
        for i in 0..self.vertex_count() {
            let p = self.position(i);
            lo = lo.min(p);
            hi = hi.max(p);
        }
        Some((lo, hi))
    }

    /// Indices of all vertices whose position satisfies `pred`.
    pub fn select_vertices(&self, pred: impl Fn(DVec3) -> bool) -> Vec<usize> {
        (0..self.vertex_count())
            .filter(|&i| pred(self.position(i)))
            .collect()
    }

    /// Translates every vertex by `offset`.
    pub fn translate(&mut self, offset: DVec3) {
        for i in 0..self.vertex_count() {
            let p = self.position(i) + offset;
            self.set_position(i, p);
        }
    }

    /// Swaps vertices 0 and 1 of every inverted tetrahedron so that all
    /// have positive signed volume.
    pub fn orient_positive(&mut self) {
        for t in 0..self.tet_count() {
            if self.signed_volume(t) < 0.0 {
                self.indices.swap(t * 4, t * 4 + 1);
            }
        }
    }

    /// Validates mesh integrity.
    ///
    /// Checks:
    /// - All SoA arrays have the same length
    /// - Tetrahedron indices are within bounds and not repeated
    /// - No degenerate (near-zero volume) tetrahedra
    pub fn validate(&self) -> MekanoResult<()> {
        let n = self.pos_x.len();

        if self.pos_y.len() != n || self.pos_z.len() != n {
            return Err(MekanoError::InvalidMesh(
                "Position arrays have inconsistent lengths".into(),
            ));
        }

        if self.indices.len() % 4 != 0 {
            return Err(MekanoError::InvalidMesh(
                "Index count is not divisible by 4".into(),
            ));
        }

        for (i, &idx) in self.indices.iter().enumerate() {
            if idx as usize >= n {
                return Err(MekanoError::InvalidMesh(format!(
                    "Index {} at position {} is out of range (vertex count: {})",
                    idx, i, n
                )));
            }
        }

        for t in 0..self.tet_count() {
            let v = self.tet(t);
            for a in 0..4 {
                for b in (a + 1)..4 {
                    if v[a] == v[b] {
                        return Err(MekanoError::InvalidMesh(format!(
                            "Tetrahedron {} has repeated vertex indices: {:?}",
                            t, v
                        )));
                    }
                }
            }
            let vol = self.signed_volume(t);
            if vol.abs() < DEGENERATE_VOLUME_THRESHOLD {
                return Err(MekanoError::InvalidMesh(format!(
                    "Tetrahedron {} is degenerate (volume {:e})",
                    t, vol
                )));
            }
        }

        Ok(())
    }

    /// Constructs a mesh from interleaved AoS position data
    /// `[x0, y0, z0, x1, y1, z1, ...]`.
    pub fn from_interleaved(positions: &[f64], indices: &[u32]) -> MekanoResult<Self> {
        if positions.len() % 3 != 0 {
            return Err(MekanoError::InvalidMesh(
                "Interleaved positions length not divisible by 3".into(),
            ));
        }

        let n = positions.len() / 3;
        let mut mesh = Self::with_capacity(n, indices.len() / 4);
        for p in positions.chunks_exact(3) {
            mesh.push_vertex(DVec3::new(p[0], p[1], p[2]));
        }
        mesh.indices = indices.to_vec();

        mesh.validate()?;
        Ok(mesh)
    }
}
