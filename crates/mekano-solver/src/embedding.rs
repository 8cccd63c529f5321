//! Mesh embedding: a coarse simulated soft body carrying passive points.
//!
//! Every dynamics contract delegates to the coarse body. Embedded points
//! store barycentric weights in one coarse tetrahedron and are moved with
//! it whenever the coarse nodes change.

use mekano_math::DVec3;
use mekano_types::{MekanoError, MekanoResult};

use crate::component::{Dynamics, Energy, StepContext};
use crate::soft_body::SoftBody;
use crate::workspace::StepWorkspace;

/// A passive point inside a coarse tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddedPoint {
    /// Containing coarse tetrahedron.
    pub tet: usize,
    /// Barycentric weights of the tetrahedron's four nodes.
    pub weights: [f64; 4],
    /// Current world position.
    pub x: DVec3,
}

/// A coarse soft body with embedded points.
#[derive(Debug, Clone)]
pub struct MeshEmbedding {
    pub coarse: SoftBody,
    pub points: Vec<EmbeddedPoint>,
}

/// Barycentric weights of `p` with respect to the rest shape of tet `t`.
fn barycentric(coarse: &SoftBody, t: usize, p: DVec3) -> [f64; 4] {
    let tet = &coarse.tets[t];
    let x3 = coarse.nodes[tet.nodes[3]].x0;
    let l = tet.bm * (p - x3);
    [l.x, l.y, l.z, 1.0 - l.x - l.y - l.z]
}

impl MeshEmbedding {
    /// Embeds `points` (given in the coarse body's rest configuration).
    ///
    /// Each point is assigned to the tetrahedron whose smallest barycentric
    /// weight is largest; a point outside the coarse mesh by more than
    /// `tolerance` (in barycentric units) is rejected.
    pub fn new(coarse: SoftBody, points: &[DVec3], tolerance: f64) -> MekanoResult<Self> {
        if coarse.tet_count() == 0 {
            return Err(MekanoError::InvalidMesh(
                "cannot embed points in a soft body without elements".into(),
            ));
        }
        let mut embedded = Vec::with_capacity(points.len());
        for (i, &p) in points.iter().enumerate() {
            let (tet, weights) = (0..coarse.tet_count())
                .map(|t| (t, barycentric(&coarse, t, p)))
                .max_by(|a, b| {
                    let ma = a.1.iter().copied().fold(f64::INFINITY, f64::min);
                    let mb = b.1.iter().copied().fold(f64::INFINITY, f64::min);
                    ma.total_cmp(&mb)
                })
                .ok_or_else(|| MekanoError::InvalidMesh("empty coarse mesh".into()))?;
            let worst = weights.iter().copied().fold(f64::INFINITY, f64::min);
            if worst < -tolerance {
                return Err(MekanoError::InvalidMesh(format!(
                    "embedded point {i} at {p} lies outside the coarse mesh"
                )));
            }
            embedded.push(EmbeddedPoint {
                tet,
                weights,
                x: p,
            });
        }
        let mut embedding = Self {
            coarse,
            points: embedded,
        };
        embedding.update_points();
        Ok(embedding)
    }

    /// Moves every embedded point with its coarse tetrahedron.
    pub fn update_points(&mut self) {
        for point in &mut self.points {
            let nodes = self.coarse.tets[point.tet].nodes;
            point.x = nodes
                .iter()
                .zip(&point.weights)
                .map(|(&n, &w)| self.coarse.nodes[n].x * w)
                .sum();
        }
    }
}

impl Dynamics for MeshEmbedding {
    fn compute_mass_sparse(&self, mm: &mut Vec<mekano_math::Triplet>) {
        self.coarse.compute_mass_sparse(mm);
    }

    fn compute_constant_jacobian(&self, j: &mut Vec<mekano_math::Triplet>) {
        self.coarse.compute_constant_jacobian(j);
    }

    fn compute_force(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        self.coarse.compute_force(ctx, ws);
    }

    fn compute_stiffness_sparse(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        self.coarse.compute_stiffness_sparse(ctx, ws);
    }

    fn compute_force_damping_sparse(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        self.coarse.compute_force_damping_sparse(ctx, ws);
    }

    fn compute_jacobian_sparse(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        self.coarse.compute_jacobian_sparse(ctx, ws);
    }

    fn gather_dofs(&self, y: &mut [f64], nr: usize) {
        self.coarse.gather_dofs(y, nr);
    }

    fn gather_ddofs(&self, ydot: &mut [f64], nr: usize) {
        self.coarse.gather_ddofs(ydot, nr);
    }

    fn scatter_dofs(&mut self, y: &[f64], nr: usize) {
        self.coarse.scatter_dofs(y, nr);
        self.update_points();
    }

    fn scatter_ddofs(&mut self, ydot: &[f64], nr: usize) {
        self.coarse.scatter_ddofs(ydot, nr);
    }

    fn update(&mut self, ctx: &StepContext<'_>) {
        self.coarse.update(ctx);
        self.update_points();
    }

    fn compute_energy(&self, ctx: &StepContext<'_>, energy: &mut Energy) {
        self.coarse.compute_energy(ctx, energy);
    }
}
