//! FEM soft bodies.
//!
//! A soft body owns its nodes and tetrahedra. Tetrahedra reference nodes by
//! local index; the world assigns maximal and reduced offsets at init.
//! Element stresses are evaluated once per step in [`Dynamics::update`] and
//! reused for forces and stiffness.

use mekano_material::{ElasticResponse, InversionSettings, SolidProperties};
use mekano_math::mat3::skew;
use mekano_math::se3::split;
use mekano_math::{DVec3, Triplet};
use mekano_mesh::TetMesh;
use mekano_types::{BodyId, MekanoError, MekanoResult};
use tracing::{info, trace};

use crate::component::{Dynamics, Energy, StepContext};
use crate::node::{Attachment, Node, NodeKind};
use crate::tetrahedron::Tetrahedron;
use crate::workspace::StepWorkspace;

/// A hyperelastic tetrahedral body.
#[derive(Debug, Clone)]
pub struct SoftBody {
    pub name: String,
    pub properties: SolidProperties,
    pub nodes: Vec<Node>,
    pub tets: Vec<Tetrahedron>,
    /// Set while any element is inverted.
    pub inverted: bool,
    pub inversion: InversionSettings,
    responses: Vec<ElasticResponse>,
}

impl SoftBody {
    /// Builds a soft body from a mesh: rest data per element and lumped
    /// node masses `ρW/4`.
    pub fn from_mesh(
        name: impl Into<String>,
        mesh: &TetMesh,
        properties: SolidProperties,
    ) -> MekanoResult<Self> {
        properties.validate()?;
        mesh.validate()?;

        let mut nodes: Vec<Node> = (0..mesh.vertex_count())
            .map(|i| Node::new(mesh.position(i)))
            .collect();
        let mut tets = Vec::with_capacity(mesh.tet_count());
        for t in 0..mesh.tet_count() {
            let idx = mesh.tet(t).map(|i| i as usize);
            let rest = idx.map(|i| nodes[i].x0);
            let tet = Tetrahedron::new(idx, &rest)?;
            let m = tet.node_mass(properties.density);
            for i in idx {
                nodes[i].mass += m;
            }
            tets.push(tet);
        }

        let mut body = Self {
            name: name.into(),
            properties,
            nodes,
            tets,
            inverted: false,
            inversion: InversionSettings::default(),
            responses: Vec::new(),
        };
        body.update_elastic();
        Ok(body)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn tet_count(&self) -> usize {
        self.tets.len()
    }

    /// Total mass.
    pub fn mass(&self) -> f64 {
        self.nodes.iter().map(|n| n.mass).sum()
    }

    /// Pins the given nodes in place.
    pub fn fix_nodes(&mut self, indices: &[usize]) -> MekanoResult<()> {
        for &i in indices {
            self.node_mut(i)?.kind = NodeKind::Fixed;
        }
        Ok(())
    }

    /// Attaches a node to a body at a body-local point.
    pub fn attach_node(&mut self, i: usize, body: BodyId, local: DVec3) -> MekanoResult<()> {
        self.node_mut(i)?.kind = NodeKind::Attached(Attachment { body, local });
        Ok(())
    }

    /// Sets the velocity of every free node.
    pub fn set_velocity(&mut self, v: DVec3) {
        for node in self.nodes.iter_mut().filter(|n| n.is_free()) {
            node.v = v;
        }
    }

    /// Moves every node (current and rest positions) by `offset`.
    pub fn translate(&mut self, offset: DVec3) {
        for node in &mut self.nodes {
            node.x += offset;
            node.x0 += offset;
        }
    }

    fn node_mut(&mut self, i: usize) -> MekanoResult<&mut Node> {
        let count = self.nodes.len();
        self.nodes.get_mut(i).ok_or_else(|| {
            MekanoError::InvalidConfig(format!("node {i} out of range (soft body has {count})"))
        })
    }

    /// Current positions of the four nodes of tetrahedron `t`.
    pub fn tet_positions(&self, t: usize) -> [DVec3; 4] {
        self.tets[t].nodes.map(|i| self.nodes[i].x)
    }

    fn tet_offsets(&self, t: usize) -> [usize; 4] {
        self.tets[t].nodes.map(|i| self.nodes[i].idx_m)
    }

    /// Elastic response of every element, from the last update.
    pub fn responses(&self) -> &[ElasticResponse] {
        &self.responses
    }

    /// Number of currently inverted elements.
    pub fn inverted_count(&self) -> usize {
        self.tets.iter().filter(|t| t.inverted).count()
    }

    /// Re-evaluates every element at the current positions.
    pub fn update_elastic(&mut self) -> usize {
        let model = self.properties.model.constitutive();
        let lame = self.properties.lame();
        let mut responses = std::mem::take(&mut self.responses);
        responses.clear();
        for t in 0..self.tets.len() {
            let x = self.tet_positions(t);
            let response = self.tets[t].evaluate(&x, model, lame, &self.inversion);
            if response.inverted {
                trace!(
                    body = %self.name,
                    element = t,
                    det = response.f.determinant(),
                    clamp_mask = response.clamp_mask,
                    "Inverted element"
                );
            }
            responses.push(response);
        }
        self.responses = responses;

        let inverted = self.inverted_count();
        if inverted > 0 && !self.inverted {
            info!(body = %self.name, elements = inverted, "Soft body has inverted elements");
        }
        self.inverted = inverted > 0;
        inverted
    }

    /// Strain energy of all elements.
    pub fn elastic_energy(&self) -> f64 {
        self.tets
            .iter()
            .zip(&self.responses)
            .map(|(t, r)| t.energy(r))
            .sum()
    }

    fn attached_rows(&self, ctx: &StepContext<'_>, node: &Node, att: &Attachment, ws: &mut StepWorkspace) {
        let body = ctx.tree.body(att.body);
        let r = body.rotation();
        let (w, _) = split(&body.phi);
        // [-x̂ 1] as two 3×3 blocks
        let a = r * -skew(att.local);
        let b = r;
        let wa = r * skew(w) * -skew(att.local);
        let wb = r * skew(w);
        let n = body.jacobian.cols;
        for row in 0..3 {
            for c in 0..n {
                let mut val = 0.0;
                let mut dot = 0.0;
                for k in 0..3 {
                    val += a.col(k)[row] * body.jacobian[(k, c)]
                        + b.col(k)[row] * body.jacobian[(k + 3, c)];
                    dot += wa.col(k)[row] * body.jacobian[(k, c)]
                        + wb.col(k)[row] * body.jacobian[(k + 3, c)]
                        + a.col(k)[row] * body.jacobian_dot[(k, c)]
                        + b.col(k)[row] * body.jacobian_dot[(k + 3, c)];
                }
                if val != 0.0 {
                    ws.j.push(Triplet::new(node.idx_m + row, c, val));
                }
                if dot != 0.0 {
                    ws.jdot.push(Triplet::new(node.idx_m + row, c, dot));
                }
            }
        }
    }
}

impl Dynamics for SoftBody {
    fn compute_mass_sparse(&self, mm: &mut Vec<Triplet>) {
        for node in &self.nodes {
            for k in 0..3 {
                mm.push(Triplet::new(node.idx_m + k, node.idx_m + k, node.mass));
            }
        }
    }

    fn compute_constant_jacobian(&self, j: &mut Vec<Triplet>) {
        for node in &self.nodes {
            if let Some(idx_r) = node.idx_r {
                for k in 0..3 {
                    j.push(Triplet::new(node.idx_m + k, idx_r + k, 1.0));
                }
            }
        }
    }

    fn compute_force(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        for node in &self.nodes {
            let w = ctx.gravity * node.mass;
            for k in 0..3 {
                ws.fm[node.idx_m + k] += w[k];
            }
        }
        for (t, response) in self.responses.iter().enumerate() {
            let offsets = self.tet_offsets(t);
            let forces = self.tets[t].nodal_forces(response);
            for (f, &off) in forces.iter().zip(&offsets) {
                for k in 0..3 {
                    ws.fm[off + k] += f[k];
                }
            }
        }
        ws.inverted_elements += self.inverted_count();
    }

    fn compute_stiffness_sparse(&self, _ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        let model = self.properties.model.constitutive();
        let lame = self.properties.lame();
        for (t, response) in self.responses.iter().enumerate() {
            let offsets = self.tet_offsets(t);
            self.tets[t].add_stiffness(response, model, lame, &offsets, &mut ws.k);
        }
    }

    fn compute_force_damping_sparse(&self, _ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        let d = self.properties.damping;
        if d == 0.0 {
            return;
        }
        for node in &self.nodes {
            for k in 0..3 {
                ws.dm.push(Triplet::new(node.idx_m + k, node.idx_m + k, d * node.mass));
            }
        }
    }

    fn compute_jacobian_sparse(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        for node in &self.nodes {
            if let NodeKind::Attached(att) = &node.kind {
                self.attached_rows(ctx, node, att, ws);
            }
        }
    }

    fn gather_dofs(&self, y: &mut [f64], nr: usize) {
        for node in &self.nodes {
            if let Some(i) = node.idx_r {
                for k in 0..3 {
                    y[i + k] = node.x[k];
                    y[nr + i + k] = node.v[k];
                }
            }
        }
    }

    fn gather_ddofs(&self, ydot: &mut [f64], _nr: usize) {
        for node in &self.nodes {
            if let Some(i) = node.idx_r {
                for k in 0..3 {
                    ydot[i + k] = node.v[k];
                }
            }
        }
    }

    fn scatter_dofs(&mut self, y: &[f64], nr: usize) {
        for node in &mut self.nodes {
            if let Some(i) = node.idx_r {
                node.x = DVec3::new(y[i], y[i + 1], y[i + 2]);
                node.v = DVec3::new(y[nr + i], y[nr + i + 1], y[nr + i + 2]);
            }
        }
    }

    fn scatter_ddofs(&mut self, ydot: &[f64], _nr: usize) {
        for node in &mut self.nodes {
            if let Some(i) = node.idx_r {
                node.v = DVec3::new(ydot[i], ydot[i + 1], ydot[i + 2]);
            }
        }
    }

    fn update(&mut self, ctx: &StepContext<'_>) {
        for node in &mut self.nodes {
            if let NodeKind::Attached(att) = node.kind {
                node.follow(ctx.tree.body(att.body), att.local);
            }
        }
        self.update_elastic();
    }

    fn compute_energy(&self, ctx: &StepContext<'_>, energy: &mut Energy) {
        for node in &self.nodes {
            energy.kinetic += 0.5 * node.mass * node.v.length_squared();
            energy.potential -= node.mass * ctx.gravity.dot(node.x);
        }
        energy.elastic += self.elastic_energy();
    }
}

