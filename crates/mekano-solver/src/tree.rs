//! Articulated tree of rigid bodies and joints.
//!
//! Joints are stored parent first: a joint's parent body is always the
//! child of an earlier joint (or the world), so one forward pass computes
//! poses, twists and the dense Jacobian rows of every body:
//!
//! ```text
//! E_wi = E_wp · E_pj0 · Q(q) · E_ji
//! J_i  = Ad(E_ij) [Ad(E_jp) J_p + S]
//! J̇_i  = Ad(E_ij) [Ad(E_jp) J̇_p - ad(S q̇) Ad(E_jp) J_p + Ṡ]
//! ```

use mekano_math::se3::{ad, adjoint, rigid_inverse, Mat6, Vec6};
use mekano_math::{DMat4, DVec3, DenseMatrix, Triplet};
use mekano_types::{BodyId, JointId, MekanoError, MekanoResult};

use crate::body::RigidBody;
use crate::component::{Dynamics, Energy, StepContext};
use crate::joint::{Joint, JointKind};
use crate::workspace::StepWorkspace;

/// Owns every rigid body and joint.
#[derive(Debug, Clone, Default)]
pub struct MultibodyTree {
    pub bodies: Vec<RigidBody>,
    pub joints: Vec<Joint>,
    /// Reduced DOFs of all joints.
    ndof: usize,
}

fn mat6_mul_dense(a: &Mat6, b: &DenseMatrix) -> DenseMatrix {
    let mut out = DenseMatrix::zeros(6, b.cols);
    for r in 0..6 {
        for k in 0..6 {
            let ark = a.get(r, k);
            if ark == 0.0 {
                continue;
            }
            for c in 0..b.cols {
                out[(r, c)] += ark * b[(k, c)];
            }
        }
    }
    out
}

impl MultibodyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_body(&mut self, body: RigidBody) -> BodyId {
        self.bodies.push(body);
        BodyId((self.bodies.len() - 1) as u32)
    }

    pub fn add_joint(&mut self, joint: Joint) -> JointId {
        self.joints.push(joint);
        JointId((self.joints.len() - 1) as u32)
    }

    #[inline]
    pub fn body(&self, id: BodyId) -> &RigidBody {
        &self.bodies[id.index()]
    }

    #[inline]
    pub fn body_mut(&mut self, id: BodyId) -> &mut RigidBody {
        &mut self.bodies[id.index()]
    }

    #[inline]
    pub fn joint(&self, id: JointId) -> &Joint {
        &self.joints[id.index()]
    }

    #[inline]
    pub fn joint_mut(&mut self, id: JointId) -> &mut Joint {
        &mut self.joints[id.index()]
    }

    /// Reduced DOFs owned by joints.
    #[inline]
    pub fn dof_count(&self) -> usize {
        self.ndof
    }

    /// Validates the topology, assigns `idx_m` to bodies (6 each, from 0)
    /// and `idx_r` to joints (from 0), then computes kinematics.
    ///
    /// Returns the number of maximal DOFs used by bodies.
    pub fn init(&mut self) -> MekanoResult<usize> {
        let mut owner = vec![None; self.bodies.len()];
        for (k, joint) in self.joints.iter().enumerate() {
            let child = joint.child.index();
            if child >= self.bodies.len() {
                return Err(MekanoError::InvalidConfig(format!(
                    "joint '{}' references missing body {}",
                    joint.name, child
                )));
            }
            if owner[child].is_some() {
                return Err(MekanoError::InvalidConfig(format!(
                    "body {} is the child of more than one joint",
                    child
                )));
            }
            if let Some(parent) = joint.parent {
                match owner.get(parent.index()).copied().flatten() {
                    Some(pj) if pj < k => {}
                    _ => {
                        return Err(MekanoError::InvalidConfig(format!(
                            "joint '{}' must come after the joint of its parent body {}",
                            joint.name,
                            parent.index()
                        )))
                    }
                }
            }
            if joint.q.len() != joint.dof()
                || joint.qdot.len() != joint.dof()
                || joint.q_rest.len() != joint.dof()
            {
                return Err(MekanoError::InvalidConfig(format!(
                    "joint '{}' ({}) expects {} coordinates",
                    joint.name,
                    joint.kind.name(),
                    joint.dof()
                )));
            }
            if let JointKind::Revolute { axis } | JointKind::Prismatic { axis } = joint.kind {
                if axis == DVec3::ZERO {
                    return Err(MekanoError::InvalidConfig(format!(
                        "joint '{}' has a zero axis",
                        joint.name
                    )));
                }
            }
            owner[child] = Some(k);
        }
        if let Some(orphan) = owner.iter().position(Option::is_none) {
            return Err(MekanoError::InvalidConfig(format!(
                "body '{}' has no joint",
                self.bodies[orphan].name
            )));
        }

        for (i, body) in self.bodies.iter_mut().enumerate() {
            body.idx_m = 6 * i;
        }
        let mut idx = 0;
        for joint in &mut self.joints {
            joint.idx_r = idx;
            joint.qddot = vec![0.0; joint.dof()];
            idx += joint.dof();
        }
        self.ndof = idx;
        self.update_kinematics();
        Ok(6 * self.bodies.len())
    }

    /// Forward pass: poses, twists, `J` and `J̇` of every body.
    pub fn update_kinematics(&mut self) {
        let n = self.ndof;
        for k in 0..self.joints.len() {
            let joint = &self.joints[k];
            let (e_wp, phi_p, j_p, jd_p) = match joint.parent {
                Some(p) => {
                    let b = &self.bodies[p.index()];
                    (b.e_wi, b.phi, b.jacobian.clone(), b.jacobian_dot.clone())
                }
                None => (
                    DMat4::IDENTITY,
                    [0.0; 6],
                    DenseMatrix::zeros(6, n),
                    DenseMatrix::zeros(6, n),
                ),
            };

            let e_pj = joint.e_pj0 * joint.local_transform();
            let ad_jp = adjoint(&rigid_inverse(&e_pj));
            let ad_ij = adjoint(&rigid_inverse(&joint.e_ji));
            let (s, sdot) = joint.motion_subspace();
            let s_qdot = joint.relative_twist(&s);

            let mut phi_j: Vec6 = ad_jp.mul_vec(&phi_p);
            for r in 0..6 {
                phi_j[r] += s_qdot[r];
            }

            let ad_jp_jp = mat6_mul_dense(&ad_jp, &j_p);
            let mut j_j = ad_jp_jp.clone();
            let mut jd_j = mat6_mul_dense(&ad_jp, &jd_p)
                .add_scaled(&mat6_mul_dense(&ad(&s_qdot), &ad_jp_jp), -1.0);
            for (c, (sc, sdc)) in s.iter().zip(&sdot).enumerate() {
                for r in 0..6 {
                    j_j[(r, joint.idx_r + c)] += sc[r];
                    jd_j[(r, joint.idx_r + c)] += sdc[r];
                }
            }

            let e_wi = e_wp * e_pj * joint.e_ji;
            let phi_i = ad_ij.mul_vec(&phi_j);
            let j_i = mat6_mul_dense(&ad_ij, &j_j);
            let jd_i = mat6_mul_dense(&ad_ij, &jd_j);

            let child = &mut self.bodies[joint.child.index()];
            child.e_wi = e_wi;
            child.phi = phi_i;
            child.jacobian = j_i;
            child.jacobian_dot = jd_i;
        }
    }

    /// Wraps exponential coordinates of every joint. Returns the number of
    /// joints that were reparametrized.
    pub fn reparam(&mut self) -> usize {
        self.joints.iter_mut().map(|j| j.reparam()).filter(|&c| c).count()
    }
}

impl Dynamics for MultibodyTree {
    fn compute_mass_sparse(&self, mm: &mut Vec<Triplet>) {
        for body in &self.bodies {
            body.compute_mass(mm);
        }
    }

    fn compute_force(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        for body in &self.bodies {
            body.compute_force(ctx.gravity, &mut ws.fm);
        }
        for joint in &self.joints {
            joint.compute_force(&mut ws.fr);
        }
    }

    fn compute_stiffness_sparse(&self, _ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        for joint in &self.joints {
            joint.compute_stiffness(&mut ws.kr);
        }
    }

    fn compute_force_damping_sparse(&self, _ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        for body in &self.bodies {
            body.compute_damping(&mut ws.dm);
        }
        for joint in &self.joints {
            joint.compute_damping(&mut ws.dr);
        }
    }

    fn compute_jacobian_sparse(&self, _ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        for body in &self.bodies {
            for r in 0..6 {
                for c in 0..self.ndof {
                    let v = body.jacobian[(r, c)];
                    if v != 0.0 {
                        ws.j.push(Triplet::new(body.idx_m + r, c, v));
                    }
                    let vd = body.jacobian_dot[(r, c)];
                    if vd != 0.0 {
                        ws.jdot.push(Triplet::new(body.idx_m + r, c, vd));
                    }
                }
            }
        }
    }

    fn gather_dofs(&self, y: &mut [f64], nr: usize) {
        for joint in &self.joints {
            for k in 0..joint.dof() {
                y[joint.idx_r + k] = joint.q[k];
                y[nr + joint.idx_r + k] = joint.qdot[k];
            }
        }
    }

    fn gather_ddofs(&self, ydot: &mut [f64], nr: usize) {
        for joint in &self.joints {
            for k in 0..joint.dof() {
                ydot[joint.idx_r + k] = joint.qdot[k];
                ydot[nr + joint.idx_r + k] = joint.qddot[k];
            }
        }
    }

    fn scatter_dofs(&mut self, y: &[f64], nr: usize) {
        for joint in &mut self.joints {
            for k in 0..joint.dof() {
                joint.q[k] = y[joint.idx_r + k];
                joint.qdot[k] = y[nr + joint.idx_r + k];
            }
        }
    }

    fn scatter_ddofs(&mut self, ydot: &[f64], nr: usize) {
        for joint in &mut self.joints {
            for k in 0..joint.dof() {
                joint.qdot[k] = ydot[joint.idx_r + k];
                joint.qddot[k] = ydot[nr + joint.idx_r + k];
            }
        }
    }

    fn compute_energy(&self, ctx: &StepContext<'_>, energy: &mut Energy) {
        for body in &self.bodies {
            energy.kinetic += body.kinetic_energy();
            energy.potential += body.potential_energy(ctx.gravity);
        }
        for joint in &self.joints {
            energy.elastic += joint.spring_energy();
        }
    }
}
