//! Joints of the articulated tree.
//!
//! A joint connects a parent (a body or the world) to a child body. Its
//! frame `j` sits at `E_pj0 · Q(q)` in the parent frame, where `Q(q)` is the
//! joint's own motion, and the child body sits at `E_ji` in the joint frame.
//! The joint twist in frame `j` is `S(q) q̇`.
//!
//! | Kind | DOFs | `q` | `S` |
//! |---|---|---|---|
//! | `Fixed` | 0 | | |
//! | `Revolute` | 1 | angle | `[a; 0]` |
//! | `Prismatic` | 1 | offset | `[0; a]` |
//! | `Translational` | 3 | offset | `[0; 1]` |
//! | `Spherical` | 3 | exponential coordinates `r` | `[J_r(r); 0]` |
//! | `Free` | 6 | `[p; r]` | `[[0, J_r], [Rᵗ, 0]]` |

use serde::{Deserialize, Serialize};

use mekano_math::mat3::skew;
use mekano_math::se3::{
    exp_reparam, exp_right_jacobian, exp_right_jacobian_dot, exp_rotation, join, rigid_transform,
    translation_transform, Vec6,
};
use mekano_math::{DMat3, DMat4, DVec3, Triplet};
use mekano_types::BodyId;

/// Joint type and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Fixed,
    Revolute { axis: DVec3 },
    Prismatic { axis: DVec3 },
    Translational,
    Spherical,
    Free,
}

impl JointKind {
    /// Number of reduced coordinates.
    pub fn dof(&self) -> usize {
        match self {
            Self::Fixed => 0,
            Self::Revolute { .. } | Self::Prismatic { .. } => 1,
            Self::Translational | Self::Spherical => 3,
            Self::Free => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Revolute { .. } => "revolute",
            Self::Prismatic { .. } => "prismatic",
            Self::Translational => "translational",
            Self::Spherical => "spherical",
            Self::Free => "free",
        }
    }
}

/// A joint with its reduced state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    /// Parent body, `None` for the world.
    pub parent: Option<BodyId>,
    pub child: BodyId,
    /// Joint frame in the parent frame at `q = 0`.
    pub e_pj0: DMat4,
    /// Child body frame in the joint frame.
    pub e_ji: DMat4,
    pub q: Vec<f64>,
    pub qdot: Vec<f64>,
    pub qddot: Vec<f64>,
    /// Spring rest configuration.
    pub q_rest: Vec<f64>,
    /// Joint spring stiffness (`f_r = -k(q - q_rest)`).
    pub stiffness: f64,
    /// Joint damping (`D_r = d`).
    pub damping: f64,
    /// Offset of the joint's reduced DOFs.
    pub idx_r: usize,
}

impl Joint {
    /// A joint at `q = 0` with coincident frames.
    pub fn new(name: impl Into<String>, kind: JointKind, parent: Option<BodyId>, child: BodyId) -> Self {
        let kind = match kind {
            JointKind::Revolute { axis } => JointKind::Revolute {
                axis: axis.normalize_or_zero(),
            },
            JointKind::Prismatic { axis } => JointKind::Prismatic {
                axis: axis.normalize_or_zero(),
            },
            other => other,
        };
        let n = kind.dof();
        Self {
            name: name.into(),
            kind,
            parent,
            child,
            e_pj0: DMat4::IDENTITY,
            e_ji: DMat4::IDENTITY,
            q: vec![0.0; n],
            qdot: vec![0.0; n],
            qddot: vec![0.0; n],
            q_rest: vec![0.0; n],
            stiffness: 0.0,
            damping: 0.0,
            idx_r: 0,
        }
    }

    /// Places the joint frame in the parent frame.
    #[must_use]
    pub fn with_parent_frame(mut self, e_pj0: DMat4) -> Self {
        self.e_pj0 = e_pj0;
        self
    }

    /// Places the child body in the joint frame.
    #[must_use]
    pub fn with_child_frame(mut self, e_ji: DMat4) -> Self {
        self.e_ji = e_ji;
        self
    }

    /// Sets the initial configuration and velocity.
    #[must_use]
    pub fn with_state(mut self, q: &[f64], qdot: &[f64]) -> Self {
        self.q = q.to_vec();
        self.qdot = qdot.to_vec();
        self
    }

    /// Adds a joint spring pulling towards `q_rest`.
    #[must_use]
    pub fn with_spring(mut self, stiffness: f64, q_rest: &[f64]) -> Self {
        self.stiffness = stiffness;
        self.q_rest = q_rest.to_vec();
        self
    }

    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    #[inline]
    pub fn dof(&self) -> usize {
        self.kind.dof()
    }

    fn rotation_coordinates(&self) -> Option<(usize, DVec3)> {
        let at = |k: usize| DVec3::new(self.q[k], self.q[k + 1], self.q[k + 2]);
        match self.kind {
            JointKind::Spherical => Some((0, at(0))),
            JointKind::Free => Some((3, at(3))),
            _ => None,
        }
    }

    /// The joint's own motion `Q(q)`.
    pub fn local_transform(&self) -> DMat4 {
        match self.kind {
            JointKind::Fixed => DMat4::IDENTITY,
            JointKind::Revolute { axis } => {
                rigid_transform(&DMat3::from_axis_angle(axis, self.q[0]), DVec3::ZERO)
            }
            JointKind::Prismatic { axis } => translation_transform(axis * self.q[0]),
            JointKind::Translational => {
                translation_transform(DVec3::new(self.q[0], self.q[1], self.q[2]))
            }
            JointKind::Spherical => {
                let r = DVec3::new(self.q[0], self.q[1], self.q[2]);
                rigid_transform(&exp_rotation(r), DVec3::ZERO)
            }
            JointKind::Free => {
                let p = DVec3::new(self.q[0], self.q[1], self.q[2]);
                let r = DVec3::new(self.q[3], self.q[4], self.q[5]);
                rigid_transform(&exp_rotation(r), p)
            }
        }
    }

    /// Columns of `S(q)` and `Ṡ(q, q̇)`.
    pub fn motion_subspace(&self) -> (Vec<Vec6>, Vec<Vec6>) {
        let zero = DVec3::ZERO;
        match self.kind {
            JointKind::Fixed => (Vec::new(), Vec::new()),
            JointKind::Revolute { axis } => (vec![join(axis, zero)], vec![[0.0; 6]]),
            JointKind::Prismatic { axis } => (vec![join(zero, axis)], vec![[0.0; 6]]),
            JointKind::Translational => (
                vec![join(zero, DVec3::X), join(zero, DVec3::Y), join(zero, DVec3::Z)],
                vec![[0.0; 6]; 3],
            ),
            JointKind::Spherical => {
                let r = DVec3::new(self.q[0], self.q[1], self.q[2]);
                let rdot = DVec3::new(self.qdot[0], self.qdot[1], self.qdot[2]);
                let jr = exp_right_jacobian(r);
                let jrd = exp_right_jacobian_dot(r, rdot);
                (
                    (0..3).map(|c| join(jr.col(c), zero)).collect(),
                    (0..3).map(|c| join(jrd.col(c), zero)).collect(),
                )
            }
            JointKind::Free => {
                let r = DVec3::new(self.q[3], self.q[4], self.q[5]);
                let rdot = DVec3::new(self.qdot[3], self.qdot[4], self.qdot[5]);
                let jr = exp_right_jacobian(r);
                let jrd = exp_right_jacobian_dot(r, rdot);
                let rt = exp_rotation(r).transpose();
                let rt_dot = -skew(jr * rdot) * rt;
                let mut s: Vec<Vec6> = (0..3).map(|c| join(zero, rt.col(c))).collect();
                s.extend((0..3).map(|c| join(jr.col(c), zero)));
                let mut sd: Vec<Vec6> = (0..3).map(|c| join(zero, rt_dot.col(c))).collect();
                sd.extend((0..3).map(|c| join(jrd.col(c), zero)));
                (s, sd)
            }
        }
    }

    /// Joint twist `S q̇` in the joint frame.
    pub fn relative_twist(&self, s: &[Vec6]) -> Vec6 {
        let mut out = [0.0; 6];
        for (col, &qd) in s.iter().zip(&self.qdot) {
            for k in 0..6 {
                out[k] += col[k] * qd;
            }
        }
        out
    }

    /// Wraps exponential coordinates back into `|r| ≤ π`, remapping `ṙ` so
    /// that the angular velocity `J_r(r) ṙ` is unchanged. Returns whether
    /// anything changed.
    pub fn reparam(&mut self) -> bool {
        let Some((at, r)) = self.rotation_coordinates() else {
            return false;
        };
        let Some(r_new) = exp_reparam(r) else {
            return false;
        };
        let rdot = DVec3::new(self.qdot[at], self.qdot[at + 1], self.qdot[at + 2]);
        let omega = exp_right_jacobian(r) * rdot;
        let rdot_new = exp_right_jacobian(r_new).inverse() * omega;
        for k in 0..3 {
            self.q[at + k] = r_new[k];
            self.qdot[at + k] = rdot_new[k];
        }
        true
    }

    /// Spring force `f_r = -k(q - q_rest)`.
    pub fn compute_force(&self, fr: &mut [f64]) {
        if self.stiffness == 0.0 {
            return;
        }
        for k in 0..self.dof() {
            fr[self.idx_r + k] -= self.stiffness * (self.q[k] - self.q_rest[k]);
        }
    }

    /// Spring stiffness `K_r = -k` on the diagonal.
    pub fn compute_stiffness(&self, kr: &mut Vec<Triplet>) {
        if self.stiffness == 0.0 {
            return;
        }
        for k in 0..self.dof() {
            let i = self.idx_r + k;
            kr.push(Triplet::new(i, i, -self.stiffness));
        }
    }

    /// Joint damping `d` on the diagonal.
    pub fn compute_damping(&self, dr: &mut Vec<Triplet>) {
        if self.damping == 0.0 {
            return;
        }
        for k in 0..self.dof() {
            let i = self.idx_r + k;
            dr.push(Triplet::new(i, i, self.damping));
        }
    }

    /// Spring potential `½ k |q - q_rest|²`.
    pub fn spring_energy(&self) -> f64 {
        0.5 * self.stiffness
            * self
                .q
                .iter()
                .zip(&self.q_rest)
                .map(|(q, r)| (q - r) * (q - r))
                .sum::<f64>()
    }
}
