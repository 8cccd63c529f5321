//! Capability interface shared by every simulated entity.
//!
//! The assembler never knows which concrete entity it talks to: each one
//! implements [`Dynamics`] and appends its mass, forces, stiffness, damping
//! and Jacobian rows to caller-owned accumulators. Every method has a no-op
//! default, so an entity only implements what it contributes.
//!
//! The articulated tree implements the trait directly; all other entities
//! live in one `Vec<Component>`.

use serde::{Deserialize, Serialize};

use mekano_math::{DVec3, Triplet};

use crate::embedding::MeshEmbedding;
use crate::node::Node;
use crate::soft_body::SoftBody;
use crate::spring::Spring;
use crate::tree::MultibodyTree;
use crate::workspace::StepWorkspace;

/// World-space state of one node, indexed by global node id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeState {
    pub x: DVec3,
    pub v: DVec3,
    pub idx_m: usize,
}

/// Read-only view of the world passed to every entity during assembly.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub tree: &'a MultibodyTree,
    pub nodes: &'a [NodeState],
    pub gravity: DVec3,
    pub time: f64,
}

/// Energy split by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub kinetic: f64,
    /// Gravitational potential.
    pub potential: f64,
    /// Elastic and spring potential.
    pub elastic: f64,
}

impl Energy {
    #[inline]
    pub fn total(&self) -> f64 {
        self.kinetic + self.potential + self.elastic
    }
}

/// Contributions of one entity to the step system.
pub trait Dynamics {
    /// Appends the maximal mass matrix (once, at step 0).
    fn compute_mass_sparse(&self, _mm: &mut Vec<Triplet>) {}

    /// Appends Jacobian rows that never change (once, at step 0).
    fn compute_constant_jacobian(&self, _j: &mut Vec<Triplet>) {}

    /// Adds maximal forces into `ws.fm` and reduced forces into `ws.fr`.
    fn compute_force(&self, _ctx: &StepContext<'_>, _ws: &mut StepWorkspace) {}

    /// Appends stiffness triplets.
    fn compute_stiffness_sparse(&self, _ctx: &StepContext<'_>, _ws: &mut StepWorkspace) {}

    /// Appends damping triplets.
    fn compute_force_damping_sparse(&self, _ctx: &StepContext<'_>, _ws: &mut StepWorkspace) {}

    /// Appends this step's Jacobian and `J̇` rows.
    fn compute_jacobian_sparse(&self, _ctx: &StepContext<'_>, _ws: &mut StepWorkspace) {}

    /// Writes owned positions into `y[..nr]` and velocities into `y[nr..]`.
    fn gather_dofs(&self, _y: &mut [f64], _nr: usize) {}

    /// Writes owned velocities into `ydot[..nr]` and accelerations into `ydot[nr..]`.
    fn gather_ddofs(&self, _ydot: &mut [f64], _nr: usize) {}

    /// Reads owned positions and velocities from `y`.
    fn scatter_dofs(&mut self, _y: &[f64], _nr: usize) {}

    /// Reads owned velocities and accelerations from `ydot`.
    fn scatter_ddofs(&mut self, _ydot: &[f64], _nr: usize) {}

    /// Refreshes state derived from the DOFs (attached nodes, element stress).
    fn update(&mut self, _ctx: &StepContext<'_>) {}

    /// Adds this entity's energy.
    fn compute_energy(&self, _ctx: &StepContext<'_>, _energy: &mut Energy) {}
}

/// Every non-tree entity kind.
#[derive(Debug, Clone)]
pub enum Component {
    SoftBody(SoftBody),
    Embedding(MeshEmbedding),
    Spring(Spring),
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Self::SoftBody(s) => &s.name,
            Self::Embedding(e) => &e.coarse.name,
            Self::Spring(s) => &s.name,
        }
    }

    pub fn as_dynamics(&self) -> &dyn Dynamics {
        match self {
            Self::SoftBody(s) => s,
            Self::Embedding(e) => e,
            Self::Spring(s) => s,
        }
    }

    pub fn as_dynamics_mut(&mut self) -> &mut dyn Dynamics {
        match self {
            Self::SoftBody(s) => s,
            Self::Embedding(e) => e,
            Self::Spring(s) => s,
        }
    }

    /// The deformable body owning nodes, if any.
    pub fn soft_body(&self) -> Option<&SoftBody> {
        match self {
            Self::SoftBody(s) => Some(s),
            Self::Embedding(e) => Some(&e.coarse),
            Self::Spring(_) => None,
        }
    }

    pub fn soft_body_mut(&mut self) -> Option<&mut SoftBody> {
        match self {
            Self::SoftBody(s) => Some(s),
            Self::Embedding(e) => Some(&mut e.coarse),
            Self::Spring(_) => None,
        }
    }

    /// Nodes owned by this component.
    pub fn nodes(&self) -> &[Node] {
        self.soft_body().map(|s| s.nodes.as_slice()).unwrap_or(&[])
    }
}

impl From<SoftBody> for Component {
    fn from(s: SoftBody) -> Self {
        Self::SoftBody(s)
    }
}

impl From<MeshEmbedding> for Component {
    fn from(e: MeshEmbedding) -> Self {
        Self::Embedding(e)
    }
}

impl From<Spring> for Component {
    fn from(s: Spring) -> Self {
        Self::Spring(s)
    }
}
