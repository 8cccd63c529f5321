//! The simulated world: articulated tree, components and constraints.
//!
//! [`World::init`] fixes the topology. Maximal DOFs are numbered bodies
//! first (6 each), then every node of every component (3 each). Reduced
//! DOFs are numbered joints first, then free nodes. Constraint rows are
//! numbered per block in insertion order.
//!
//! Nodes are addressed globally by [`NodeId`], in component order; the node
//! table passed to springs and constraints is indexed the same way.

use mekano_material::InversionSettings;
use mekano_math::{DVec3, DenseMatrix};
use mekano_types::{BodyId, ComponentId, ConstraintId, JointId, MekanoError, MekanoResult, NodeId};
use tracing::{debug, info};

use crate::body::RigidBody;
use crate::component::{Component, Dynamics, Energy, NodeState, StepContext};
use crate::constraint::{Constraint, ConstraintBlock};
use crate::joint::Joint;
use crate::node::NodeKind;
use crate::tree::MultibodyTree;
use crate::workspace::{StepWorkspace, WorldSizes};

/// Every entity of a simulation.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub tree: MultibodyTree,
    pub components: Vec<Component>,
    pub constraints: Vec<Constraint>,
    /// Optional hyper-reduction basis `P` (`nr × nR`).
    pub projection: Option<DenseMatrix>,
    pub gravity: DVec3,
    /// Current simulation time.
    pub time: f64,
    nodes: Vec<NodeState>,
    sizes: WorldSizes,
    initialized: bool,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_body(&mut self, body: RigidBody) -> BodyId {
        self.initialized = false;
        self.tree.add_body(body)
    }

    pub fn add_joint(&mut self, joint: Joint) -> JointId {
        self.initialized = false;
        self.tree.add_joint(joint)
    }

    pub fn add_component(&mut self, component: impl Into<Component>) -> ComponentId {
        self.initialized = false;
        self.components.push(component.into());
        ComponentId((self.components.len() - 1) as u32)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        self.initialized = false;
        self.constraints.push(constraint);
        ConstraintId((self.constraints.len() - 1) as u32)
    }

    /// Sets the hyper-reduction basis.
    pub fn set_projection(&mut self, projection: DenseMatrix) {
        self.initialized = false;
        self.projection = Some(projection);
    }

    #[inline]
    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.index()]
    }

    #[inline]
    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.index()]
    }

    #[inline]
    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.index()]
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Sizes from the last [`init`](Self::init).
    #[inline]
    pub fn sizes(&self) -> WorldSizes {
        self.sizes
    }

    /// Node table from the last refresh.
    #[inline]
    pub fn nodes(&self) -> &[NodeState] {
        &self.nodes
    }

    /// Total number of nodes over all components.
    pub fn node_count(&self) -> usize {
        self.components.iter().map(|c| c.nodes().len()).sum()
    }

    /// Global id of node `local` of a component.
    pub fn node_id(&self, component: ComponentId, local: usize) -> MekanoResult<NodeId> {
        let c = component.index();
        let owned = self
            .components
            .get(c)
            .map(|comp| comp.nodes().len())
            .ok_or_else(|| MekanoError::InvalidConfig(format!("component {c} does not exist")))?;
        if local >= owned {
            return Err(MekanoError::InvalidConfig(format!(
                "node {local} out of range (component {c} has {owned})"
            )));
        }
        let base: usize = self.components[..c].iter().map(|comp| comp.nodes().len()).sum();
        Ok(NodeId((base + local) as u32))
    }

    /// Attaches nodes of a soft body to a rigid body at their current
    /// positions relative to the body's current pose.
    pub fn attach_nodes(
        &mut self,
        component: ComponentId,
        nodes: &[usize],
        body: BodyId,
    ) -> MekanoResult<()> {
        self.tree.init()?;
        let rigid = self
            .tree
            .bodies
            .get(body.index())
            .ok_or_else(|| MekanoError::InvalidConfig(format!("body {} does not exist", body.index())))?;
        let r_t = rigid.rotation().transpose();
        let p = rigid.position();
        let soft = self
            .components
            .get_mut(component.index())
            .and_then(Component::soft_body_mut)
            .ok_or_else(|| {
                MekanoError::InvalidConfig(format!(
                    "component {} has no nodes to attach",
                    component.index()
                ))
            })?;
        for &i in nodes {
            let x = soft
                .nodes
                .get(i)
                .map(|n| n.x)
                .ok_or_else(|| MekanoError::InvalidConfig(format!("node {i} out of range")))?;
            soft.attach_node(i, body, r_t * (x - p))?;
        }
        self.initialized = false;
        Ok(())
    }

    /// Validates the configuration and assigns every index.
    pub fn init(&mut self, inversion: &InversionSettings) -> MekanoResult<WorldSizes> {
        let mut nm = self.tree.init()?;
        let n_joint_dofs = self.tree.dof_count();
        let mut nr = n_joint_dofs;
        let body_count = self.tree.bodies.len();

        for component in &mut self.components {
            let name = component.name().to_owned();
            let Some(soft) = component.soft_body_mut() else {
                continue;
            };
            soft.inversion = *inversion;
            for node in &mut soft.nodes {
                node.idx_m = nm;
                nm += 3;
                node.idx_r = match node.kind {
                    NodeKind::Free => {
                        nr += 3;
                        Some(nr - 3)
                    }
                    NodeKind::Fixed => None,
                    NodeKind::Attached(att) => {
                        if att.body.index() >= body_count {
                            return Err(MekanoError::InvalidConfig(format!(
                                "'{name}' attaches a node to missing body {}",
                                att.body.index()
                            )));
                        }
                        None
                    }
                };
            }
        }

        let fixed_nodes: Vec<bool> = self
            .components
            .iter()
            .flat_map(|c| c.nodes().iter().map(|n| matches!(n.kind, NodeKind::Fixed)))
            .collect();
        let node_count = fixed_nodes.len();
        for component in &self.components {
            if let Component::Spring(spring) = component {
                if let Some(bad) = spring.node_ids().find(|n| n.index() >= node_count) {
                    return Err(MekanoError::InvalidConfig(format!(
                        "spring '{}' references node {} of {node_count}",
                        spring.name,
                        bad.index()
                    )));
                }
                if !(spring.stiffness >= 0.0 && spring.damping >= 0.0 && spring.rest_length >= 0.0)
                {
                    return Err(MekanoError::InvalidConfig(format!(
                        "spring '{}' needs non-negative stiffness, damping and rest length",
                        spring.name
                    )));
                }
            }
        }

        let (mut nem, mut ner, mut nim, mut nir) = (0, 0, 0, 0);
        for constraint in &mut self.constraints {
            constraint.validate(&self.tree, &fixed_nodes)?;
            let counter = match constraint.block() {
                ConstraintBlock::EqualityMaximal => &mut nem,
                ConstraintBlock::EqualityReduced => &mut ner,
                ConstraintBlock::InequalityMaximal => &mut nim,
                ConstraintBlock::InequalityReduced => &mut nir,
            };
            constraint.row = *counter;
            *counter += constraint.rows();
        }

        if let Some(p) = &self.projection {
            if p.rows != nr || p.cols == 0 || p.cols > nr {
                return Err(MekanoError::InvalidConfig(format!(
                    "projection must be {nr} x k with 0 < k <= {nr}, got {} x {}",
                    p.rows, p.cols
                )));
            }
        }

        self.sizes = WorldSizes {
            nm,
            nr,
            n_joint_dofs,
            nem,
            ner,
            nim,
            nir,
        };
        self.refresh();
        self.initialized = true;
        info!(
            bodies = body_count,
            nodes = node_count,
            nm,
            nr,
            equality_rows = nem + ner,
            inequality_rows = nim + nir,
            "World initialized"
        );
        Ok(self.sizes)
    }

    /// Read-only view for assembly.
    pub fn context(&self) -> StepContext<'_> {
        StepContext {
            tree: &self.tree,
            nodes: &self.nodes,
            gravity: self.gravity,
            time: self.time,
        }
    }

    /// Refreshes derived state (attached nodes, element stress) and the node table.
    pub fn refresh(&mut self) {
        let ctx = StepContext {
            tree: &self.tree,
            nodes: &self.nodes,
            gravity: self.gravity,
            time: self.time,
        };
        for component in &mut self.components {
            component.as_dynamics_mut().update(&ctx);
        }
        self.nodes.clear();
        for component in &self.components {
            self.nodes.extend(component.nodes().iter().map(|n| NodeState {
                x: n.x,
                v: n.v,
                idx_m: n.idx_m,
            }));
        }
    }

    /// Stacked state `y = [q; q̇]` of length `2 nr`.
    pub fn gather_state(&self) -> Vec<f64> {
        let nr = self.sizes.nr;
        let mut y = vec![0.0; 2 * nr];
        self.tree.gather_dofs(&mut y, nr);
        for component in &self.components {
            component.as_dynamics().gather_dofs(&mut y, nr);
        }
        y
    }

    /// Stacked derivative `ẏ = [q̇; q̈]`.
    pub fn gather_ddofs(&self) -> Vec<f64> {
        let nr = self.sizes.nr;
        let mut ydot = vec![0.0; 2 * nr];
        self.tree.gather_ddofs(&mut ydot, nr);
        for component in &self.components {
            component.as_dynamics().gather_ddofs(&mut ydot, nr);
        }
        ydot
    }

    /// Writes `y` into every entity and refreshes kinematics and derived state.
    pub fn scatter_state(&mut self, y: &[f64]) -> MekanoResult<()> {
        let nr = self.sizes.nr;
        if y.len() != 2 * nr {
            return Err(MekanoError::InvalidState(format!(
                "state has length {}, expected {}",
                y.len(),
                2 * nr
            )));
        }
        self.tree.scatter_dofs(y, nr);
        self.tree.update_kinematics();
        for component in &mut self.components {
            component.as_dynamics_mut().scatter_dofs(y, nr);
        }
        self.refresh();
        Ok(())
    }

    /// Writes `ẏ` into every entity.
    pub fn scatter_ddofs(&mut self, ydot: &[f64]) -> MekanoResult<()> {
        let nr = self.sizes.nr;
        if ydot.len() != 2 * nr {
            return Err(MekanoError::InvalidState(format!(
                "derivative has length {}, expected {}",
                ydot.len(),
                2 * nr
            )));
        }
        self.tree.scatter_ddofs(ydot, nr);
        for component in &mut self.components {
            component.as_dynamics_mut().scatter_ddofs(ydot, nr);
        }
        Ok(())
    }

    /// Wraps exponential coordinates. Returns the number of joints changed.
    pub fn reparam(&mut self) -> usize {
        let changed = self.tree.reparam();
        if changed > 0 {
            debug!(joints = changed, "Reparametrized joints");
            self.tree.update_kinematics();
            self.refresh();
        }
        changed
    }

    /// Evaluates every constraint block into the workspace.
    pub fn compute_constraints(&mut self, ws: &mut StepWorkspace) {
        let ctx = StepContext {
            tree: &self.tree,
            nodes: &self.nodes,
            gravity: self.gravity,
            time: self.time,
        };
        for constraint in &mut self.constraints {
            match constraint.block() {
                ConstraintBlock::EqualityMaximal => constraint.compute_jac_eq_m(&ctx, &mut ws.eq_m),
                ConstraintBlock::EqualityReduced => constraint.compute_jac_eq_r(&ctx, &mut ws.eq_r),
                ConstraintBlock::InequalityMaximal => {
                    constraint.compute_jac_ineq_m(&ctx, &mut ws.ineq_m)
                }
                ConstraintBlock::InequalityReduced => {
                    constraint.compute_jac_ineq_r(&ctx, &mut ws.ineq_r)
                }
            }
        }
    }

    /// Largest equality residual `|g|` or inequality violation `max(c, 0)`.
    pub fn constraint_violation(&mut self) -> f64 {
        let mut ws = StepWorkspace::new(&self.sizes);
        self.compute_constraints(&mut ws);
        let eq = ws.eq_m.value.iter().chain(&ws.eq_r.value).map(|g| g.abs());
        let ineq = ws.ineq_m.value.iter().chain(&ws.ineq_r.value).map(|c| c.max(0.0));
        eq.chain(ineq).fold(0.0, f64::max)
    }

    /// Energy of every entity at the current state.
    pub fn compute_energy(&self) -> Energy {
        let ctx = self.context();
        let mut energy = Energy::default();
        self.tree.compute_energy(&ctx, &mut energy);
        for component in &self.components {
            component.as_dynamics().compute_energy(&ctx, &mut energy);
        }
        energy
    }
}
