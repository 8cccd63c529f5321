//! Bilateral and unilateral constraints.
//!
//! Each constraint kind lives in exactly one of four row blocks, chosen by
//! the coordinates its Jacobian is written in and whether it is an equality
//! or an inequality:
//!
//! | Kind | Block | Rows |
//! |---|---|---|
//! | `Loop` | maximal equality | 3 |
//! | `NodeAnchor` | maximal equality | 3 |
//! | `PrescribedJoint` | reduced equality | 1 |
//! | `JointLimit` | reduced inequality | 2 |
//! | `NodeHalfspace` | maximal inequality | 1 |
//!
//! Equalities are `g = 0` with `ġ` the explicit time partial. Inequalities
//! are `c ≤ 0`; a row takes part in the solve when `c ≥ -tolerance`.
//! Multipliers come back as velocity-level impulses `λ`; the stored force is
//! `-λ/h`.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use mekano_math::mat3::skew;
use mekano_math::{DMat3, DVec3, Triplet};
use mekano_types::{BodyId, JointId, MekanoError, MekanoResult, NodeId};

use crate::component::StepContext;
use crate::tree::MultibodyTree;
use crate::workspace::ConstraintRows;

/// Default activation tolerance of inequality rows.
pub const DEFAULT_ACTIVATION_TOLERANCE: f64 = 1e-3;

/// Row block a constraint contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintBlock {
    EqualityMaximal,
    EqualityReduced,
    InequalityMaximal,
    InequalityReduced,
}

impl ConstraintBlock {
    #[inline]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::EqualityMaximal | Self::EqualityReduced)
    }
}

/// Constraint type and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Point `point_a` on `body_a` coincides with `point_b` on `body_b`, or
    /// with the world point `point_b` when `body_b` is `None`.
    Loop {
        body_a: BodyId,
        point_a: DVec3,
        body_b: Option<BodyId>,
        point_b: DVec3,
    },
    /// A node pinned to a world point.
    NodeAnchor { node: NodeId, target: DVec3 },
    /// `q_j(t) = target + amplitude · sin(2π · frequency · t)`.
    PrescribedJoint {
        joint: JointId,
        coordinate: usize,
        target: f64,
        amplitude: f64,
        frequency: f64,
    },
    /// `lower ≤ q_j ≤ upper`.
    JointLimit {
        joint: JointId,
        coordinate: usize,
        lower: f64,
        upper: f64,
    },
    /// A node stays on the side of the plane its normal points to.
    NodeHalfspace {
        node: NodeId,
        point: DVec3,
        normal: DVec3,
    },
}

impl ConstraintKind {
    pub fn block(&self) -> ConstraintBlock {
        match self {
            Self::Loop { .. } | Self::NodeAnchor { .. } => ConstraintBlock::EqualityMaximal,
            Self::PrescribedJoint { .. } => ConstraintBlock::EqualityReduced,
            Self::JointLimit { .. } => ConstraintBlock::InequalityReduced,
            Self::NodeHalfspace { .. } => ConstraintBlock::InequalityMaximal,
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        match self {
            Self::Loop { .. } | Self::NodeAnchor { .. } => 3,
            Self::PrescribedJoint { .. } | Self::NodeHalfspace { .. } => 1,
            Self::JointLimit { .. } => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Loop { .. } => "loop",
            Self::NodeAnchor { .. } => "node_anchor",
            Self::PrescribedJoint { .. } => "prescribed_joint",
            Self::JointLimit { .. } => "joint_limit",
            Self::NodeHalfspace { .. } => "node_halfspace",
        }
    }
}

/// A constraint with its row offset, activity and last force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    /// First row within the constraint's block, assigned at init.
    pub row: usize,
    /// Activity of each row from the last evaluation.
    pub active: Vec<bool>,
    /// Constraint force of each row from the last solve (`-λ/h`).
    pub force: Vec<f64>,
    /// Inequality rows with `c ≥ -activation_tolerance` are active.
    pub activation_tolerance: f64,
}

/// Appends `R [-p̂ 1]`, scaled by `sign`, at a body's six columns.
fn push_point_jacobian(
    out: &mut Vec<Triplet>,
    row: usize,
    idx_m: usize,
    r: DMat3,
    local: DVec3,
    sign: f64,
) {
    let angular = r * -skew(local);
    for i in 0..3 {
        for c in 0..3 {
            let a = angular.col(c)[i] * sign;
            if a != 0.0 {
                out.push(Triplet::new(row + i, idx_m + c, a));
            }
            let l = r.col(c)[i] * sign;
            if l != 0.0 {
                out.push(Triplet::new(row + i, idx_m + 3 + c, l));
            }
        }
    }
}

impl Constraint {
    pub fn new(name: impl Into<String>, kind: ConstraintKind) -> Self {
        let rows = kind.rows();
        let kind = match kind {
            ConstraintKind::NodeHalfspace {
                node,
                point,
                normal,
            } => ConstraintKind::NodeHalfspace {
                node,
                point,
                normal: normal.normalize_or_zero(),
            },
            other => other,
        };
        Self {
            name: name.into(),
            kind,
            row: 0,
            active: vec![false; rows],
            force: vec![0.0; rows],
            activation_tolerance: DEFAULT_ACTIVATION_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_activation_tolerance(mut self, tolerance: f64) -> Self {
        self.activation_tolerance = tolerance;
        self
    }

    #[inline]
    pub fn block(&self) -> ConstraintBlock {
        self.kind.block()
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.kind.rows()
    }

    /// Checks references against the world topology. `fixed_nodes` has one
    /// entry per global node; node constraints on a fixed node are rejected
    /// since their Jacobian row is zero.
    pub fn validate(&self, tree: &MultibodyTree, fixed_nodes: &[bool]) -> MekanoResult<()> {
        let fail = |msg: String| {
            Err(MekanoError::InvalidConfig(format!(
                "constraint '{}' ({}): {msg}",
                self.name,
                self.kind.name()
            )))
        };
        let check_body = |b: BodyId| b.index() < tree.bodies.len();
        let check_joint = |j: JointId, coordinate: usize| {
            tree.joints
                .get(j.index())
                .is_some_and(|joint| coordinate < joint.dof())
        };
        match self.kind {
            ConstraintKind::Loop { body_a, body_b, .. } => {
                if !check_body(body_a) || body_b.is_some_and(|b| !check_body(b)) {
                    return fail("references a missing body".into());
                }
            }
            ConstraintKind::NodeAnchor { node, .. } => match fixed_nodes.get(node.index()) {
                None => return fail(format!("node {} out of range", node.index())),
                Some(true) => return fail(format!("node {} is fixed", node.index())),
                Some(false) => {}
            },
            ConstraintKind::NodeHalfspace { node, normal, .. } => {
                match fixed_nodes.get(node.index()) {
                    None => return fail(format!("node {} out of range", node.index())),
                    Some(true) => return fail(format!("node {} is fixed", node.index())),
                    Some(false) => {}
                }
                if normal == DVec3::ZERO {
                    return fail("zero plane normal".into());
                }
            }
            ConstraintKind::PrescribedJoint {
                joint, coordinate, ..
            } => {
                if !check_joint(joint, coordinate) {
                    return fail(format!("joint coordinate {coordinate} does not exist"));
                }
            }
            ConstraintKind::JointLimit {
                joint,
                coordinate,
                lower,
                upper,
            } => {
                if !check_joint(joint, coordinate) {
                    return fail(format!("joint coordinate {coordinate} does not exist"));
                }
                if !(lower <= upper) {
                    return fail(format!("empty range [{lower}, {upper}]"));
                }
            }
        }
        if !(self.activation_tolerance >= 0.0) {
            return fail("activation tolerance must be non-negative".into());
        }
        Ok(())
    }

    /// Evaluates a maximal equality constraint into `rows`.
    pub fn compute_jac_eq_m(&mut self, ctx: &StepContext<'_>, rows: &mut ConstraintRows) {
        let row = self.row;
        match self.kind {
            ConstraintKind::Loop {
                body_a,
                point_a,
                body_b,
                point_b,
            } => {
                let a = ctx.tree.body(body_a);
                push_point_jacobian(&mut rows.jacobian, row, a.idx_m, a.rotation(), point_a, 1.0);
                let mut g = a.world_point(point_a);
                match body_b {
                    Some(id) => {
                        let b = ctx.tree.body(id);
                        push_point_jacobian(
                            &mut rows.jacobian,
                            row,
                            b.idx_m,
                            b.rotation(),
                            point_b,
                            -1.0,
                        );
                        g -= b.world_point(point_b);
                    }
                    None => g -= point_b,
                }
                self.write_rows(rows, &g.to_array(), &[0.0; 3]);
            }
            ConstraintKind::NodeAnchor { node, target } => {
                let n = &ctx.nodes[node.index()];
                for k in 0..3 {
                    rows.jacobian.push(Triplet::new(row + k, n.idx_m + k, 1.0));
                }
                self.write_rows(rows, &(n.x - target).to_array(), &[0.0; 3]);
            }
            _ => {}
        }
    }

    /// Evaluates a reduced equality constraint into `rows`.
    pub fn compute_jac_eq_r(&mut self, ctx: &StepContext<'_>, rows: &mut ConstraintRows) {
        if let ConstraintKind::PrescribedJoint {
            joint,
            coordinate,
            target,
            amplitude,
            frequency,
        } = self.kind
        {
            let j = ctx.tree.joint(joint);
            let phase = TAU * frequency * ctx.time;
            let g = j.q[coordinate] - (target + amplitude * phase.sin());
            let gdot = -amplitude * TAU * frequency * phase.cos();
            rows.jacobian
                .push(Triplet::new(self.row, j.idx_r + coordinate, 1.0));
            self.write_rows(rows, &[g], &[gdot]);
        }
    }

    /// Evaluates a maximal inequality constraint and its active flags.
    pub fn compute_jac_ineq_m(&mut self, ctx: &StepContext<'_>, rows: &mut ConstraintRows) {
        if let ConstraintKind::NodeHalfspace {
            node,
            point,
            normal,
        } = self.kind
        {
            let n = &ctx.nodes[node.index()];
            let c = -normal.dot(n.x - point);
            for k in 0..3 {
                if normal[k] != 0.0 {
                    rows.jacobian
                        .push(Triplet::new(self.row, n.idx_m + k, -normal[k]));
                }
            }
            self.write_rows(rows, &[c], &[0.0]);
        }
    }

    /// Evaluates a reduced inequality constraint and its active flags.
    pub fn compute_jac_ineq_r(&mut self, ctx: &StepContext<'_>, rows: &mut ConstraintRows) {
        if let ConstraintKind::JointLimit {
            joint,
            coordinate,
            lower,
            upper,
        } = self.kind
        {
            let j = ctx.tree.joint(joint);
            let q = j.q[coordinate];
            let col = j.idx_r + coordinate;
            rows.jacobian.push(Triplet::new(self.row, col, -1.0));
            rows.jacobian.push(Triplet::new(self.row + 1, col, 1.0));
            self.write_rows(rows, &[lower - q, q - upper], &[0.0, 0.0]);
        }
    }

    /// Stores residuals and activity; equality rows are always active.
    fn write_rows(&mut self, rows: &mut ConstraintRows, value: &[f64], rate: &[f64]) {
        let equality = self.block().is_equality();
        for (k, (&v, &r)) in value.iter().zip(rate).enumerate() {
            let active = equality || v >= -self.activation_tolerance;
            self.active[k] = active;
            rows.value[self.row + k] = v;
            rows.rate[self.row + k] = r;
            rows.active[self.row + k] = active;
        }
    }

    /// Block rows of this constraint that are active, in order.
    pub fn active_rows(&self) -> Vec<usize> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(k, &a)| a.then_some(self.row + k))
            .collect()
    }

    /// Block rows of an equality constraint (all of them).
    pub fn eq_active_rows(&self) -> Vec<usize> {
        if self.block().is_equality() {
            (self.row..self.row + self.rows()).collect()
        } else {
            Vec::new()
        }
    }

    /// Reads multipliers of a maximal equality constraint.
    pub fn scatter_force_eq_m(&mut self, lambda: &[f64], h: f64) {
        if self.block() == ConstraintBlock::EqualityMaximal {
            self.store_force(lambda, h);
        }
    }

    /// Reads multipliers of a reduced equality constraint.
    pub fn scatter_force_eq_r(&mut self, lambda: &[f64], h: f64) {
        if self.block() == ConstraintBlock::EqualityReduced {
            self.store_force(lambda, h);
        }
    }

    /// Reads multipliers of a maximal inequality constraint.
    pub fn scatter_force_ineq_m(&mut self, lambda: &[f64], h: f64) {
        if self.block() == ConstraintBlock::InequalityMaximal {
            self.store_force(lambda, h);
        }
    }

    /// Reads multipliers of a reduced inequality constraint.
    pub fn scatter_force_ineq_r(&mut self, lambda: &[f64], h: f64) {
        if self.block() == ConstraintBlock::InequalityReduced {
            self.store_force(lambda, h);
        }
    }

    /// `lambda` is indexed by block row; inactive rows carry zero.
    fn store_force(&mut self, lambda: &[f64], h: f64) {
        for k in 0..self.rows() {
            self.force[k] = if self.active[k] {
                -lambda[self.row + k] / h
            } else {
                0.0
            };
        }
    }
}
