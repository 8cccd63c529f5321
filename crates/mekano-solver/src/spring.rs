//! Zero-mass linear springs between nodes or from a node to a world anchor.

use serde::{Deserialize, Serialize};

use mekano_math::mat3::outer;
use mekano_math::{DMat3, DVec3, Triplet};
use mekano_types::constants::EPSILON;
use mekano_types::NodeId;

use crate::component::{Dynamics, Energy, StepContext};
use crate::workspace::StepWorkspace;

/// Second endpoint of a spring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpringEnd {
    Node(NodeId),
    World(DVec3),
}

/// A linear spring with optional axial damping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub name: String,
    /// First endpoint (global node id).
    pub a: NodeId,
    pub b: SpringEnd,
    pub stiffness: f64,
    pub damping: f64,
    pub rest_length: f64,
}

fn push_block(out: &mut Vec<Triplet>, row: usize, col: usize, m: &DMat3) {
    for r in 0..3 {
        for c in 0..3 {
            let v = m.col(c)[r];
            if v != 0.0 {
                out.push(Triplet::new(row + r, col + c, v));
            }
        }
    }
}

impl Spring {
    /// A spring between two nodes.
    pub fn between(
        name: impl Into<String>,
        a: NodeId,
        b: NodeId,
        stiffness: f64,
        rest_length: f64,
    ) -> Self {
        Self {
            name: name.into(),
            a,
            b: SpringEnd::Node(b),
            stiffness,
            damping: 0.0,
            rest_length,
        }
    }

    /// A spring from a node to a fixed world point.
    pub fn to_anchor(
        name: impl Into<String>,
        a: NodeId,
        anchor: DVec3,
        stiffness: f64,
        rest_length: f64,
    ) -> Self {
        Self {
            name: name.into(),
            a,
            b: SpringEnd::World(anchor),
            stiffness,
            damping: 0.0,
            rest_length,
        }
    }

    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Global node ids referenced by this spring.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        let b = match self.b {
            SpringEnd::Node(n) => Some(n),
            SpringEnd::World(_) => None,
        };
        std::iter::once(self.a).chain(b)
    }

    /// `(x_a, idx_a, x_b, idx_b)`; `idx_b` is `None` for a world anchor.
    fn endpoints(&self, ctx: &StepContext<'_>) -> (DVec3, usize, DVec3, Option<usize>) {
        let a = &ctx.nodes[self.a.index()];
        match self.b {
            SpringEnd::Node(id) => {
                let b = &ctx.nodes[id.index()];
                (a.x, a.idx_m, b.x, Some(b.idx_m))
            }
            SpringEnd::World(p) => (a.x, a.idx_m, p, None),
        }
    }

    /// Current length.
    pub fn length(&self, ctx: &StepContext<'_>) -> f64 {
        let (xa, _, xb, _) = self.endpoints(ctx);
        (xa - xb).length()
    }
}

impl Dynamics for Spring {
    fn compute_force(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        let (xa, ia, xb, ib) = self.endpoints(ctx);
        let d = xa - xb;
        let l = d.length();
        if l < EPSILON {
            return;
        }
        let f = d / l * (-self.stiffness * (l - self.rest_length));
        for k in 0..3 {
            ws.fm[ia + k] += f[k];
            if let Some(ib) = ib {
                ws.fm[ib + k] -= f[k];
            }
        }
    }

    fn compute_stiffness_sparse(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        let (xa, ia, xb, ib) = self.endpoints(ctx);
        let d = xa - xb;
        let l = d.length();
        let k = if l < EPSILON {
            DMat3::IDENTITY * -self.stiffness
        } else {
            let n = d / l;
            let nn = outer(n, n);
            ((DMat3::IDENTITY - nn) * (1.0 - self.rest_length / l) + nn) * -self.stiffness
        };
        push_block(&mut ws.km, ia, ia, &k);
        if let Some(ib) = ib {
            push_block(&mut ws.km, ib, ib, &k);
            push_block(&mut ws.km, ia, ib, &-k);
            push_block(&mut ws.km, ib, ia, &-k);
        }
    }

    fn compute_force_damping_sparse(&self, ctx: &StepContext<'_>, ws: &mut StepWorkspace) {
        if self.damping == 0.0 {
            return;
        }
        let (xa, ia, xb, ib) = self.endpoints(ctx);
        let d = xa - xb;
        let l = d.length();
        if l < EPSILON {
            return;
        }
        let n = d / l;
        let dmat = outer(n, n) * self.damping;
        push_block(&mut ws.dm, ia, ia, &dmat);
        if let Some(ib) = ib {
            push_block(&mut ws.dm, ib, ib, &dmat);
            push_block(&mut ws.dm, ia, ib, &-dmat);
            push_block(&mut ws.dm, ib, ia, &-dmat);
        }
    }

    fn compute_energy(&self, ctx: &StepContext<'_>, energy: &mut Energy) {
        let stretch = self.length(ctx) - self.rest_length;
        energy.elastic += 0.5 * self.stiffness * stretch * stretch;
    }
}
