//! Point masses of the deformable components.
//!
//! A node lives in maximal coordinates (3 DOFs at `idx_m`). How it maps to
//! reduced coordinates depends on its [`NodeKind`]:
//!
//! | Kind | Reduced DOFs | Jacobian rows |
//! |---|---|---|
//! | `Free` | 3 at `idx_r` | `I` (constant) |
//! | `Fixed` | none | zero |
//! | `Attached` | none | `R[-x̂ 1]J_b` (per step) |

use serde::{Deserialize, Serialize};

use mekano_math::se3::{rotation, split, translation};
use mekano_math::DVec3;
use mekano_types::BodyId;

use crate::body::RigidBody;

/// A node rigidly attached to a body at a body-local point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Body the node follows.
    pub body: BodyId,
    /// Node position in the body frame.
    pub local: DVec3,
}

/// How a node is parametrized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Free,
    Fixed,
    Attached(Attachment),
}

/// A deformable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Rest (material) position.
    pub x0: DVec3,
    /// Current world position.
    pub x: DVec3,
    /// Current world velocity.
    pub v: DVec3,
    /// Lumped mass.
    pub mass: f64,
    pub kind: NodeKind,
    /// Offset of the node's 3 maximal DOFs.
    pub idx_m: usize,
    /// Offset of the node's 3 reduced DOFs (free nodes only).
    pub idx_r: Option<usize>,
}

impl Node {
    /// A free node at rest at `x0`.
    pub fn new(x0: DVec3) -> Self {
        Self {
            x0,
            x: x0,
            v: DVec3::ZERO,
            mass: 0.0,
            kind: NodeKind::Free,
            idx_m: 0,
            idx_r: None,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self.kind, NodeKind::Free)
    }

    /// Moves an attached node with its body.
    pub fn follow(&mut self, body: &RigidBody, local: DVec3) {
        let r = rotation(&body.e_wi);
        let (w, v) = split(&body.phi);
        self.x = r * local + translation(&body.e_wi);
        self.v = r * (w.cross(local) + v);
    }
}
