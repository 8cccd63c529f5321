//! Strongly-typed identifiers for simulation entities.
//!
//! Newtype wrappers prevent accidental mixing of body indices
//! with joint indices or node indices.

use serde::{Deserialize, Serialize};

/// Index of a rigid body inside the articulated tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// Index of a joint inside the articulated tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointId(pub u32);

/// Global node index, assigned across all deformable components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Index into the world's component list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

/// Index into the world's constraint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub u32);

macro_rules! impl_index {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// Returns the raw index as `usize` for array indexing.
                #[inline]
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }

            impl From<u32> for $name {
                fn from(val: u32) -> Self {
                    Self(val)
                }
            }
        )*
    };
}

impl_index!(BodyId, JointId, NodeId, ComponentId, ConstraintId);
