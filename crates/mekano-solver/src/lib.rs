//! # mekano-solver
//!
//! Reduced-coordinate implicit solver coupling an articulated tree of rigid
//! bodies, hyperelastic soft bodies, springs and constraints.
//!
//! ## Key Types
//!
//! - [`World`] — owns the tree, the components and the constraints
//! - [`Dynamics`] — capability interface every entity implements
//! - [`Solver`] — implicit Euler stepping (`dynamics(y)`, `solve()`)
//! - [`ReducedSystem`] — assembled step system in reduced coordinates
//! - [`VelocitySolve`] — pluggable velocity solve (unconstrained, KKT, QP)
//! - [`Solution`] — trajectory buffer with time search and interpolation
//! - [`SolverConfig`] — timestep, methods, tolerances

pub mod assembly;
pub mod body;
pub mod component;
pub mod config;
pub mod constraint;
pub mod embedding;
pub mod joint;
pub mod node;
pub mod soft_body;
pub mod solution;
pub mod solver;
pub mod spring;
pub mod strategy;
pub mod tetrahedron;
pub mod tree;
pub mod workspace;
pub mod world;

pub use assembly::ReducedSystem;
pub use body::RigidBody;
pub use component::{Component, Dynamics, Energy, NodeState, StepContext};
pub use config::{LinearMethod, SolverConfig, UnconstrainedMethod};
pub use constraint::{Constraint, ConstraintBlock, ConstraintKind};
pub use embedding::MeshEmbedding;
pub use joint::{Joint, JointKind};
pub use node::{Node, NodeKind};
pub use soft_body::SoftBody;
pub use solution::Solution;
pub use solver::{Solver, StepReport};
pub use spring::{Spring, SpringEnd};
pub use strategy::{KktSolve, QpSolve, UnconstrainedSolve, VelocitySolution, VelocitySolve};
pub use tetrahedron::Tetrahedron;
pub use tree::MultibodyTree;
pub use workspace::{StepCache, StepWorkspace, WorldSizes};
pub use world::World;
