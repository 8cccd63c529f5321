//! Benchmark scenarios — procedural worlds + solver config for each test case.
//!
//! Four canonical scenarios for regression testing:
//! 1. **Free fall** — A spinning rigid box on a free joint
//! 2. **Pendulum** — Revolute chain closed by a loop constraint
//! 3. **Soft block** — Tetrahedral beam clamped at one end, sagging under gravity
//! 4. **Hybrid attach** — Soft block hanging from a swinging rod above a floor

use serde::{Deserialize, Serialize};

use mekano_material::{MaterialModel, SolidProperties};
use mekano_math::se3::translation_transform;
use mekano_math::{DMat4, DVec3};
use mekano_mesh::generators::tet_block;
use mekano_solver::{
    Constraint, ConstraintKind, Joint, JointKind, RigidBody, SoftBody, SolverConfig, World,
};
use mekano_types::{BodyId, MekanoResult, NodeId};

/// Which benchmark scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioKind {
    /// Spinning rigid box in free fall.
    FreeFall,
    /// Three-link chain with its tip pinned to the world.
    Pendulum,
    /// Tet beam clamped at one end.
    SoftBlock,
    /// Tet block attached to a swinging rod, with a floor.
    HybridAttach,
}

impl ScenarioKind {
    /// Returns all scenario kinds.
    pub fn all() -> &'static [ScenarioKind] {
        &[
            ScenarioKind::FreeFall,
            ScenarioKind::Pendulum,
            ScenarioKind::SoftBlock,
            ScenarioKind::HybridAttach,
        ]
    }

    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::FreeFall => "free_fall",
            ScenarioKind::Pendulum => "pendulum",
            ScenarioKind::SoftBlock => "soft_block",
            ScenarioKind::HybridAttach => "hybrid_attach",
        }
    }
}

/// A fully specified benchmark scenario.
pub struct Scenario {
    /// Scenario type.
    pub kind: ScenarioKind,
    /// World at its initial state (not yet initialized).
    pub world: World,
    /// Solver configuration.
    pub config: SolverConfig,
    /// Number of timesteps to simulate.
    pub timesteps: u32,
}

/// Compliant foam-like solid, stable at the default timestep.
fn foam() -> SolidProperties {
    SolidProperties {
        name: "foam".into(),
        density: 100.0,
        youngs_modulus: 5.0e3,
        poisson_ratio: 0.25,
        model: MaterialModel::CoRotated,
        damping: 0.0,
    }
}

/// Slender link along y with its frame at the center of mass.
fn link(name: &str) -> RigidBody {
    RigidBody::cuboid(name, DVec3::new(0.1, 1.0, 0.1), 10.0)
}

/// World pose of the last child of a serial chain.
fn chain_pose(joints: &[Joint]) -> DMat4 {
    joints
        .iter()
        .fold(DMat4::IDENTITY, |e, j| e * j.e_pj0 * j.local_transform() * j.e_ji)
}

fn config(dt: f64, timesteps: u32) -> SolverConfig {
    SolverConfig::default()
        .with_dt(dt)
        .with_t_span(0.0, dt * f64::from(timesteps))
}

impl Scenario {
    /// A 1 m cube on a free joint, thrown sideways while spinning.
    pub fn free_fall() -> MekanoResult<Self> {
        let mut world = World::new();
        let body = world.add_body(RigidBody::cuboid("box", DVec3::ONE, 1.0));
        world.add_joint(
            Joint::new("free", JointKind::Free, None, body)
                .with_state(&[0.0, 2.0, 0.0, 0.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.5, 0.0, 2.0]),
        );
        Ok(Self {
            kind: ScenarioKind::FreeFall,
            world,
            config: config(0.01, 100),
            timesteps: 100,
        })
    }

    /// Three 1 m links (two revolute joints and a ball joint), the tip of
    /// the last link pinned where it starts.
    pub fn pendulum() -> MekanoResult<Self> {
        let mut world = World::new();
        let half = translation_transform(DVec3::new(0.0, -0.5, 0.0));
        let bodies = [
            world.add_body(link("link0")),
            world.add_body(link("link1")),
            world.add_body(link("link2")),
        ];
        let joints = [
            Joint::new("hinge0", JointKind::Revolute { axis: DVec3::Z }, None, bodies[0])
                .with_child_frame(half)
                .with_state(&[0.4], &[0.0]),
            Joint::new("hinge1", JointKind::Revolute { axis: DVec3::Z }, Some(bodies[0]), bodies[1])
                .with_parent_frame(half)
                .with_child_frame(half)
                .with_state(&[-0.3], &[0.0]),
            Joint::new("ball", JointKind::Spherical, Some(bodies[1]), bodies[2])
                .with_parent_frame(half)
                .with_child_frame(half)
                .with_state(&[0.2, 0.0, 0.1], &[0.0; 3]),
        ];
        let tip_local = DVec3::new(0.0, -0.5, 0.0);
        let tip = chain_pose(&joints).transform_point3(tip_local);
        for joint in joints {
            world.add_joint(joint);
        }
        world.add_constraint(Constraint::new(
            "tip",
            ConstraintKind::Loop {
                body_a: bodies[2],
                point_a: tip_local,
                body_b: None,
                point_b: tip,
            },
        ));
        Ok(Self {
            kind: ScenarioKind::Pendulum,
            world,
            config: config(0.01, 100),
            timesteps: 100,
        })
    }

    /// A 2 m × 0.4 m × 0.4 m tet beam clamped at x = 0.
    pub fn soft_block() -> MekanoResult<Self> {
        Self::soft_block_with(foam())
    }

    /// [`soft_block`](Self::soft_block) with a custom material.
    pub fn soft_block_with(material: SolidProperties) -> MekanoResult<Self> {
        let mut world = World::new();
        let mesh = tet_block([4, 1, 1], DVec3::new(2.0, 0.4, 0.4), DVec3::ZERO);
        let clamped: Vec<usize> = (0..mesh.vertex_count())
            .filter(|&i| mesh.position(i).x < 1e-9)
            .collect();
        let mut beam = SoftBody::from_mesh("beam", &mesh, material)?;
        beam.fix_nodes(&clamped)?;
        world.add_component(beam);
        Ok(Self {
            kind: ScenarioKind::SoftBlock,
            world,
            config: config(0.01, 60),
            timesteps: 60,
        })
    }

    /// A rod swinging about z with a 0.3 m tet block hanging from its tip
    /// and a floor just below the block.
    pub fn hybrid_attach() -> MekanoResult<Self> {
        let mut world = World::new();
        let rod = world.add_body(link("rod"));
        world.add_joint(
            Joint::new("hinge", JointKind::Revolute { axis: DVec3::Z }, None, rod)
                .with_child_frame(translation_transform(DVec3::new(0.0, -0.5, 0.0)))
                .with_state(&[0.0], &[1.5]),
        );
        let (block, floor) = Self::hanging_block(rod)?;
        world.add_component(block);
        for constraint in floor {
            world.add_constraint(constraint);
        }
        Ok(Self {
            kind: ScenarioKind::HybridAttach,
            world,
            config: config(0.01, 60),
            timesteps: 60,
        })
    }

    /// The block attached to the tip of `rod` (at rest pose, center at
    /// `(0, -0.5, 0)`) and a floor constraint per bottom node.
    fn hanging_block(rod: BodyId) -> MekanoResult<(SoftBody, Vec<Constraint>)> {
        let size = 0.3;
        let top = -1.0;
        let mesh = tet_block(
            [2, 2, 2],
            DVec3::splat(size),
            DVec3::new(-0.5 * size, top - size, -0.5 * size),
        );
        let material = SolidProperties {
            name: "rubber".into(),
            density: 200.0,
            youngs_modulus: 2.0e4,
            poisson_ratio: 0.3,
            model: MaterialModel::NeoHookean,
            damping: 0.0,
        };
        let mut block = SoftBody::from_mesh("block", &mesh, material)?;
        let rod_center = DVec3::new(0.0, -0.5, 0.0);
        let mut floor = Vec::new();
        for i in 0..block.node_count() {
            let x = block.nodes[i].x;
            if x.y > top - 1e-9 {
                block.attach_node(i, rod, x - rod_center)?;
            } else if x.y < top - size + 1e-9 {
                floor.push(Constraint::new(
                    format!("floor{i}"),
                    ConstraintKind::NodeHalfspace {
                        node: NodeId(i as u32),
                        point: DVec3::new(0.0, top - size - 0.02, 0.0),
                        normal: DVec3::Y,
                    },
                ));
            }
        }
        Ok((block, floor))
    }

    /// Create a scenario by kind.
    pub fn from_kind(kind: ScenarioKind) -> MekanoResult<Self> {
        match kind {
            ScenarioKind::FreeFall => Self::free_fall(),
            ScenarioKind::Pendulum => Self::pendulum(),
            ScenarioKind::SoftBlock => Self::soft_block(),
            ScenarioKind::HybridAttach => Self::hybrid_attach(),
        }
    }

    /// Replaces the solver configuration, keeping the step count.
    #[must_use]
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }
}
