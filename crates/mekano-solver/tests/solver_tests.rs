//! Integration tests for mekano-solver.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mekano_material::{InversionSettings, MaterialModel, SolidProperties};
use mekano_math::mat3::axial;
use mekano_math::qp::{ActiveSetQp, QpBackend, QpSettings, QpSolution, QuadraticProgram};
use mekano_math::se3::{rotation, translation, translation_transform};
use mekano_math::{DMat3, DVec3, DenseMatrix};
use mekano_mesh::generators::{single_tet, tet_block};
use mekano_solver::workspace::StepWorkspace;
use mekano_solver::{
    Constraint, ConstraintBlock, ConstraintKind, Dynamics, Joint, JointKind, LinearMethod,
    MultibodyTree, NodeState, RigidBody, SoftBody, Solution, Solver, SolverConfig, Spring,
    StepContext, UnconstrainedMethod, World,
};
use mekano_telemetry::{EventBus, EventKind, VecSink};
use mekano_types::constants::GRAVITY;
use mekano_types::{MekanoError, NodeId};

fn block_props() -> SolidProperties {
    SolidProperties {
        name: "block".into(),
        density: 100.0,
        youngs_modulus: 5.0e3,
        poisson_ratio: 0.3,
        model: MaterialModel::CoRotated,
        damping: 0.0,
    }
}

/// A unit-mass cube on a free joint.
fn free_body_world(q: &[f64], qdot: &[f64]) -> World {
    let mut world = World::new();
    let body = world.add_body(RigidBody::cuboid("cube", DVec3::ONE, 1.0));
    world.add_joint(Joint::new("free", JointKind::Free, None, body).with_state(q, qdot));
    world
}

/// A rod hanging from a revolute joint about z, pivot at its top end.
fn hinge_world(q: f64, qdot: f64) -> World {
    let mut world = World::new();
    let body = world.add_body(RigidBody::cuboid("rod", DVec3::new(0.1, 1.0, 0.1), 1.0));
    world.add_joint(
        Joint::new("hinge", JointKind::Revolute { axis: DVec3::Z }, None, body)
            .with_child_frame(translation_transform(DVec3::new(0.0, -0.5, 0.0)))
            .with_state(&[q], &[qdot]),
    );
    world
}

// ─── SolverConfig Tests ───────────────────────────────────────

#[test]
fn config_default() {
    let config = SolverConfig::default();
    assert!(config.validate().is_ok());
    assert!((config.baumgarte_gain - 5.0).abs() < 1e-12);
    assert!((config.gravity[1] + GRAVITY).abs() < 1e-12);
    assert_eq!(config.equality, LinearMethod::Minres);
    assert_eq!(config.unconstrained, UnconstrainedMethod::ConjugateGradient);
}

#[test]
fn config_presets_validate() {
    assert!(SolverConfig::debug().validate().is_ok());
    assert!(SolverConfig::high_quality().validate().is_ok());
    assert!(SolverConfig::high_quality().strict_convergence);
}

#[test]
fn config_step_count() {
    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 1.0);
    assert_eq!(config.step_count(), 100);
    let config = SolverConfig::default().with_dt(0.3).with_t_span(0.0, 1.0);
    assert_eq!(config.step_count(), 4);
}

#[test]
fn config_rejects_bad_values() {
    let bad = [
        SolverConfig::default().with_dt(0.0),
        SolverConfig::default().with_dt(f64::NAN),
        SolverConfig::default().with_t_span(1.0, 0.0),
        SolverConfig::default().with_gravity([0.0, f64::INFINITY, 0.0]),
        SolverConfig {
            baumgarte_gain: -1.0,
            ..Default::default()
        },
        SolverConfig {
            kkt_regularization: 0.0,
            ..Default::default()
        },
        SolverConfig {
            kkt_regularization: f64::NAN,
            ..Default::default()
        },
    ];
    for config in bad {
        assert!(matches!(config.validate(), Err(MekanoError::InvalidConfig(_))));
    }
}

#[test]
fn config_rejects_zero_iteration_cap() {
    let mut config = SolverConfig::default();
    config.kkt_settings.max_iterations = 0;
    assert!(config.validate().is_err());
}

#[test]
fn config_rejects_unregularized_qp() {
    let mut config = SolverConfig::default();
    config.qp.regularization = 0.0;
    assert!(matches!(config.validate(), Err(MekanoError::InvalidConfig(_))));
}

#[test]
fn config_without_kkt_regularization_uses_default() {
    let mut value = serde_json::to_value(SolverConfig::default()).unwrap();
    value.as_object_mut().unwrap().remove("kkt_regularization");
    let config: SolverConfig = serde_json::from_value(value).unwrap();
    assert_eq!(config.kkt_regularization, SolverConfig::default().kkt_regularization);
}

#[test]
fn config_serialization() {
    let config = SolverConfig::debug().with_dt(0.005);
    let json = serde_json::to_string(&config).unwrap();
    let from_json: SolverConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, from_json);

    let text = toml::to_string(&config).unwrap();
    let from_toml: SolverConfig = toml::from_str(&text).unwrap();
    assert_eq!(config, from_toml);
}

#[test]
fn method_names_parse() {
    for method in LinearMethod::ALL {
        assert_eq!(LinearMethod::from_str(method.name()).unwrap(), method);
    }
    assert_eq!(
        LinearMethod::from_str("CG_JACOBI").unwrap(),
        LinearMethod::PreconditionedCg
    );
    assert_eq!(
        UnconstrainedMethod::from_str("llt").unwrap(),
        UnconstrainedMethod::Cholesky
    );
    assert!(LinearMethod::from_str("gauss_seidel").is_err());
    assert!(LinearMethod::Minres.is_iterative());
    assert!(!LinearMethod::Ldlt.is_iterative());
}

#[test]
fn solver_rejects_invalid_config() {
    let result = Solver::new(free_body_world(&[0.0; 6], &[0.0; 6]), SolverConfig::default().with_dt(0.0));
    assert!(matches!(result, Err(MekanoError::InvalidConfig(_))));
}

// ─── Solution Tests ───────────────────────────────────────────

fn four_samples() -> Solution {
    let mut solution = Solution::new();
    for k in 0..4 {
        let t = k as f64;
        solution.push(t, vec![t, 10.0 * t]);
    }
    solution
}

#[test]
fn search_time_brackets_interior() {
    let solution = four_samples();
    let (k, s) = solution.search_time(1.5, 0);
    assert_eq!(k, 1);
    assert!((s - 0.5).abs() < 1e-12);
}

#[test]
fn search_time_clamps_before_start() {
    let (k, s) = four_samples().search_time(-1.0, 0);
    assert_eq!(k, 0);
    assert_eq!(s, 0.0);
}

#[test]
fn search_time_clamps_after_end() {
    let (k, s) = four_samples().search_time(5.0, 0);
    assert_eq!(k, 2);
    assert!((s - 1.0).abs() < 1e-12);
}

#[test]
fn search_time_recovers_from_overshooting_hint() {
    let solution = four_samples();
    let (k, s) = solution.search_time(0.25, 3);
    assert_eq!(k, 0);
    assert!((s - 0.25).abs() < 1e-12);
}

#[test]
fn search_time_with_monotone_hints() {
    let solution = four_samples();
    let mut hint = 0;
    for i in 0..30 {
        let ti = 0.1 * i as f64;
        let (k, s) = solution.search_time(ti, hint);
        assert!((solution.t[k] + s - ti).abs() < 1e-12, "ti = {ti}");
        hint = k;
    }
}

#[test]
fn solution_step_and_interpolate() {
    let solution = four_samples();
    assert_eq!(solution.len(), 4);
    assert_eq!(solution.step(2), Some(&[2.0, 20.0][..]));
    assert!(solution.step(4).is_none());
    let y = solution.interpolate(2.25, 0).unwrap();
    assert!((y[0] - 2.25).abs() < 1e-12);
    assert!((y[1] - 22.5).abs() < 1e-12);
    assert!(Solution::new().interpolate(0.0, 0).is_none());
}

// ─── Multibody Tree Tests ─────────────────────────────────────

fn arm_tree() -> MultibodyTree {
    let mut tree = MultibodyTree::new();
    let upper = tree.add_body(RigidBody::cuboid("upper", DVec3::new(0.2, 1.0, 0.2), 1.0));
    let lower = tree.add_body(RigidBody::cuboid("lower", DVec3::new(0.2, 0.8, 0.2), 1.0));
    tree.add_joint(
        Joint::new("shoulder", JointKind::Revolute { axis: DVec3::Z }, None, upper)
            .with_parent_frame(translation_transform(DVec3::new(0.0, 2.0, 0.0)))
            .with_child_frame(translation_transform(DVec3::new(0.0, -0.5, 0.0))),
    );
    tree.add_joint(
        Joint::new("elbow", JointKind::Spherical, Some(upper), lower)
            .with_parent_frame(translation_transform(DVec3::new(0.0, -0.5, 0.0)))
            .with_child_frame(translation_transform(DVec3::new(0.1, -0.4, 0.0))),
    );
    tree.init().unwrap();
    tree
}

fn set_arm_state(tree: &mut MultibodyTree, q: &[f64], qdot: &[f64]) {
    tree.joints[0].q = q[..1].to_vec();
    tree.joints[0].qdot = qdot[..1].to_vec();
    tree.joints[1].q = q[1..].to_vec();
    tree.joints[1].qdot = qdot[1..].to_vec();
    tree.update_kinematics();
}

fn arm_at(q: &[f64], qdot: &[f64]) -> MultibodyTree {
    let mut tree = arm_tree();
    set_arm_state(&mut tree, q, qdot);
    tree
}

#[test]
fn tree_init_assigns_indices() {
    let tree = arm_tree();
    assert_eq!(tree.dof_count(), 4);
    assert_eq!(tree.bodies[1].idx_m, 6);
    assert_eq!(tree.joints[1].idx_r, 1);
}

#[test]
fn tree_rejects_orphan_body() {
    let mut tree = MultibodyTree::new();
    tree.add_body(RigidBody::cuboid("lonely", DVec3::ONE, 1.0));
    assert!(tree.init().is_err());
}

#[test]
fn body_twist_matches_pose_derivative() {
    let q = [0.4, 0.3, -0.2, 0.5];
    let qdot = [0.7, 0.3, -0.2, 0.5];
    let eps = 1e-6;
    let step = |sign: f64| -> Vec<f64> { q.iter().zip(&qdot).map(|(a, b)| a + sign * eps * b).collect() };
    let tree = arm_at(&q, &qdot);
    let plus = arm_at(&step(1.0), &qdot);
    let minus = arm_at(&step(-1.0), &qdot);

    for b in 0..2 {
        let body = &tree.bodies[b];
        let r = rotation(&body.e_wi);
        let dp = (translation(&plus.bodies[b].e_wi) - translation(&minus.bodies[b].e_wi)) / (2.0 * eps);
        let dr = (rotation(&plus.bodies[b].e_wi) - rotation(&minus.bodies[b].e_wi)) * (0.5 / eps);
        let omega = axial(&(r.transpose() * dr));
        let v = r.transpose() * dp;

        let phi = body.phi;
        let j_qdot = body.jacobian.mul_vec(&qdot);
        for k in 0..3 {
            assert!((phi[k] - omega[k]).abs() < 1e-6, "body {b} ω[{k}]");
            assert!((phi[3 + k] - v[k]).abs() < 1e-6, "body {b} v[{k}]");
            assert!((phi[k] - j_qdot[k]).abs() < 1e-10);
            assert!((phi[3 + k] - j_qdot[3 + k]).abs() < 1e-10);
        }
    }
}

#[test]
fn jacobian_dot_matches_finite_difference() {
    let q = [0.4, 0.3, -0.2, 0.5];
    let qdot = [0.7, 0.3, -0.2, 0.5];
    let eps = 1e-6;
    let step = |sign: f64| -> Vec<f64> { q.iter().zip(&qdot).map(|(a, b)| a + sign * eps * b).collect() };
    let tree = arm_at(&q, &qdot);
    let plus = arm_at(&step(1.0), &qdot);
    let minus = arm_at(&step(-1.0), &qdot);

    for b in 0..2 {
        let fd = plus.bodies[b]
            .jacobian
            .add_scaled(&minus.bodies[b].jacobian, -1.0)
            .scale(0.5 / eps);
        let err = fd.add_scaled(&tree.bodies[b].jacobian_dot, -1.0).max_abs();
        assert!(err < 1e-6, "body {b}: |J̇ - fd| = {err}");
    }
}

#[test]
fn spherical_joint_reparametrizes() {
    let mut tree = arm_tree();
    let big = 3.0 * std::f64::consts::PI / 2.0;
    set_arm_state(&mut tree, &[0.0, big, 0.0, 0.0], &[0.0; 4]);
    let before = rotation(&tree.bodies[1].e_wi);
    assert_eq!(tree.reparam(), 1);
    tree.update_kinematics();
    let after = rotation(&tree.bodies[1].e_wi);
    assert!(tree.joints[1].q[0].abs() < std::f64::consts::PI + 1e-12);
    assert!((before - after).abs_diff_eq(DMat3::ZERO, 1e-9));
}

#[test]
fn body_point_velocity_is_zero_at_pivot() {
    let mut world = hinge_world(0.0, 1.0);
    world.init(&InversionSettings::default()).unwrap();
    let rod = &world.tree.bodies[0];
    let pivot = rod.world_point_velocity(DVec3::new(0.0, 0.5, 0.0));
    assert!(pivot.length() < 1e-12);
    let tip = rod.world_point_velocity(DVec3::new(0.0, -0.5, 0.0));
    assert!((tip - DVec3::X).length() < 1e-12, "tip velocity {tip}");
}

// ─── World Tests ──────────────────────────────────────────────

#[test]
fn world_sizes_and_state_layout() {
    let mut world = hinge_world(0.1, 0.2);
    let mut soft = SoftBody::from_mesh("tet", &single_tet(), block_props()).unwrap();
    soft.fix_nodes(&[3]).unwrap();
    world.add_component(soft);
    let sizes = world.init(&InversionSettings::default()).unwrap();

    assert_eq!(sizes.nm, 6 + 12);
    assert_eq!(sizes.nr, 1 + 9);
    assert_eq!(sizes.n_joint_dofs, 1);
    let y = world.gather_state();
    assert_eq!(y.len(), 20);
    assert!((y[0] - 0.1).abs() < 1e-12);
    assert!((y[10] - 0.2).abs() < 1e-12);
}

#[test]
fn scatter_gather_round_trip() {
    let mut world = hinge_world(0.0, 0.0);
    world.add_component(SoftBody::from_mesh("tet", &single_tet(), block_props()).unwrap());
    let sizes = world.init(&InversionSettings::default()).unwrap();
    let y: Vec<f64> = (0..2 * sizes.nr).map(|i| 0.01 * i as f64).collect();
    world.scatter_state(&y).unwrap();
    assert_eq!(world.gather_state(), y);
}

#[test]
fn scatter_rejects_wrong_length() {
    let mut world = hinge_world(0.0, 0.0);
    world.init(&InversionSettings::default()).unwrap();
    assert!(matches!(
        world.scatter_state(&[0.0; 3]),
        Err(MekanoError::InvalidState(_))
    ));
}

#[test]
fn world_rejects_bad_constraint_reference() {
    let mut world = hinge_world(0.0, 0.0);
    world.add_constraint(Constraint::new(
        "anchor",
        ConstraintKind::NodeAnchor {
            node: NodeId(5),
            target: DVec3::ZERO,
        },
    ));
    assert!(matches!(
        world.init(&InversionSettings::default()),
        Err(MekanoError::InvalidConfig(_))
    ));
}

#[test]
fn world_rejects_constraint_on_fixed_node() {
    let kinds = [
        ConstraintKind::NodeHalfspace {
            node: NodeId(0),
            point: DVec3::new(0.0, 0.1, 0.0),
            normal: DVec3::Y,
        },
        ConstraintKind::NodeAnchor {
            node: NodeId(0),
            target: DVec3::new(0.0, 0.1, 0.0),
        },
    ];
    for kind in kinds {
        let mut block = SoftBody::from_mesh("tet", &single_tet(), block_props()).unwrap();
        block.fix_nodes(&[0]).unwrap();
        let mut world = World::new();
        world.add_component(block);
        world.add_constraint(Constraint::new("pinned", kind));
        match world.init(&InversionSettings::default()) {
            Err(MekanoError::InvalidConfig(msg)) => assert!(msg.contains("fixed"), "{msg}"),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }
}

#[test]
fn constraint_on_free_node_of_partly_fixed_body_is_accepted() {
    let mut block = SoftBody::from_mesh("tet", &single_tet(), block_props()).unwrap();
    block.fix_nodes(&[0]).unwrap();
    let mut world = World::new();
    let id = world.add_component(block);
    let node = world.node_id(id, 1).unwrap();
    world.add_constraint(Constraint::new(
        "floor",
        ConstraintKind::NodeHalfspace {
            node,
            point: DVec3::new(0.0, -1.0, 0.0),
            normal: DVec3::Y,
        },
    ));
    assert!(world.init(&InversionSettings::default()).is_ok());
}

#[test]
fn world_rejects_projection_of_wrong_size() {
    let mut world = hinge_world(0.0, 0.0);
    world.set_projection(DenseMatrix::identity(2));
    assert!(world.init(&InversionSettings::default()).is_err());
}

#[test]
fn node_ids_span_components() {
    let mut world = World::new();
    let a = world.add_component(SoftBody::from_mesh("a", &single_tet(), block_props()).unwrap());
    let b = world.add_component(SoftBody::from_mesh("b", &single_tet(), block_props()).unwrap());
    assert_eq!(world.node_id(a, 3).unwrap(), NodeId(3));
    assert_eq!(world.node_id(b, 0).unwrap(), NodeId(4));
    assert!(world.node_id(b, 4).is_err());
}

// ─── Constraint Tests ─────────────────────────────────────────

#[test]
fn constraint_blocks_and_rows() {
    let limit = ConstraintKind::JointLimit {
        joint: mekano_types::JointId(0),
        coordinate: 0,
        lower: -1.0,
        upper: 1.0,
    };
    assert_eq!(limit.block(), ConstraintBlock::InequalityReduced);
    assert_eq!(limit.rows(), 2);
    let halfspace = Constraint::new(
        "floor",
        ConstraintKind::NodeHalfspace {
            node: NodeId(0),
            point: DVec3::ZERO,
            normal: DVec3::new(0.0, 2.0, 0.0),
        },
    );
    match halfspace.kind {
        ConstraintKind::NodeHalfspace { normal, .. } => assert!((normal.length() - 1.0).abs() < 1e-12),
        _ => unreachable!(),
    }
    assert!(!halfspace.block().is_equality());
}

#[test]
fn joint_limit_rejects_empty_range() {
    let mut world = hinge_world(0.0, 0.0);
    world.add_constraint(Constraint::new(
        "limit",
        ConstraintKind::JointLimit {
            joint: mekano_types::JointId(0),
            coordinate: 0,
            lower: 0.5,
            upper: -0.5,
        },
    ));
    assert!(world.init(&InversionSettings::default()).is_err());
}

#[test]
fn active_set_is_idempotent() {
    let mut world = hinge_world(0.1995, 0.0);
    let limit = world.add_constraint(Constraint::new(
        "limit",
        ConstraintKind::JointLimit {
            joint: mekano_types::JointId(0),
            coordinate: 0,
            lower: -0.2,
            upper: 0.2,
        },
    ));
    let sizes = world.init(&InversionSettings::default()).unwrap();
    let mut ws = StepWorkspace::new(&sizes);

    world.compute_constraints(&mut ws);
    let first = ws.ineq_r.active_rows();
    let first_rows = world.constraint(limit).active_rows();
    ws.reset(&sizes);
    world.compute_constraints(&mut ws);
    assert_eq!(ws.ineq_r.active_rows(), first);
    assert_eq!(world.constraint(limit).active_rows(), first_rows);

    // only the upper row is within the activation tolerance
    assert_eq!(first, vec![1]);
    assert!((ws.ineq_r.value[1] + 0.0005).abs() < 1e-12);
}

#[test]
fn zero_activation_tolerance_leaves_near_rows_inactive() {
    let mut world = hinge_world(0.1995, 0.0);
    world.add_constraint(
        Constraint::new(
            "limit",
            ConstraintKind::JointLimit {
                joint: mekano_types::JointId(0),
                coordinate: 0,
                lower: -0.2,
                upper: 0.2,
            },
        )
        .with_activation_tolerance(0.0),
    );
    let sizes = world.init(&InversionSettings::default()).unwrap();
    let mut ws = StepWorkspace::new(&sizes);
    world.compute_constraints(&mut ws);
    assert!(ws.ineq_r.active_rows().is_empty());
}

#[test]
fn loop_constraint_residual_is_point_gap() {
    let mut world = hinge_world(0.0, 0.0);
    world.add_constraint(Constraint::new(
        "tip",
        ConstraintKind::Loop {
            body_a: mekano_types::BodyId(0),
            point_a: DVec3::new(0.0, -0.5, 0.0),
            body_b: None,
            point_b: DVec3::new(0.0, -1.0, 0.0),
        },
    ));
    world.init(&InversionSettings::default()).unwrap();
    assert!(world.constraint_violation() < 1e-12);
}

#[test]
fn equality_rows_are_always_active() {
    let mut world = hinge_world(0.0, 0.0);
    let anchor = world.add_constraint(Constraint::new(
        "tip",
        ConstraintKind::Loop {
            body_a: mekano_types::BodyId(0),
            point_a: DVec3::new(0.0, -0.5, 0.0),
            body_b: None,
            point_b: DVec3::new(0.0, -1.0, 0.0),
        },
    ));
    let limit = world.add_constraint(Constraint::new(
        "limit",
        ConstraintKind::JointLimit {
            joint: mekano_types::JointId(0),
            coordinate: 0,
            lower: -1.0,
            upper: 1.0,
        },
    ));
    world.init(&InversionSettings::default()).unwrap();
    assert_eq!(world.constraint(anchor).eq_active_rows(), vec![0, 1, 2]);
    assert!(world.constraint(limit).eq_active_rows().is_empty());
}

// ─── Spring Tests ─────────────────────────────────────────────

fn node_states(points: &[DVec3]) -> Vec<NodeState> {
    points
        .iter()
        .enumerate()
        .map(|(i, &x)| NodeState {
            x,
            v: DVec3::ZERO,
            idx_m: 3 * i,
        })
        .collect()
}

fn spring_force(spring: &Spring, tree: &MultibodyTree, points: &[DVec3]) -> Vec<f64> {
    let nodes = node_states(points);
    let ctx = StepContext {
        tree,
        nodes: &nodes,
        gravity: DVec3::ZERO,
        time: 0.0,
    };
    let mut ws = StepWorkspace {
        fm: vec![0.0; 3 * points.len()],
        ..Default::default()
    };
    spring.compute_force(&ctx, &mut ws);
    ws.fm
}

#[test]
fn spring_at_rest_length_is_force_free() {
    let tree = MultibodyTree::new();
    let spring = Spring::between("s", NodeId(0), NodeId(1), 100.0, 2.0);
    let f = spring_force(&spring, &tree, &[DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0)]);
    assert!(f.iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn stretched_anchor_spring_pulls_back() {
    let tree = MultibodyTree::new();
    let spring = Spring::to_anchor("s", NodeId(0), DVec3::ZERO, 100.0, 1.0);
    let f = spring_force(&spring, &tree, &[DVec3::new(0.0, -1.5, 0.0)]);
    assert!((f[1] - 50.0).abs() < 1e-9);
    assert!(f[0].abs() < 1e-12 && f[2].abs() < 1e-12);
}

#[test]
fn spring_stiffness_matches_finite_difference() {
    let tree = MultibodyTree::new();
    let spring = Spring::between("s", NodeId(0), NodeId(1), 80.0, 1.0);
    let points = [DVec3::new(0.1, 0.2, -0.1), DVec3::new(1.2, 0.5, 0.3)];

    let nodes = node_states(&points);
    let ctx = StepContext {
        tree: &tree,
        nodes: &nodes,
        gravity: DVec3::ZERO,
        time: 0.0,
    };
    let mut ws = StepWorkspace::default();
    spring.compute_stiffness_sparse(&ctx, &mut ws);
    let mut k = DenseMatrix::zeros(6, 6);
    for t in &ws.km {
        k[(t.row, t.col)] += t.val;
    }

    let eps = 1e-6;
    for col in 0..6 {
        let mut plus = points;
        let mut minus = points;
        plus[col / 3][col % 3] += eps;
        minus[col / 3][col % 3] -= eps;
        let fp = spring_force(&spring, &tree, &plus);
        let fm = spring_force(&spring, &tree, &minus);
        for row in 0..6 {
            let fd = (fp[row] - fm[row]) / (2.0 * eps);
            assert!((fd - k[(row, col)]).abs() < 1e-5, "K[{row},{col}]");
        }
    }
}

// ─── Step Solver Tests ────────────────────────────────────────

#[test]
fn free_fall_velocity_and_energy_drift() {
    let world = free_body_world(&[0.0; 6], &[0.0; 6]);
    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 1.0);
    let mut solver = Solver::new(world, config).unwrap();
    let e0 = solver.world().compute_energy().total();
    let steps = solver.solve().unwrap().len() - 1;
    assert_eq!(steps, 100);

    let y = solver.world().gather_state();
    assert!((y[7] + GRAVITY).abs() < 1e-6, "v_y = {}", y[7]);

    // implicit Euler loses exactly m g² h² / 2 per step in free fall
    let drift = solver.world().compute_energy().total() - e0;
    let expected = 0.5 * GRAVITY * GRAVITY * 0.01 * 0.01 * steps as f64;
    assert!(drift <= 0.0);
    assert!((drift + expected).abs() < 1e-3 * expected, "drift {drift}, expected {expected}");
}

#[test]
fn unconstrained_methods_agree() {
    let mut finals = Vec::new();
    for method in [UnconstrainedMethod::ConjugateGradient, UnconstrainedMethod::Cholesky] {
        let config = SolverConfig {
            unconstrained: method,
            ..SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.2)
        };
        let mut solver = Solver::new(hinge_world(0.5, 0.0), config).unwrap();
        solver.solve().unwrap();
        finals.push(solver.world().gather_state());
    }
    for (a, b) in finals[0].iter().zip(&finals[1]) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn ball_joint_loop_holds() {
    let theta: f64 = 30f64.to_radians();
    let p = [0.5 * theta.sin(), -0.5 * theta.cos(), 0.0];
    let mut world = World::new();
    let body = world.add_body(RigidBody::cuboid("rod", DVec3::new(0.1, 1.0, 0.1), 1.0));
    world.add_joint(
        Joint::new("free", JointKind::Free, None, body)
            .with_state(&[p[0], p[1], p[2], 0.0, 0.0, theta], &[0.0; 6]),
    );
    world.add_constraint(Constraint::new(
        "pivot",
        ConstraintKind::Loop {
            body_a: body,
            point_a: DVec3::new(0.0, 0.5, 0.0),
            body_b: None,
            point_b: DVec3::ZERO,
        },
    ));

    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 1.0);
    let mut solver = Solver::new(world, config).unwrap();
    assert!(solver.constraint_residual() < 1e-12);

    let start = solver.world().tree.bodies[0].position();
    let mut max_residual: f64 = 0.0;
    for _ in 0..100 {
        let report = solver.step().unwrap();
        assert_eq!(report.equality_rows, 3);
        assert!(report.method.starts_with("kkt"));
        max_residual = max_residual.max(solver.constraint_residual());
    }
    assert!(max_residual < 1e-2, "max residual {max_residual}");
    let moved = (solver.world().tree.bodies[0].position() - start).length();
    assert!(moved > 0.05, "body barely moved: {moved}");
}

#[test]
fn kkt_methods_agree() {
    let theta: f64 = 0.4;
    let mut finals = Vec::new();
    for method in [LinearMethod::Minres, LinearMethod::Lu, LinearMethod::Ldlt, LinearMethod::Qr, LinearMethod::Qp] {
        let mut world = free_body_world(
            &[0.5 * theta.sin(), -0.5 * theta.cos(), 0.0, 0.0, 0.0, theta],
            &[0.0; 6],
        );
        world.add_constraint(Constraint::new(
            "pivot",
            ConstraintKind::Loop {
                body_a: mekano_types::BodyId(0),
                point_a: DVec3::new(0.0, 0.5, 0.0),
                body_b: None,
                point_b: DVec3::ZERO,
            },
        ));
        let config = SolverConfig {
            equality: method,
            ..SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.1)
        };
        let mut solver = Solver::new(world, config).unwrap();
        solver.solve().unwrap();
        finals.push((method, solver.world().gather_state()));
    }
    let reference = &finals[0].1;
    for (method, y) in &finals[1..] {
        for (a, b) in reference.iter().zip(y) {
            assert!((a - b).abs() < 1e-5, "{method} disagrees");
        }
    }
}

#[test]
fn redundant_loop_constraints_never_panic() {
    let theta: f64 = 0.3;
    for method in LinearMethod::ALL {
        let mut world = free_body_world(
            &[0.5 * theta.sin(), -0.5 * theta.cos(), 0.0, 0.0, 0.0, theta],
            &[0.0; 6],
        );
        for name in ["pivot", "pivot_copy"] {
            world.add_constraint(Constraint::new(
                name,
                ConstraintKind::Loop {
                    body_a: mekano_types::BodyId(0),
                    point_a: DVec3::new(0.0, 0.5, 0.0),
                    body_b: None,
                    point_b: DVec3::ZERO,
                },
            ));
        }
        let config = SolverConfig {
            equality: method,
            ..SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.1)
        };
        let mut solver = Solver::new(world, config).unwrap();
        let mut result = Ok(());
        for _ in 0..10 {
            if let Err(err) = solver.step() {
                result = Err(err);
                break;
            }
        }

        let robust = matches!(
            method,
            LinearMethod::Minres | LinearMethod::Lu | LinearMethod::Ldlt | LinearMethod::Qr | LinearMethod::Qp
        );
        if !robust {
            // plain Krylov methods may stall on the redundant rows; reaching here means no panic
            assert!(!matches!(result, Err(MekanoError::InvalidConfig(_))), "{method}: {result:?}");
            continue;
        }
        assert!(result.is_ok(), "{method}: {result:?}");
        let residual = solver.constraint_residual();
        assert!(residual < 1e-2, "{method}: residual {residual}");
    }
}

#[test]
fn prescribed_joint_tracks_target() {
    let mut world = hinge_world(0.0, 0.0);
    world.add_constraint(Constraint::new(
        "drive",
        ConstraintKind::PrescribedJoint {
            joint: mekano_types::JointId(0),
            coordinate: 0,
            target: 0.0,
            amplitude: 0.3,
            frequency: 1.0,
        },
    ));
    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 1.0);
    let mut solver = Solver::new(world, config).unwrap();
    for _ in 0..100 {
        solver.step().unwrap();
        let t = solver.time();
        let target = 0.3 * (2.0 * std::f64::consts::PI * t).sin();
        let q = solver.world().tree.joints[0].q[0];
        assert!((q - target).abs() < 0.03, "t = {t}: q = {q}, target = {target}");
    }
    // the drive does work against gravity, so its force is non-zero
    let force = solver.world().constraint(mekano_types::ConstraintId(0)).force[0];
    assert!(force.is_finite() && force.abs() > 0.0);
}

#[test]
fn joint_limit_stops_motion() {
    let mut world = hinge_world(0.0, 0.5);
    world.add_constraint(Constraint::new(
        "limit",
        ConstraintKind::JointLimit {
            joint: mekano_types::JointId(0),
            coordinate: 0,
            lower: -0.2,
            upper: 0.2,
        },
    ));
    let config = SolverConfig::default()
        .with_dt(0.01)
        .with_t_span(0.0, 1.0)
        .with_gravity([0.0, 0.0, 0.0]);
    let mut solver = Solver::new(world, config).unwrap();

    let mut used_qp = false;
    let mut max_q: f64 = 0.0;
    for _ in 0..100 {
        let report = solver.step().unwrap();
        used_qp |= report.method.starts_with("qp");
        max_q = max_q.max(solver.world().tree.joints[0].q[0]);
    }
    assert!(used_qp);
    assert!(max_q < 0.21, "max q = {max_q}");
    assert!(solver.world().tree.joints[0].qdot[0].abs() < 1e-3);
}

#[test]
fn joint_spring_returns_to_rest() {
    let mut world = World::new();
    let body = world.add_body(RigidBody::cuboid("rod", DVec3::new(0.1, 1.0, 0.1), 1.0));
    world.add_joint(
        Joint::new("hinge", JointKind::Revolute { axis: DVec3::Z }, None, body)
            .with_child_frame(translation_transform(DVec3::new(0.0, -0.5, 0.0)))
            .with_spring(0.01, &[0.0])
            .with_damping(0.005)
            .with_state(&[0.3], &[0.0]),
    );
    let config = SolverConfig::default()
        .with_dt(0.01)
        .with_t_span(0.0, 3.0)
        .with_gravity([0.0, 0.0, 0.0]);
    let mut solver = Solver::new(world, config).unwrap();
    solver.solve().unwrap();
    let q = solver.world().tree.joints[0].q[0];
    assert!(q.abs() < 0.1, "q = {q}");
}

/// Delegates to the active-set solver and counts the calls.
struct CountingQp {
    inner: ActiveSetQp,
    calls: Arc<AtomicUsize>,
}

impl QpBackend for CountingQp {
    fn solve(&mut self, qp: &QuadraticProgram<'_>) -> Result<QpSolution, String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.solve(qp)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[test]
fn custom_qp_backend_is_used() {
    let mut world = hinge_world(0.1995, 0.5);
    world.add_constraint(Constraint::new(
        "limit",
        ConstraintKind::JointLimit {
            joint: mekano_types::JointId(0),
            coordinate: 0,
            lower: -0.2,
            upper: 0.2,
        },
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = CountingQp {
        inner: ActiveSetQp::new(QpSettings::default()),
        calls: Arc::clone(&calls),
    };
    let config = SolverConfig::default().with_dt(0.01).with_gravity([0.0, 0.0, 0.0]);
    let mut solver = Solver::new(world, config)
        .unwrap()
        .with_qp_backend(Box::new(backend));
    let report = solver.step().unwrap();
    assert_eq!(report.method, "qp/counting");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn attached_node_follows_body() {
    let mut world = hinge_world(0.0, 1.0);
    let light = SolidProperties {
        density: 1.0,
        ..block_props()
    };
    let mut tet = SoftBody::from_mesh("tet", &single_tet(), light).unwrap();
    // node 3 lands on the rod tip
    tet.translate(DVec3::new(0.0, -1.0, 0.0));
    let soft = world.add_component(tet);
    world.attach_nodes(soft, &[3], mekano_types::BodyId(0)).unwrap();
    let local = {
        world.init(&InversionSettings::default()).unwrap();
        let body = &world.tree.bodies[0];
        rotation(&body.e_wi).transpose() * (world.component(soft).nodes()[3].x - body.position())
    };

    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.2);
    let mut solver = Solver::new(world, config).unwrap();
    solver.solve().unwrap();

    let world = solver.world();
    let expected = world.tree.bodies[0].world_point(local);
    let node = &world.component(soft).nodes()[3];
    assert!((node.x - expected).length() < 1e-9);
    assert!(world.tree.joints[0].q[0].abs() > 0.05);
}

#[test]
fn pinned_soft_block_sags_and_stays_finite() {
    let mesh = tet_block([2, 1, 1], DVec3::new(2.0, 0.5, 0.5), DVec3::ZERO);
    let mut block = SoftBody::from_mesh("beam", &mesh, block_props()).unwrap();
    let pinned: Vec<usize> = (0..block.node_count())
        .filter(|&i| block.nodes[i].x0.x < 1e-9)
        .collect();
    block.fix_nodes(&pinned).unwrap();
    let mut world = World::new();
    let id = world.add_component(block);

    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.3);
    let mut solver = Solver::new(world, config).unwrap();
    solver.solve().unwrap();

    let nodes = solver.world().component(id).nodes();
    for &i in &pinned {
        assert!((nodes[i].x - nodes[i].x0).length() < 1e-12);
    }
    let tip = nodes
        .iter()
        .filter(|n| n.x0.x > 2.0 - 1e-9)
        .map(|n| n.x.y - n.x0.y)
        .fold(0.0, f64::min);
    assert!(tip < 0.0, "free end did not sag");
    assert!(nodes.iter().all(|n| n.x.is_finite()));
}

#[test]
fn halfspace_stops_falling_node() {
    let mut block = SoftBody::from_mesh("tet", &single_tet(), block_props()).unwrap();
    block.translate(DVec3::new(0.0, 0.02, 0.0));
    let mut world = World::new();
    let id = world.add_component(block);
    for local in 0..4 {
        let node = world.node_id(id, local).unwrap();
        world.add_constraint(Constraint::new(
            format!("floor{local}"),
            ConstraintKind::NodeHalfspace {
                node,
                point: DVec3::ZERO,
                normal: DVec3::Y,
            },
        ));
    }
    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.5);
    let mut solver = Solver::new(world, config).unwrap();
    solver.solve().unwrap();

    let lowest = solver
        .world()
        .component(id)
        .nodes()
        .iter()
        .map(|n| n.x.y)
        .fold(f64::INFINITY, f64::min);
    assert!(lowest > -0.01, "node sank to {lowest}");
}

#[test]
fn identity_projection_matches_full_solve() {
    let build = || {
        let mesh = tet_block([1, 1, 1], DVec3::splat(0.5), DVec3::ZERO);
        let mut block = SoftBody::from_mesh("block", &mesh, block_props()).unwrap();
        let bottom: Vec<usize> = (0..block.node_count())
            .filter(|&i| block.nodes[i].x0.y < 1e-9)
            .collect();
        block.fix_nodes(&bottom).unwrap();
        block.set_velocity(DVec3::new(0.3, 0.0, 0.0));
        let mut world = World::new();
        world.add_component(block);
        world
    };
    let config = SolverConfig {
        unconstrained: UnconstrainedMethod::Cholesky,
        ..SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.1)
    };

    let mut full = Solver::new(build(), config.clone()).unwrap();
    full.solve().unwrap();

    let mut world = build();
    let nr = world.init(&InversionSettings::default()).unwrap().nr;
    world.set_projection(DenseMatrix::identity(nr));
    let mut reduced = Solver::new(world, config).unwrap();
    reduced.solve().unwrap();

    for (a, b) in full.world().gather_state().iter().zip(&reduced.world().gather_state()) {
        assert!((a - b).abs() < 1e-8);
    }
}

#[test]
fn translation_basis_keeps_shape() {
    let mesh = tet_block([1, 1, 1], DVec3::splat(0.5), DVec3::ZERO);
    let mut world = World::new();
    let id = world.add_component(SoftBody::from_mesh("block", &mesh, block_props()).unwrap());
    let nr = world.init(&InversionSettings::default()).unwrap().nr;
    world.set_projection(DenseMatrix::from_fn(nr, 3, |r, c| if r % 3 == c { 1.0 } else { 0.0 }));

    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.2);
    let mut solver = Solver::new(world, config).unwrap();
    solver.solve().unwrap();

    let nodes = solver.world().component(id).nodes();
    let shift = nodes[0].x - nodes[0].x0;
    assert!(shift.y < -0.1, "block did not fall");
    for node in nodes {
        assert!(((node.x - node.x0) - shift).length() < 1e-9);
    }
}

#[test]
fn dynamics_rejects_wrong_state_length() {
    let mut solver = Solver::new(hinge_world(0.0, 0.0), SolverConfig::default()).unwrap();
    assert!(matches!(solver.dynamics(&[0.0; 5]), Err(MekanoError::InvalidState(_))));
}

#[test]
fn dynamics_advances_time_and_state() {
    let mut solver = Solver::new(hinge_world(0.3, 0.0), SolverConfig::default().with_dt(0.01)).unwrap();
    let y0 = solver.world().gather_state();
    let y1 = solver.dynamics(&y0).unwrap();
    assert_eq!(y1.len(), 2);
    assert!((solver.time() - 0.01).abs() < 1e-12);
    // gravity swings the rod back towards q = 0
    assert!(y1[1] < 0.0);
    assert!((y1[0] - (y0[0] + 0.01 * y1[1])).abs() < 1e-12);
    let ydot = solver.world().gather_ddofs();
    assert!((ydot[1] - y1[1] / 0.01).abs() < 1e-9);
}

#[test]
fn event_bus_receives_step_events() {
    let sink = VecSink::new();
    let log = sink.log();
    let bus = EventBus::new().with_sink(Box::new(sink));
    let config = SolverConfig {
        record_energy: true,
        ..SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.05)
    };
    let mut solver = Solver::new(hinge_world(0.3, 0.0), config)
        .unwrap()
        .with_event_bus(bus);
    solver.solve().unwrap();

    let solves = log.filter(|k| matches!(k, EventKind::LinearSolve { .. }));
    assert_eq!(solves.len(), 5);
    assert_eq!(log.filter(|k| matches!(k, EventKind::Energy { .. })).len(), 5);
    assert_eq!(log.filter(|k| matches!(k, EventKind::StepBegin { .. })).len(), 5);
}

#[test]
fn failed_step_reaches_the_event_bus() {
    let sink = VecSink::new();
    let log = sink.log();
    let config = SolverConfig::default().with_dt(0.01);
    let mut solver = Solver::new(hinge_world(0.3, 0.0), config)
        .unwrap()
        .with_event_bus(EventBus::new().with_sink(Box::new(sink)));

    let err = solver.dynamics(&[0.0; 3]).unwrap_err();
    assert!(matches!(err, MekanoError::InvalidState(_)));
    let events = log.snapshot();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0].kind, EventKind::StepBegin { .. }));
    match &events[1].kind {
        EventKind::StepFailed { error } => assert!(error.contains("state has length 3"), "{error}"),
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(solver.bus().map(EventBus::pending), Some(0));
}

#[test]
fn solution_records_every_step() {
    let config = SolverConfig::default().with_dt(0.01).with_t_span(0.0, 0.1);
    let mut solver = Solver::new(hinge_world(0.3, 0.0), config).unwrap();
    let solution = solver.solve().unwrap();
    assert_eq!(solution.len(), 11);
    assert!(solution.t[0].abs() < 1e-12);
    assert!((solution.t[10] - 0.1).abs() < 1e-9);
    assert!((solution.step(0).unwrap()[0] - 0.3).abs() < 1e-12);
}

#[test]
fn dynamic_component_trait_object() {
    let soft = SoftBody::from_mesh("tet", &single_tet(), block_props()).unwrap();
    let dynamics: &dyn Dynamics = &soft;
    let mut mass = Vec::new();
    dynamics.compute_mass_sparse(&mut mass);
    assert_eq!(mass.len(), 12);
}
