//! Integration tests for mekano-bench.

use mekano_bench::metrics::BenchmarkMetrics;
use mekano_bench::runner::BenchmarkRunner;
use mekano_bench::scenarios::{Scenario, ScenarioKind};
use mekano_material::{MaterialModel, SolidProperties};
use mekano_solver::{Component, ConstraintBlock, LinearMethod, SolverConfig};

// ─── Scenario Tests ───────────────────────────────────────────

#[test]
fn free_fall_setup() {
    let s = Scenario::free_fall().unwrap();
    assert_eq!(s.kind, ScenarioKind::FreeFall);
    assert_eq!(s.world.tree.bodies.len(), 1);
    assert!(s.world.constraints.is_empty());
    assert!(s.world.components.is_empty());
}

#[test]
fn pendulum_setup() {
    let s = Scenario::pendulum().unwrap();
    assert_eq!(s.world.tree.joints.len(), 3);
    assert_eq!(s.world.constraints.len(), 1);
    assert_eq!(s.world.constraints[0].block(), ConstraintBlock::EqualityMaximal);
}

#[test]
fn pendulum_starts_on_its_constraint() {
    let mut s = Scenario::pendulum().unwrap();
    s.world.init(&Default::default()).unwrap();
    assert!(s.world.constraint_violation() < 1e-12);
}

#[test]
fn soft_block_setup() {
    let s = Scenario::soft_block().unwrap();
    let beam = s.world.components[0].soft_body().unwrap();
    assert_eq!(beam.node_count(), 20); // 5×2×2
    assert_eq!(beam.tet_count(), 24); // 4 cubes × 6 tets
    let clamped = beam.nodes.iter().filter(|n| !n.is_free()).count();
    assert_eq!(clamped, 4);
}

#[test]
fn soft_block_rejects_bad_material() {
    let bad = SolidProperties {
        name: "bad".into(),
        density: -1.0,
        youngs_modulus: 1.0e3,
        poisson_ratio: 0.3,
        model: MaterialModel::Linear,
        damping: 0.0,
    };
    assert!(Scenario::soft_block_with(bad).is_err());
}

#[test]
fn hybrid_attach_setup() {
    let s = Scenario::hybrid_attach().unwrap();
    let block = match &s.world.components[0] {
        Component::SoftBody(b) => b,
        _ => panic!("expected a soft body"),
    };
    assert_eq!(block.node_count(), 27); // 3×3×3
    let attached = block.nodes.iter().filter(|n| !n.is_free()).count();
    assert_eq!(attached, 9); // top face
    assert_eq!(s.world.constraints.len(), 9); // bottom face
}

#[test]
fn all_scenarios() {
    assert_eq!(ScenarioKind::all().len(), 4);
}

// ─── Runner Tests ─────────────────────────────────────────────

#[test]
fn run_free_fall() {
    let mut scenario = Scenario::free_fall().unwrap();
    scenario.timesteps = 5;
    let metrics = BenchmarkRunner::run(&scenario).unwrap();

    assert_eq!(metrics.scenario, "free_fall");
    assert_eq!(metrics.timesteps, 5);
    assert_eq!(metrics.dof, 6);
    assert!(metrics.total_wall_time > 0.0);
    assert!(metrics.energy_drift.is_finite());
    assert_eq!(metrics.qp_steps, 0);
}

#[test]
fn run_pendulum_holds_loop() {
    let mut scenario = Scenario::pendulum().unwrap();
    scenario.timesteps = 20;
    let metrics = BenchmarkRunner::run(&scenario).unwrap();
    assert_eq!(metrics.dof, 5);
    assert!(metrics.max_constraint_residual < 1e-2);
}

#[test]
fn run_with_direct_kkt() {
    let mut scenario = Scenario::pendulum().unwrap().with_config(SolverConfig {
        equality: LinearMethod::Lu,
        ..SolverConfig::default().with_dt(0.01)
    });
    scenario.timesteps = 5;
    let metrics = BenchmarkRunner::run(&scenario).unwrap();
    assert!(metrics.max_constraint_residual < 1e-2);
}

#[test]
fn run_all_scenarios() {
    for &kind in ScenarioKind::all() {
        let mut scenario = Scenario::from_kind(kind).unwrap();
        scenario.timesteps = 3;
        let metrics = BenchmarkRunner::run(&scenario).unwrap();
        assert_eq!(metrics.scenario, kind.name());
        assert!(metrics.total_wall_time >= 0.0);
        assert!(metrics.final_kinetic_energy.is_finite());
    }
}

#[test]
fn run_all_covers_every_scenario() {
    let results = BenchmarkRunner::run_all().unwrap();
    let names: Vec<&str> = results.iter().map(|m| m.scenario.as_str()).collect();
    assert_eq!(names, ["free_fall", "pendulum", "soft_block", "hybrid_attach"]);
    assert!(results.iter().all(|m| m.timesteps > 0));
}

// ─── Metrics Tests ────────────────────────────────────────────

fn sample_metrics() -> BenchmarkMetrics {
    BenchmarkMetrics {
        scenario: "test".into(),
        dof: 12,
        body_count: 1,
        node_count: 8,
        total_wall_time: 1.5,
        timesteps: 100,
        avg_step_time: 0.015,
        min_step_time: 0.010,
        max_step_time: 0.025,
        energy_drift: -0.25,
        final_kinetic_energy: 0.001,
        max_constraint_residual: 1e-4,
        avg_iterations: 10.0,
        qp_steps: 3,
        max_inverted: 0,
    }
}

#[test]
fn csv_output() {
    let m = sample_metrics();
    let csv = BenchmarkMetrics::to_csv(&[m]);
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    let row = lines.next().unwrap();
    assert!(header.starts_with("scenario,"));
    assert!(row.starts_with("test,12,1,8,100,"));
    assert_eq!(header.split(',').count(), row.split(',').count());
    assert!(lines.next().is_none());
}

#[test]
fn metrics_json_round_trip() {
    let m = sample_metrics();
    let json = serde_json::to_string(&m).unwrap();
    let back: BenchmarkMetrics = serde_json::from_str(&json).unwrap();
    assert_eq!(back.scenario, "test");
    assert_eq!(back.qp_steps, 3);
    assert!((back.energy_drift + 0.25).abs() < 1e-12);
}
