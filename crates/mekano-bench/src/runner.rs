//! Benchmark runner — executes scenarios with the solver and collects metrics.

use std::time::Instant;

use mekano_solver::Solver;
use mekano_types::MekanoResult;

use crate::metrics::BenchmarkMetrics;
use crate::scenarios::{Scenario, ScenarioKind};

/// Runs benchmark scenarios and collects metrics.
pub struct BenchmarkRunner;

impl BenchmarkRunner {
    /// Run a single scenario.
    ///
    /// The scenario's world is cloned, so a scenario can be run repeatedly.
    pub fn run(scenario: &Scenario) -> MekanoResult<BenchmarkMetrics> {
        let mut solver = Solver::new(scenario.world.clone(), scenario.config.clone())?;
        let energy0 = solver.world().compute_energy().total();

        let mut step_times: Vec<f64> = Vec::with_capacity(scenario.timesteps as usize);
        let mut total_iterations: u64 = 0;
        let mut max_residual: f64 = 0.0;
        let mut max_inverted = 0;
        let mut qp_steps = 0;

        let total_start = Instant::now();
        for _ in 0..scenario.timesteps {
            let report = solver.step()?;
            step_times.push(report.wall_time);
            total_iterations += u64::from(report.iterations);
            max_inverted = max_inverted.max(report.inverted_elements);
            if report.method.starts_with("qp") {
                qp_steps += 1;
            }
            max_residual = max_residual.max(solver.constraint_residual());
        }
        let total_wall_time = total_start.elapsed().as_secs_f64();

        let world = solver.world();
        let energy = world.compute_energy();

        let avg_step = if step_times.is_empty() {
            0.0
        } else {
            step_times.iter().sum::<f64>() / step_times.len() as f64
        };
        let min_step = step_times.iter().copied().fold(f64::MAX, f64::min);
        let max_step = step_times.iter().copied().fold(0.0, f64::max);
        let avg_iter = if scenario.timesteps > 0 {
            total_iterations as f64 / f64::from(scenario.timesteps)
        } else {
            0.0
        };

        Ok(BenchmarkMetrics {
            scenario: scenario.kind.name().to_string(),
            dof: world.sizes().nr,
            body_count: world.tree.bodies.len(),
            node_count: world.node_count(),
            total_wall_time,
            timesteps: scenario.timesteps,
            avg_step_time: avg_step,
            min_step_time: min_step,
            max_step_time: max_step,
            energy_drift: energy.total() - energy0,
            final_kinetic_energy: energy.kinetic,
            max_constraint_residual: max_residual,
            avg_iterations: avg_iter,
            qp_steps,
            max_inverted,
        })
    }

    /// Run all scenarios and return metrics for each.
    pub fn run_all() -> MekanoResult<Vec<BenchmarkMetrics>> {
        let mut results = Vec::new();
        for &kind in ScenarioKind::all() {
            let scenario = Scenario::from_kind(kind)?;
            results.push(Self::run(&scenario)?);
        }
        Ok(results)
    }
}
