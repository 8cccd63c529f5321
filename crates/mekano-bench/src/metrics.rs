//! Benchmark metrics — data collected during a benchmark run.

use serde::{Deserialize, Serialize};

/// Metrics collected from a benchmark scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Reduced DOFs of the world.
    pub dof: usize,
    /// Rigid bodies in the tree.
    pub body_count: usize,
    /// Deformable nodes over all components.
    pub node_count: usize,
    /// Total wall-clock time (seconds).
    pub total_wall_time: f64,
    /// Number of timesteps executed.
    pub timesteps: u32,
    /// Average wall-clock time per timestep (seconds).
    pub avg_step_time: f64,
    pub min_step_time: f64,
    pub max_step_time: f64,
    /// Total energy at the end minus total energy at the start.
    pub energy_drift: f64,
    pub final_kinetic_energy: f64,
    /// Largest constraint violation seen after any step.
    pub max_constraint_residual: f64,
    /// Average solver iterations per step.
    pub avg_iterations: f64,
    /// Steps that went through the inequality (QP) path.
    pub qp_steps: u32,
    /// Most inverted elements seen in a single step.
    pub max_inverted: usize,
}

impl BenchmarkMetrics {
    /// CSV header matching [`to_csv_row`](Self::to_csv_row).
    pub fn to_csv_header() -> String {
        "scenario,dof,bodies,nodes,timesteps,total_wall_time_s,avg_step_ms,min_step_ms,max_step_ms,energy_drift,final_ke,max_residual,avg_iterations,qp_steps,max_inverted".to_string()
    }

    /// Format this metrics instance as a CSV data row.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{:.6},{:.4},{:.4},{:.4},{:.6e},{:.6e},{:.3e},{:.1},{},{}",
            self.scenario,
            self.dof,
            self.body_count,
            self.node_count,
            self.timesteps,
            self.total_wall_time,
            self.avg_step_time * 1000.0,
            self.min_step_time * 1000.0,
            self.max_step_time * 1000.0,
            self.energy_drift,
            self.final_kinetic_energy,
            self.max_constraint_residual,
            self.avg_iterations,
            self.qp_steps,
            self.max_inverted,
        )
    }

    /// Format multiple metrics as a complete CSV string.
    pub fn to_csv(metrics: &[BenchmarkMetrics]) -> String {
        let mut csv = Self::to_csv_header();
        for m in metrics {
            csv.push('\n');
            csv.push_str(&m.to_csv_row());
        }
        csv
    }
}
