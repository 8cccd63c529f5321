//! # mekano-bench
//!
//! Benchmark suite for the mekano solver.
//!
//! Provides 4 procedural scenarios covering rigid, articulated, soft and
//! hybrid systems, metric collection, and CSV/JSON export for regression
//! tracking.

pub mod metrics;
pub mod runner;
pub mod scenarios;

pub use metrics::BenchmarkMetrics;
pub use runner::BenchmarkRunner;
pub use scenarios::{Scenario, ScenarioKind};
