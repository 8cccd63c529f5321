//! Simulation event types.
//!
//! Structured events emitted by the step solver. Events are lightweight
//! value types that carry just enough data to be useful for monitoring
//! and debugging.

use serde::{Deserialize, Serialize};

/// A simulation event emitted by the engine.
///
/// Events are tagged with a step index and carry domain-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Step number (0-indexed).
    pub step: u32,
    /// Event payload.
    pub kind: EventKind,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Step started.
    StepBegin {
        /// Simulation time at the start of the step (seconds).
        sim_time: f64,
        /// Timestep (seconds).
        dt: f64,
    },

    /// Step completed.
    StepEnd {
        /// Wall-clock time for the entire step (seconds).
        wall_time: f64,
    },

    /// Step aborted with an error; no `StepEnd` follows.
    StepFailed {
        /// Error message.
        error: String,
    },

    /// Velocity solve diagnostics.
    LinearSolve {
        /// Strategy and method, e.g. `"kkt/minres"`.
        method: String,
        /// Iterations used (0 for direct methods).
        iterations: u32,
        /// Final relative residual.
        residual: f64,
        /// Whether the solve met its tolerance.
        converged: bool,
    },

    /// Constraint rows active this step.
    ActiveSet {
        /// Active equality rows (maximal + reduced).
        equality_rows: u32,
        /// Active inequality rows (maximal + reduced).
        inequality_rows: u32,
    },

    /// A soft body has inverted elements.
    Inversion {
        /// Component index within the world.
        component: u32,
        /// Number of inverted tetrahedra.
        elements: u32,
    },

    /// Energy snapshot at the end of the step.
    Energy {
        /// Kinetic energy.
        kinetic: f64,
        /// Gravitational potential energy.
        potential: f64,
        /// Elastic energy (tetrahedra, springs, joint springs).
        elastic: f64,
    },

    /// Custom event for extensibility.
    Custom {
        /// Arbitrary label.
        label: String,
        /// JSON-encoded payload.
        payload: String,
    },
}

impl SimulationEvent {
    /// Creates a new event for the given step.
    pub fn new(step: u32, kind: EventKind) -> Self {
        Self { step, kind }
    }
}
