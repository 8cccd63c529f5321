//! # mekano-telemetry
//!
//! Event bus for simulation telemetry. The step solver emits structured
//! events (timing, linear solve diagnostics, active constraint rows,
//! inverted elements, energy) that pluggable sinks consume, one step at a
//! time.

pub mod bus;
pub mod events;
pub mod sinks;

pub use bus::{EventBus, FlushPolicy};
pub use events::{EventKind, SimulationEvent};
pub use sinks::{EventLog, EventSink, TracingSink, VecSink};
