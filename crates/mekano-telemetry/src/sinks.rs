//! Pluggable event sinks.
//!
//! Sinks consume events from the bus and process them
//! (collect in memory, forward to `tracing`, ...).

use std::sync::{Arc, Mutex};

use crate::events::{EventKind, SimulationEvent};

/// Trait for event consumers.
///
/// Implement this to create custom telemetry outputs.
pub trait EventSink: Send {
    /// Process a single event.
    fn handle(&mut self, event: &SimulationEvent);

    /// Called when the simulation ends. Flush buffers, close files, etc.
    fn finalize(&mut self) {}

    /// Returns a human-readable name for this sink.
    fn name(&self) -> &str;
}

/// Shared read handle on the events collected by a [`VecSink`].
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SimulationEvent>>>,
}

impl EventLog {
    /// Returns a copy of the collected events.
    pub fn snapshot(&self) -> Vec<SimulationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(events) => events.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns true if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collected events matching `pred`.
    pub fn filter(&self, pred: impl Fn(&EventKind) -> bool) -> Vec<SimulationEvent> {
        self.snapshot().into_iter().filter(|e| pred(&e.kind)).collect()
    }

    fn push(&self, event: SimulationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// A simple sink that collects events in memory for testing and inspection.
pub struct VecSink {
    log: EventLog,
}

impl VecSink {
    /// Creates an empty vec sink.
    pub fn new() -> Self {
        Self {
            log: EventLog::default(),
        }
    }

    /// Returns a handle that stays readable after the sink is boxed into a bus.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecSink {
    fn handle(&mut self, event: &SimulationEvent) {
        self.log.push(event.clone());
    }

    fn name(&self) -> &str {
        "vec_sink"
    }
}

/// A sink that logs events using the `tracing` crate.
///
/// Diagnostics that indicate trouble (non-converged solves, inverted
/// elements) are logged at `WARN` regardless of the configured level.
pub struct TracingSink {
    level: tracing::Level,
}

impl TracingSink {
    /// Creates a new tracing sink at the given log level.
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(tracing::Level::DEBUG)
    }
}

impl EventSink for TracingSink {
    fn handle(&mut self, event: &SimulationEvent) {
        let troubled = matches!(
            event.kind,
            EventKind::LinearSolve { converged: false, .. }
                | EventKind::Inversion { .. }
                | EventKind::StepFailed { .. }
        );
        if troubled {
            tracing::warn!(step = event.step, event = ?event.kind, "simulation_event");
            return;
        }
        if self.level == tracing::Level::TRACE {
            tracing::trace!(step = event.step, event = ?event.kind, "simulation_event");
        } else if self.level == tracing::Level::DEBUG {
            tracing::debug!(step = event.step, event = ?event.kind, "simulation_event");
        } else if self.level == tracing::Level::INFO {
            tracing::info!(step = event.step, event = ?event.kind, "simulation_event");
        }
    }

    fn name(&self) -> &str {
        "tracing_sink"
    }
}
