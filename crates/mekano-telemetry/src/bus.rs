//! Step-scoped event bus.
//!
//! The solver emits a burst of events per step: `StepBegin`, diagnostics,
//! then `StepEnd` or `StepFailed`. The bus buffers them and hands each
//! closed step to the sinks as one batch, so a sink never sees half a step
//! unless the caller flushes explicitly.

use crate::events::{EventKind, SimulationEvent};
use crate::sinks::EventSink;

/// When buffered events reach the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Deliver each step's batch as soon as the step closes.
    #[default]
    PerStep,
    /// Hold everything until [`EventBus::flush`] (the solver flushes at the
    /// end of `Solver::solve` and after a failed step).
    Manual,
}

/// Event bus for simulation telemetry.
pub struct EventBus {
    pending: Vec<SimulationEvent>,
    sinks: Vec<Box<dyn EventSink>>,
    policy: FlushPolicy,
    enabled: bool,
    delivered: usize,
}

impl EventBus {
    /// Creates a bus with no sinks that delivers per step.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            sinks: Vec::new(),
            policy: FlushPolicy::default(),
            enabled: true,
            delivered: 0,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.add_sink(sink);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// A disabled bus drops events, including any already buffered.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.pending.clear();
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Buffers an event; a step-closing event delivers the batch under
    /// [`FlushPolicy::PerStep`].
    pub fn emit(&mut self, event: SimulationEvent) {
        if !self.enabled {
            return;
        }
        let closes_step = matches!(
            event.kind,
            EventKind::StepEnd { .. } | EventKind::StepFailed { .. }
        );
        self.pending.push(event);
        if closes_step && self.policy == FlushPolicy::PerStep {
            self.flush();
        }
    }

    /// Delivers every buffered event, open step included.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        for sink in &mut self.sinks {
            for event in &self.pending {
                sink.handle(event);
            }
        }
        self.delivered += self.pending.len();
        self.pending.clear();
    }

    /// Flushes and finalizes every sink.
    pub fn finish(&mut self) {
        self.flush();
        for sink in &mut self.sinks {
            sink.finalize();
        }
    }

    /// Events buffered but not yet delivered.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Events delivered so far (counted once, not per sink).
    #[inline]
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    #[inline]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
