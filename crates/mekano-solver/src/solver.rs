//! Implicit step solver.
//!
//! One call to [`Solver::dynamics`] advances the world by one implicit
//! Euler step:
//!
//! ```text
//! scatter(y) → assemble → velocity solve (by (ne, ni)) → scatter multipliers
//!   → q̈ = (q̇¹ - q̇₀)/h, q¹ = q₀ + h q̇¹ → scatter → reparam → gather
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mekano_math::qp::{ActiveSetQp, QpBackend};
use mekano_math::DVec3;
use mekano_telemetry::{EventBus, EventKind, SimulationEvent};
use mekano_types::{MekanoError, MekanoResult};

use crate::assembly::{assemble, build_cache, ReducedSystem};
use crate::component::Component;
use crate::config::{LinearMethod, SolverConfig};
use crate::solution::Solution;
use crate::strategy::{KktSolve, QpSolve, UnconstrainedSolve, VelocitySolution, VelocitySolve};
use crate::workspace::{StepCache, StepWorkspace, WorldSizes};
use crate::world::World;

/// Diagnostics of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step index (0-indexed).
    pub step: u32,
    /// Simulation time at the end of the step.
    pub time: f64,
    /// Strategy and method used.
    pub method: String,
    pub iterations: u32,
    pub residual: f64,
    pub converged: bool,
    /// Active equality rows.
    pub equality_rows: usize,
    /// Active inequality rows.
    pub inequality_rows: usize,
    /// Inverted tetrahedra over all soft bodies.
    pub inverted_elements: usize,
    /// Joints whose exponential coordinates were wrapped.
    pub reparametrized: usize,
    /// Wall-clock time of the step in seconds.
    pub wall_time: f64,
}

/// Drives a [`World`] through time.
pub struct Solver {
    world: World,
    config: SolverConfig,
    workspace: StepWorkspace,
    cache: Option<StepCache>,
    unconstrained: UnconstrainedSolve,
    kkt: KktSolve,
    qp: QpSolve,
    solution: Solution,
    bus: Option<EventBus>,
    step: u32,
    last_report: Option<StepReport>,
}

/// Spreads multipliers of the active rows back to full block vectors.
fn block_multipliers(rows: &[usize], block_len: usize, values: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; block_len];
    for (&row, &v) in rows.iter().zip(values) {
        out[row] = v;
    }
    out
}

impl Solver {
    /// Validates the configuration and initializes the world.
    pub fn new(mut world: World, config: SolverConfig) -> MekanoResult<Self> {
        config.validate()?;
        world.gravity = DVec3::from_array(config.gravity);
        world.time = config.t_span[0];
        let sizes = world.init(&config.inversion)?;
        info!(
            nm = sizes.nm,
            nr = sizes.nr,
            dt = config.dt,
            unconstrained = %config.unconstrained,
            equality = %config.equality,
            "Solver initialized"
        );
        Ok(Self {
            workspace: StepWorkspace::new(&sizes),
            cache: None,
            unconstrained: UnconstrainedSolve::new(config.unconstrained),
            kkt: KktSolve::new(config.equality),
            qp: QpSolve::new(Box::new(ActiveSetQp::new(config.qp))),
            solution: Solution::new(),
            bus: None,
            step: 0,
            last_report: None,
            world,
            config,
        })
    }

    /// Routes events to a bus.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replaces the QP backend used for inequality-constrained steps.
    #[must_use]
    pub fn with_qp_backend(mut self, backend: Box<dyn QpBackend>) -> Self {
        self.qp = QpSolve::new(backend);
        self
    }

    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world. The step cache is rebuilt on the next
    /// step; topology changes need [`reinit`](Self::reinit).
    pub fn world_mut(&mut self) -> &mut World {
        self.cache = None;
        &mut self.world
    }

    /// Re-runs world initialization after a topology change.
    pub fn reinit(&mut self) -> MekanoResult<WorldSizes> {
        let sizes = self.world.init(&self.config.inversion)?;
        self.workspace = StepWorkspace::new(&sizes);
        self.cache = None;
        Ok(sizes)
    }

    #[inline]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    #[inline]
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    #[inline]
    pub fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Report of the last step taken.
    #[inline]
    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// Current simulation time.
    #[inline]
    pub fn time(&self) -> f64 {
        self.world.time
    }

    /// Largest constraint violation at the current state.
    pub fn constraint_residual(&mut self) -> f64 {
        self.world.constraint_violation()
    }

    fn emit(&mut self, kind: EventKind) {
        if let Some(bus) = &mut self.bus {
            bus.emit(SimulationEvent::new(self.step, kind));
        }
    }

    /// Assembles the step system at state `y` without solving it.
    pub fn assemble(&mut self, y: &[f64]) -> MekanoResult<ReducedSystem> {
        self.world.scatter_state(y)?;
        let cache = self.cache.get_or_insert_with(|| build_cache(&self.world));
        Ok(assemble(
            &mut self.world,
            cache,
            &mut self.workspace,
            self.config.dt,
            self.config.baumgarte_gain,
        ))
    }

    /// Advances one implicit step from the stacked state `y = [q; q̇]` and
    /// returns the next stacked state. A failure closes the step on the
    /// event bus with `StepFailed`.
    pub fn dynamics(&mut self, y: &[f64]) -> MekanoResult<Vec<f64>> {
        let result = self.advance(y);
        if let Err(err) = &result {
            self.emit(EventKind::StepFailed {
                error: err.to_string(),
            });
        }
        result
    }

    fn advance(&mut self, y: &[f64]) -> MekanoResult<Vec<f64>> {
        let start = Instant::now();
        let h = self.config.dt;
        self.emit(EventKind::StepBegin {
            sim_time: self.world.time,
            dt: h,
        });

        let system = self.assemble(y)?;
        let projected = self.world.projection.as_ref().map(|p| system.project(p));
        let target = projected.as_ref().unwrap_or(&system);
        let (ne, ni) = (target.ne(), target.ni());

        let strategy: &mut dyn VelocitySolve = match (ne, ni) {
            (0, 0) => &mut self.unconstrained,
            (_, 0) if self.kkt.method() != LinearMethod::Qp => &mut self.kkt,
            _ => &mut self.qp,
        };
        let method = strategy.name();
        let solved = strategy.solve(target, &self.config)?;
        if !solved.converged {
            if self.config.strict_convergence {
                return Err(MekanoError::SolverDivergence {
                    iterations: solved.iterations,
                    residual: solved.residual,
                });
            }
            warn!(
                step = self.step,
                method = %method,
                iterations = solved.iterations,
                residual = solved.residual,
                "Velocity solve did not converge"
            );
        }

        let qdot1 = match &self.world.projection {
            Some(p) => p.mul_vec(&solved.qdot),
            None => solved.qdot.clone(),
        };
        self.scatter_multipliers(&system, &solved, h);

        let nr = system.dof();
        let mut yk = vec![0.0; 2 * nr];
        let mut ydot = vec![0.0; 2 * nr];
        for i in 0..nr {
            yk[i] = system.q0[i] + h * qdot1[i];
            yk[nr + i] = qdot1[i];
            ydot[i] = qdot1[i];
            ydot[nr + i] = (qdot1[i] - system.qdot0[i]) / h;
        }

        self.world.time += h;
        self.world.scatter_state(&yk)?;
        self.world.scatter_ddofs(&ydot)?;
        let reparametrized = self.world.reparam();
        let next = self.world.gather_state();

        let report = StepReport {
            step: self.step,
            time: self.world.time,
            method,
            iterations: solved.iterations,
            residual: solved.residual,
            converged: solved.converged,
            equality_rows: ne,
            inequality_rows: ni,
            inverted_elements: self.workspace.inverted_elements,
            reparametrized,
            wall_time: start.elapsed().as_secs_f64(),
        };
        self.report(&report);
        self.last_report = Some(report);
        self.step += 1;
        Ok(next)
    }

    fn scatter_multipliers(&mut self, system: &ReducedSystem, solved: &VelocitySolution, h: f64) {
        let sizes = self.world.sizes();
        let n_eq_m = system.eq_m_rows.len();
        let n_ineq_m = system.ineq_m_rows.len();
        let eq = &solved.eq_multipliers;
        let ineq = &solved.ineq_multipliers;
        let split = |v: &[f64], at: usize| -> (Vec<f64>, Vec<f64>) {
            if v.len() >= at {
                (v[..at].to_vec(), v[at..].to_vec())
            } else {
                (Vec::new(), Vec::new())
            }
        };
        let (eq_m, eq_r) = split(eq, n_eq_m);
        let (ineq_m, ineq_r) = split(ineq, n_ineq_m);
        let lambda_eq_m = block_multipliers(&system.eq_m_rows, sizes.nem, &eq_m);
        let lambda_eq_r = block_multipliers(&system.eq_r_rows, sizes.ner, &eq_r);
        let lambda_ineq_m = block_multipliers(&system.ineq_m_rows, sizes.nim, &ineq_m);
        let lambda_ineq_r = block_multipliers(&system.ineq_r_rows, sizes.nir, &ineq_r);
        for constraint in &mut self.world.constraints {
            constraint.scatter_force_eq_m(&lambda_eq_m, h);
            constraint.scatter_force_eq_r(&lambda_eq_r, h);
            constraint.scatter_force_ineq_m(&lambda_ineq_m, h);
            constraint.scatter_force_ineq_r(&lambda_ineq_r, h);
        }
    }

    fn report(&mut self, report: &StepReport) {
        debug!(
            step = report.step,
            time = report.time,
            method = %report.method,
            iterations = report.iterations,
            residual = report.residual,
            "Step complete"
        );
        if self.bus.is_none() {
            return;
        }
        self.emit(EventKind::LinearSolve {
            method: report.method.clone(),
            iterations: report.iterations,
            residual: report.residual,
            converged: report.converged,
        });
        self.emit(EventKind::ActiveSet {
            equality_rows: report.equality_rows as u32,
            inequality_rows: report.inequality_rows as u32,
        });
        let inverted: Vec<(usize, usize)> = self
            .world
            .components
            .iter()
            .map(|component| match component {
                Component::SoftBody(s) => s.inverted_count(),
                Component::Embedding(e) => e.coarse.inverted_count(),
                Component::Spring(_) => 0,
            })
            .enumerate()
            .filter(|&(_, n)| n > 0)
            .collect();
        for (i, n) in inverted {
            self.emit(EventKind::Inversion {
                component: i as u32,
                elements: n as u32,
            });
        }
        if self.config.record_energy {
            let energy = self.world.compute_energy();
            self.emit(EventKind::Energy {
                kinetic: energy.kinetic,
                potential: energy.potential,
                elastic: energy.elastic,
            });
        }
        self.emit(EventKind::StepEnd {
            wall_time: report.wall_time,
        });
    }

    /// Takes one step from the world's current state and records it.
    pub fn step(&mut self) -> MekanoResult<StepReport> {
        if self.solution.is_empty() {
            self.solution.push(self.world.time, self.world.gather_state());
        }
        let y = self.world.gather_state();
        let next = self.dynamics(&y)?;
        self.solution.push(self.world.time, next);
        self.last_report
            .clone()
            .ok_or_else(|| MekanoError::InvariantViolation("step produced no report".into()))
    }

    /// Integrates over the configured time span and returns the trajectory.
    pub fn solve(&mut self) -> MekanoResult<&Solution> {
        let steps = self.config.step_count();
        info!(steps, t0 = self.config.t_span[0], t1 = self.config.t_span[1], "Solving");
        let mut outcome = Ok(());
        for _ in 0..steps {
            if let Err(err) = self.step() {
                outcome = Err(err);
                break;
            }
        }
        if let Some(bus) = &mut self.bus {
            bus.flush();
        }
        outcome.map(|()| &self.solution)
    }
}
