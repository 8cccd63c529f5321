//! Velocity solves for one step.
//!
//! The step solver picks a strategy from the number of active equality and
//! inequality rows `(ne, ni)`:
//!
//! | `(ne, ni)` | Strategy |
//! |---|---|
//! | `(0, 0)` | [`UnconstrainedSolve`]: `MDK q̇ = f` by CG or Cholesky |
//! | `(>0, 0)` | [`KktSolve`]: `[[MDK, Gᵗ], [G, -εI]] [q̇; λ] = [f; rhs_G]` |
//! | otherwise | [`QpSolve`]: `min ½ q̇ᵗ MDK q̇ - fᵗ q̇` s.t. `G q̇ = rhs_G`, `C q̇ ≤ rhs_C` |
//!
//! All three share the multiplier sign: `MDK q̇ + Gᵗλ + Cᵗμ = f`.

use mekano_math::faer_solver::{DenseFactorization, FaerCholesky, FaerDense};
use mekano_math::iterative::{
    bicgstab, conjugate_gradient, minres, IdentityPreconditioner, IterativeOutcome,
    JacobiPreconditioner, Preconditioner, SaddlePointPreconditioner,
};
use mekano_math::qp::{ActiveSetQp, QpBackend, QuadraticProgram};
use mekano_math::{dense, CsrMatrix, SparseSolver, Triplet};
use mekano_types::{MekanoError, MekanoResult};
use tracing::{debug, warn};

use crate::assembly::ReducedSystem;
use crate::config::{LinearMethod, SolverConfig, UnconstrainedMethod};

/// Result of a velocity solve.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocitySolution {
    /// New reduced velocity `q̇¹`.
    pub qdot: Vec<f64>,
    /// Multipliers of the active equality rows.
    pub eq_multipliers: Vec<f64>,
    /// Multipliers of the active inequality rows.
    pub ineq_multipliers: Vec<f64>,
    /// Iterations used (0 for direct methods).
    pub iterations: u32,
    /// Relative residual of the solved system.
    pub residual: f64,
    pub converged: bool,
}

/// A velocity solve strategy.
pub trait VelocitySolve {
    fn solve(&mut self, system: &ReducedSystem, config: &SolverConfig) -> MekanoResult<VelocitySolution>;

    /// Strategy and method, e.g. `"kkt/minres"`.
    fn name(&self) -> String;
}

fn relative_residual(a: &CsrMatrix, b: &[f64], x: &[f64]) -> f64 {
    let ax = a.mul_vec(x);
    let r: Vec<f64> = b.iter().zip(&ax).map(|(bi, ai)| bi - ai).collect();
    let b_norm = dense::norm(b);
    if b_norm > 0.0 {
        dense::norm(&r) / b_norm
    } else {
        dense::norm(&r)
    }
}

fn direct_outcome(a: &CsrMatrix, b: &[f64], x: &[f64]) -> IterativeOutcome {
    IterativeOutcome {
        iterations: 0,
        residual: relative_residual(a, b, x),
        converged: true,
    }
}

fn linear_error(method: &str, err: String) -> MekanoError {
    MekanoError::LinearSolve(format!("{method}: {err}"))
}

/// `MDK q̇ = f` without constraints.
#[derive(Default)]
pub struct UnconstrainedSolve {
    method: UnconstrainedMethod,
    cholesky: FaerCholesky,
}

impl UnconstrainedSolve {
    pub fn new(method: UnconstrainedMethod) -> Self {
        Self {
            method,
            cholesky: FaerCholesky::new(),
        }
    }

    fn cg(system: &ReducedSystem, config: &SolverConfig) -> (Vec<f64>, IterativeOutcome) {
        let mut x = system.qdot0.clone();
        let outcome = conjugate_gradient(
            &system.mdk,
            &system.rhs,
            &mut x,
            &config.unconstrained_settings,
            &IdentityPreconditioner,
        );
        (x, outcome)
    }
}

impl VelocitySolve for UnconstrainedSolve {
    fn solve(&mut self, system: &ReducedSystem, config: &SolverConfig) -> MekanoResult<VelocitySolution> {
        let (qdot, outcome) = match self.method {
            UnconstrainedMethod::ConjugateGradient => Self::cg(system, config),
            UnconstrainedMethod::Cholesky => {
                let mut x = vec![0.0; system.dof()];
                let factored = self
                    .cholesky
                    .factorize(&system.mdk)
                    .and_then(|()| self.cholesky.solve(&system.rhs, &mut x));
                match factored {
                    Ok(()) => {
                        let outcome = direct_outcome(&system.mdk, &system.rhs, &x);
                        (x, outcome)
                    }
                    Err(err) => {
                        warn!(error = %err, "Cholesky failed, falling back to CG");
                        Self::cg(system, config)
                    }
                }
            }
        };
        Ok(VelocitySolution {
            qdot,
            eq_multipliers: Vec::new(),
            ineq_multipliers: Vec::new(),
            iterations: outcome.iterations,
            residual: outcome.residual,
            converged: outcome.converged,
        })
    }

    fn name(&self) -> String {
        format!("unconstrained/{}", self.method)
    }
}

/// Equality-constrained saddle-point solve with a pluggable method.
pub struct KktSolve {
    method: LinearMethod,
    direct: FaerDense,
}

impl KktSolve {
    pub fn new(method: LinearMethod) -> Self {
        let factorization = match method {
            LinearMethod::Ldlt => DenseFactorization::Ldlt,
            LinearMethod::Qr => DenseFactorization::Qr,
            _ => DenseFactorization::Lu,
        };
        Self {
            method,
            direct: FaerDense::new(factorization),
        }
    }

    #[inline]
    pub fn method(&self) -> LinearMethod {
        self.method
    }

    /// `[[H, Gᵗ], [G, -εI]]` with `ε = regularization · max|diag H|`.
    fn kkt_matrix(system: &ReducedSystem, regularization: f64) -> CsrMatrix {
        let n = system.dof();
        let m = system.ne();
        let mut triplets: Vec<Triplet> = system.mdk.to_triplets();
        for t in system.g.to_triplets() {
            triplets.push(Triplet::new(n + t.row, t.col, t.val));
            triplets.push(Triplet::new(t.col, n + t.row, t.val));
        }
        let scale = system
            .mdk
            .diagonal()
            .iter()
            .fold(1.0_f64, |acc, d| acc.max(d.abs()));
        for i in n..n + m {
            triplets.push(Triplet::new(i, i, -regularization * scale));
        }
        CsrMatrix::from_triplets(n + m, n + m, &triplets)
    }
}

impl VelocitySolve for KktSolve {
    fn solve(&mut self, system: &ReducedSystem, config: &SolverConfig) -> MekanoResult<VelocitySolution> {
        let n = system.dof();
        let a = Self::kkt_matrix(system, config.kkt_regularization);
        let mut b = system.rhs.clone();
        b.extend_from_slice(&system.rhs_g);
        let mut x = system.qdot0.clone();
        x.resize(n + system.ne(), 0.0);
        let settings = &config.kkt_settings;
        let name = self.method.name();

        let outcome = match self.method {
            LinearMethod::ConjugateGradient => {
                conjugate_gradient(&a, &b, &mut x, settings, &IdentityPreconditioner)
            }
            LinearMethod::PreconditionedCg => {
                conjugate_gradient(&a, &b, &mut x, settings, &JacobiPreconditioner::new(&a))
            }
            LinearMethod::Minres => {
                let precond: Box<dyn Preconditioner> =
                    match SaddlePointPreconditioner::new(&system.mdk, &system.g) {
                        Ok(p) => Box::new(p),
                        Err(err) => {
                            debug!(error = %err, "Saddle-point preconditioner unavailable, using Jacobi");
                            Box::new(JacobiPreconditioner::new(&a))
                        }
                    };
                minres(&a, &b, &mut x, settings, precond.as_ref())
            }
            LinearMethod::BiCgStab => bicgstab(&a, &b, &mut x, settings, &IdentityPreconditioner),
            LinearMethod::PreconditionedBiCgStab => {
                bicgstab(&a, &b, &mut x, settings, &JacobiPreconditioner::new(&a))
            }
            LinearMethod::Lu | LinearMethod::Ldlt | LinearMethod::Qr | LinearMethod::Qp => {
                self.direct
                    .factorize(&a)
                    .and_then(|()| self.direct.solve(&b, &mut x))
                    .map_err(|e| linear_error(name, e))?;
                direct_outcome(&a, &b, &x)
            }
        };

        if x.iter().any(|v| !v.is_finite()) {
            return Err(MekanoError::LinearSolve(format!(
                "{name}: solution is not finite"
            )));
        }
        let eq_multipliers = x.split_off(n);
        Ok(VelocitySolution {
            qdot: x,
            eq_multipliers,
            ineq_multipliers: Vec::new(),
            iterations: outcome.iterations,
            residual: outcome.residual,
            converged: outcome.converged,
        })
    }

    fn name(&self) -> String {
        format!("kkt/{}", self.method)
    }
}

/// Inequality-constrained solve as a convex QP.
pub struct QpSolve {
    backend: Box<dyn QpBackend>,
}

impl QpSolve {
    pub fn new(backend: Box<dyn QpBackend>) -> Self {
        Self { backend }
    }
}

impl Default for QpSolve {
    fn default() -> Self {
        Self::new(Box::new(ActiveSetQp::default()))
    }
}

impl VelocitySolve for QpSolve {
    fn solve(&mut self, system: &ReducedSystem, _config: &SolverConfig) -> MekanoResult<VelocitySolution> {
        let linear: Vec<f64> = system.rhs.iter().map(|f| -f).collect();
        let qp = QuadraticProgram {
            hessian: &system.mdk,
            linear: &linear,
            equality: (system.ne() > 0).then_some((&system.g, system.rhs_g.as_slice())),
            inequality: (system.ni() > 0).then_some((&system.c, system.rhs_c.as_slice())),
        };
        let solution = self
            .backend
            .solve(&qp)
            .map_err(|e| linear_error(self.backend.name(), e))?;

        // stationarity: MDK q̇ + Gᵗλ + Cᵗμ = f
        let mut r = system.mdk.mul_vec(&solution.x);
        if system.ne() > 0 {
            dense::axpy(1.0, &system.g.transpose_mul_vec(&solution.equality_multipliers), &mut r);
        }
        if system.ni() > 0 {
            dense::axpy(1.0, &system.c.transpose_mul_vec(&solution.inequality_multipliers), &mut r);
        }
        dense::axpy(-1.0, &system.rhs, &mut r);
        let f_norm = dense::norm(&system.rhs);
        let residual = if f_norm > 0.0 {
            dense::norm(&r) / f_norm
        } else {
            dense::norm(&r)
        };

        Ok(VelocitySolution {
            qdot: solution.x,
            eq_multipliers: solution.equality_multipliers,
            ineq_multipliers: solution.inequality_multipliers,
            iterations: solution.iterations,
            residual,
            converged: true,
        })
    }

    fn name(&self) -> String {
        format!("qp/{}", self.backend.name())
    }
}
