//! Solver configuration.
//!
//! Parameters that control the implicit step: timestep, time span,
//! linear-solve methods with their iteration caps, constraint stabilization
//! and the inversion-safe stress path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use mekano_material::InversionSettings;
use mekano_math::iterative::IterativeSettings;
use mekano_math::qp::QpSettings;
use mekano_types::constants::{DEFAULT_BAUMGARTE_GAIN, DEFAULT_DT, GRAVITY};
use mekano_types::{MekanoError, MekanoResult};

/// Linear solve used for the unconstrained system `MDK_r q̇¹ = f_r'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconstrainedMethod {
    /// Conjugate gradient warm-started from the previous velocity.
    #[default]
    ConjugateGradient,
    /// Sparse Cholesky, falling back to CG if the matrix is not SPD.
    Cholesky,
}

impl UnconstrainedMethod {
    /// Short name used in logs and events.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConjugateGradient => "cg",
            Self::Cholesky => "cholesky",
        }
    }
}

impl fmt::Display for UnconstrainedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnconstrainedMethod {
    type Err = MekanoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cg" | "conjugate_gradient" => Ok(Self::ConjugateGradient),
            "cholesky" | "llt" => Ok(Self::Cholesky),
            other => Err(MekanoError::InvalidConfig(format!(
                "unknown unconstrained method '{other}'"
            ))),
        }
    }
}

/// Method for the equality-constrained KKT system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearMethod {
    ConjugateGradient,
    PreconditionedCg,
    #[default]
    Minres,
    BiCgStab,
    PreconditionedBiCgStab,
    Lu,
    Ldlt,
    Qr,
    /// Solve the KKT system as an equality-constrained QP.
    Qp,
}

impl LinearMethod {
    pub const ALL: [LinearMethod; 9] = [
        LinearMethod::ConjugateGradient,
        LinearMethod::PreconditionedCg,
        LinearMethod::Minres,
        LinearMethod::BiCgStab,
        LinearMethod::PreconditionedBiCgStab,
        LinearMethod::Lu,
        LinearMethod::Ldlt,
        LinearMethod::Qr,
        LinearMethod::Qp,
    ];

    /// Short name used in logs and events.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConjugateGradient => "cg",
            Self::PreconditionedCg => "pcg",
            Self::Minres => "minres",
            Self::BiCgStab => "bicgstab",
            Self::PreconditionedBiCgStab => "pbicgstab",
            Self::Lu => "lu",
            Self::Ldlt => "ldlt",
            Self::Qr => "qr",
            Self::Qp => "qp",
        }
    }

    /// Whether the method iterates (and therefore uses iterative settings).
    pub fn is_iterative(self) -> bool {
        matches!(
            self,
            Self::ConjugateGradient
                | Self::PreconditionedCg
                | Self::Minres
                | Self::BiCgStab
                | Self::PreconditionedBiCgStab
        )
    }
}

impl fmt::Display for LinearMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LinearMethod {
    type Err = MekanoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let method = match lower.as_str() {
            "cg" | "conjugate_gradient" => Self::ConjugateGradient,
            "pcg" | "cg_jacobi" | "preconditioned_cg" => Self::PreconditionedCg,
            "minres" => Self::Minres,
            "bicg" | "bicgstab" => Self::BiCgStab,
            "pbicgstab" | "bicg_jacobi" | "preconditioned_bicgstab" => {
                Self::PreconditionedBiCgStab
            }
            "lu" => Self::Lu,
            "ldlt" => Self::Ldlt,
            "qr" => Self::Qr,
            "qp" => Self::Qp,
            other => {
                return Err(MekanoError::InvalidConfig(format!(
                    "unknown linear method '{other}'"
                )))
            }
        };
        Ok(method)
    }
}

/// Configuration for the implicit step solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Timestep `h` in seconds.
    pub dt: f64,

    /// Simulated interval `[t0, t1]` for [`Solver::solve`](crate::Solver::solve).
    pub t_span: [f64; 2],

    /// Gravity vector in m/s².
    pub gravity: [f64; 3],

    /// Method for steps without active constraints.
    pub unconstrained: UnconstrainedMethod,

    /// Iteration cap and tolerance of the unconstrained CG.
    pub unconstrained_settings: IterativeSettings,

    /// Method for steps with only equality constraints.
    pub equality: LinearMethod,

    /// Iteration cap and tolerance of the iterative KKT methods.
    pub kkt_settings: IterativeSettings,

    /// Negative diagonal on the multiplier block of the KKT matrix, relative
    /// to the largest `MDK` diagonal entry. Keeps redundant constraint rows
    /// from making the system singular.
    #[serde(default = "default_kkt_regularization")]
    pub kkt_regularization: f64,

    /// Position feedback gain `k_p` in `rhs = -ġ - k_p g`.
    pub baumgarte_gain: f64,

    /// Active-set QP settings.
    pub qp: QpSettings,

    /// Inversion-safe stress path.
    pub inversion: InversionSettings,

    /// Turn iterative non-convergence into an error instead of a warning.
    pub strict_convergence: bool,

    /// Emit an energy event every step.
    pub record_energy: bool,
}

fn default_kkt_regularization() -> f64 {
    1e-10
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_DT,
            t_span: [0.0, 1.0],
            gravity: [0.0, -GRAVITY, 0.0],
            unconstrained: UnconstrainedMethod::default(),
            unconstrained_settings: IterativeSettings::default(),
            equality: LinearMethod::default(),
            kkt_settings: IterativeSettings {
                max_iterations: 1000,
                tolerance: 1e-10,
            },
            kkt_regularization: default_kkt_regularization(),
            baumgarte_gain: DEFAULT_BAUMGARTE_GAIN,
            qp: QpSettings::default(),
            inversion: InversionSettings::default(),
            strict_convergence: false,
            record_energy: false,
        }
    }
}

impl SolverConfig {
    /// Creates a config for debugging (direct solves, energy recorded).
    pub fn debug() -> Self {
        Self {
            unconstrained: UnconstrainedMethod::Cholesky,
            equality: LinearMethod::Lu,
            record_energy: true,
            ..Default::default()
        }
    }

    /// Creates a high-quality config (small step, tight tolerances).
    pub fn high_quality() -> Self {
        Self {
            dt: 1e-3,
            unconstrained_settings: IterativeSettings::precise(),
            kkt_settings: IterativeSettings::precise(),
            strict_convergence: true,
            ..Default::default()
        }
    }

    /// Builder-style timestep override.
    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Builder-style time span override.
    #[must_use]
    pub fn with_t_span(mut self, t0: f64, t1: f64) -> Self {
        self.t_span = [t0, t1];
        self
    }

    /// Builder-style gravity override.
    #[must_use]
    pub fn with_gravity(mut self, gravity: [f64; 3]) -> Self {
        self.gravity = gravity;
        self
    }

    /// Number of steps needed to cover the time span.
    pub fn step_count(&self) -> usize {
        ((self.t_span[1] - self.t_span[0]) / self.dt - 1e-9).ceil().max(0.0) as usize
    }

    /// Checks every parameter, failing fast on the first invalid one.
    pub fn validate(&self) -> MekanoResult<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(MekanoError::InvalidConfig(format!(
                "timestep must be positive, got {}",
                self.dt
            )));
        }
        if !(self.t_span[1] >= self.t_span[0]) {
            return Err(MekanoError::InvalidConfig(format!(
                "time span must be ordered, got [{}, {}]",
                self.t_span[0], self.t_span[1]
            )));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(MekanoError::InvalidConfig("gravity must be finite".into()));
        }
        if !(self.baumgarte_gain >= 0.0 && self.baumgarte_gain.is_finite()) {
            return Err(MekanoError::InvalidConfig(format!(
                "baumgarte_gain must be non-negative, got {}",
                self.baumgarte_gain
            )));
        }
        for (label, s) in [
            ("unconstrained", &self.unconstrained_settings),
            ("kkt", &self.kkt_settings),
        ] {
            if s.max_iterations == 0 || !(s.tolerance > 0.0) {
                return Err(MekanoError::InvalidConfig(format!(
                    "{label} settings need max_iterations > 0 and tolerance > 0"
                )));
            }
        }
        if !(self.kkt_regularization > 0.0 && self.kkt_regularization.is_finite()) {
            return Err(MekanoError::InvalidConfig(format!(
                "kkt_regularization must be positive, got {}",
                self.kkt_regularization
            )));
        }
        if self.qp.max_iterations == 0
            || !(self.qp.tolerance > 0.0)
            || !(self.qp.regularization > 0.0 && self.qp.regularization.is_finite())
        {
            return Err(MekanoError::InvalidConfig(
                "qp settings need max_iterations > 0, tolerance > 0, regularization > 0".into(),
            ));
        }
        self.inversion.validate()
    }
}
