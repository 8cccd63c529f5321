//! Physical constants and simulation defaults.

/// Gravitational acceleration (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Default simulation timestep (seconds).
pub const DEFAULT_DT: f64 = 1.0e-2;

/// Default Baumgarte position-feedback gain for constraint stabilization.
pub const DEFAULT_BAUMGARTE_GAIN: f64 = 5.0;

/// Singular values below this are clamped in the inversion-safe stress path.
pub const DEFAULT_CLAMP_THRESHOLD: f64 = 0.45;

/// Lower bound on the eigenvalues of FᵗF for the analytic SVD skip test.
pub const DEFAULT_DELTA_LOWER: f64 = 0.0;

/// Upper bound on the eigenvalues of FᵗF for the analytic SVD skip test.
pub const DEFAULT_DELTA_UPPER: f64 = 1005.0;

/// Default iteration cap for iterative linear solvers.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100_000;

/// Default relative residual tolerance for iterative linear solvers.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-10;

/// Epsilon for floating-point comparisons.
pub const EPSILON: f64 = 1.0e-12;

/// Rest volume below which a tetrahedron is considered degenerate.
pub const DEGENERATE_VOLUME_THRESHOLD: f64 = 1.0e-14;
