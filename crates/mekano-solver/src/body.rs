//! Rigid bodies.
//!
//! A body is a cuboid with its frame at the center of mass and principal
//! axes along the frame axes, so its spatial inertia is diagonal:
//! `M = diag(I₁, I₂, I₃, m, m, m)`. Twists `φ = [ω; v]` are expressed in
//! the body frame.

use serde::{Deserialize, Serialize};

use mekano_math::se3::{ad, join, rotation, split, translation, Vec6};
use mekano_math::{DMat3, DMat4, DVec3, DenseMatrix, Triplet};

/// A rigid cuboid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub name: String,
    /// Side lengths.
    pub sides: DVec3,
    pub density: f64,
    pub mass: f64,
    /// Principal moments of inertia.
    pub inertia: DVec3,
    /// Twist damping coefficient (`D = d·1₆`).
    pub damping: f64,
    /// Pose of the body in the world.
    pub e_wi: DMat4,
    /// Body twist.
    pub phi: Vec6,
    /// Offset of the body's 6 maximal DOFs.
    pub idx_m: usize,
    /// Rows of the reduced Jacobian (6 × joint DOFs).
    #[serde(skip)]
    pub jacobian: DenseMatrix,
    /// Time derivative of [`Self::jacobian`].
    #[serde(skip)]
    pub jacobian_dot: DenseMatrix,
}

impl RigidBody {
    /// A cuboid with uniform density, at the world origin and at rest.
    pub fn cuboid(name: impl Into<String>, sides: DVec3, density: f64) -> Self {
        let mass = density * sides.x * sides.y * sides.z;
        let sq = sides * sides;
        let inertia = DVec3::new(sq.y + sq.z, sq.z + sq.x, sq.x + sq.y) * (mass / 12.0);
        Self {
            name: name.into(),
            sides,
            density,
            mass,
            inertia,
            damping: 0.0,
            e_wi: DMat4::IDENTITY,
            phi: [0.0; 6],
            idx_m: 0,
            jacobian: DenseMatrix::zeros(6, 0),
            jacobian_dot: DenseMatrix::zeros(6, 0),
        }
    }

    /// Builder-style damping override.
    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Diagonal of the spatial inertia `diag(I, m·1)`.
    pub fn spatial_inertia(&self) -> Vec6 {
        join(self.inertia, DVec3::splat(self.mass))
    }

    /// World position of the center of mass.
    #[inline]
    pub fn position(&self) -> DVec3 {
        translation(&self.e_wi)
    }

    #[inline]
    pub fn rotation(&self) -> DMat3 {
        rotation(&self.e_wi)
    }

    /// World position of a body-local point.
    pub fn world_point(&self, local: DVec3) -> DVec3 {
        self.e_wi.transform_point3(local)
    }

    /// World velocity of a body-local point.
    pub fn world_point_velocity(&self, local: DVec3) -> DVec3 {
        let (w, v) = split(&self.phi);
        self.rotation() * (w.cross(local) + v)
    }

    /// Appends `diag(I, m·1)` at the body's maximal offset.
    pub fn compute_mass(&self, m: &mut Vec<Triplet>) {
        for (k, &val) in self.spatial_inertia().iter().enumerate() {
            m.push(Triplet::new(self.idx_m + k, self.idx_m + k, val));
        }
    }

    /// Gravity wrench `[0; m Rᵗg]` plus Coriolis `ad(φ)ᵗ M φ`.
    pub fn compute_force(&self, gravity: DVec3, fm: &mut [f64]) {
        let diag = self.spatial_inertia();
        let mut momentum = [0.0; 6];
        for k in 0..6 {
            momentum[k] = diag[k] * self.phi[k];
        }
        let coriolis = ad(&self.phi).transpose().mul_vec(&momentum);
        let weight = self.rotation().transpose() * gravity * self.mass;
        let wrench = join(DVec3::ZERO, weight);
        for k in 0..6 {
            fm[self.idx_m + k] += coriolis[k] + wrench[k];
        }
    }

    /// Appends `d·1₆` at the body's maximal offset.
    pub fn compute_damping(&self, dm: &mut Vec<Triplet>) {
        if self.damping == 0.0 {
            return;
        }
        for k in 0..6 {
            dm.push(Triplet::new(self.idx_m + k, self.idx_m + k, self.damping));
        }
    }

    /// Kinetic energy `½ φᵗ M φ`.
    pub fn kinetic_energy(&self) -> f64 {
        let diag = self.spatial_inertia();
        0.5 * (0..6).map(|k| diag[k] * self.phi[k] * self.phi[k]).sum::<f64>()
    }

    /// Gravitational potential `-m gᵗ p`.
    pub fn potential_energy(&self, gravity: DVec3) -> f64 {
        -self.mass * gravity.dot(self.position())
    }
}
