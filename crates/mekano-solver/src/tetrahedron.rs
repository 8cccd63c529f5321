//! Hyperelastic tetrahedral element.
//!
//! Precomputes rest-state data for one tetrahedron and evaluates its nodal
//! forces and force differentials:
//!
//! 1. Deformation gradient `F = Ds · Bm` with `Ds = [x0-x3, x1-x3, x2-x3]`
//! 2. Stress `P(F)` through [`ElasticResponse`] (SVD path when required)
//! 3. Nodal forces `H = -W · P · Bmᵗ`; node 3 receives the negated sum
//! 4. Force differentials `dH = -W · dP · Bmᵗ` for unit perturbations of
//!    each node coordinate, which are the columns of the element stiffness

use serde::{Deserialize, Serialize};

use mekano_material::{ConstitutiveModel, ElasticResponse, InversionSettings, LameParameters};
use mekano_math::decomposition::deformation_gradient;
use mekano_math::{DMat3, DVec3, MatrixSink};
use mekano_types::constants::DEGENERATE_VOLUME_THRESHOLD;
use mekano_types::{MekanoError, MekanoResult};

/// Rest-state data of one tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tetrahedron {
    /// Node indices, local to the owning soft body.
    pub nodes: [usize; 4],
    /// Inverse rest edge matrix `Bm = Dm⁻¹`.
    pub bm: DMat3,
    /// Rest volume `W = |det Dm| / 6`.
    pub volume: f64,
    /// Set when the last evaluation found `det F ≤ 0`.
    pub inverted: bool,
}

impl Tetrahedron {
    /// Precomputes `Bm` and `W` from the rest positions of the four nodes.
    pub fn new(nodes: [usize; 4], rest: &[DVec3; 4]) -> MekanoResult<Self> {
        let dm = DMat3::from_cols(rest[0] - rest[3], rest[1] - rest[3], rest[2] - rest[3]);
        let det = dm.determinant();
        if det.abs() / 6.0 < DEGENERATE_VOLUME_THRESHOLD {
            return Err(MekanoError::InvalidMesh(format!(
                "tetrahedron {nodes:?} is degenerate (volume {:e})",
                det / 6.0
            )));
        }
        Ok(Self {
            nodes,
            bm: dm.inverse(),
            volume: det.abs() / 6.0,
            inverted: false,
        })
    }

    /// Lumped mass contribution to each of the four nodes.
    #[inline]
    pub fn node_mass(&self, density: f64) -> f64 {
        density * self.volume / 4.0
    }

    /// `F = Ds · Bm` at the given node positions.
    #[inline]
    pub fn deformation_gradient(&self, x: &[DVec3; 4]) -> DMat3 {
        deformation_gradient(x, &self.bm)
    }

    /// Evaluates the stress at the given positions and records inversion.
    pub fn evaluate(
        &mut self,
        x: &[DVec3; 4],
        model: &dyn ConstitutiveModel,
        lame: LameParameters,
        settings: &InversionSettings,
    ) -> ElasticResponse {
        let f = self.deformation_gradient(x);
        let response = ElasticResponse::evaluate(model, &f, lame, settings);
        self.inverted = response.inverted;
        response
    }

    /// Nodal elastic forces `H = -W P Bmᵗ`; node 3 balances the other three.
    pub fn nodal_forces(&self, response: &ElasticResponse) -> [DVec3; 4] {
        self.spread(&response.stress)
    }

    /// Force differentials of all four nodes for a unit perturbation of
    /// coordinate `k` of node `a`.
    pub fn force_differential(
        &self,
        response: &ElasticResponse,
        model: &dyn ConstitutiveModel,
        lame: LameParameters,
        a: usize,
        k: usize,
    ) -> [DVec3; 4] {
        let mut dds = DMat3::ZERO;
        if a < 3 {
            dds.col_mut(a)[k] = 1.0;
        } else {
            for c in 0..3 {
                dds.col_mut(c)[k] = -1.0;
            }
        }
        let df = dds * self.bm;
        let dp = response.stress_differential(model, &df, lame);
        self.spread(&dp)
    }

    /// Appends the 12×12 element stiffness at the nodes' maximal offsets.
    ///
    /// One column per call to [`Self::force_differential`], so the same code
    /// fills a dense block or a triplet list.
    pub fn add_stiffness<S: MatrixSink + ?Sized>(
        &self,
        response: &ElasticResponse,
        model: &dyn ConstitutiveModel,
        lame: LameParameters,
        offsets: &[usize; 4],
        sink: &mut S,
    ) {
        for a in 0..4 {
            for k in 0..3 {
                let col = offsets[a] + k;
                let dh = self.force_differential(response, model, lame, a, k);
                for (b, dhb) in dh.iter().enumerate() {
                    for r in 0..3 {
                        if dhb[r] != 0.0 {
                            sink.add(offsets[b] + r, col, dhb[r]);
                        }
                    }
                }
            }
        }
    }

    /// Strain energy `W Ψ`.
    #[inline]
    pub fn energy(&self, response: &ElasticResponse) -> f64 {
        self.volume * response.energy_density
    }

    fn spread(&self, p: &DMat3) -> [DVec3; 4] {
        let h = *p * self.bm.transpose() * -self.volume;
        let (h0, h1, h2) = (h.x_axis, h.y_axis, h.z_axis);
        [h0, h1, h2, -(h0 + h1 + h2)]
    }
}
