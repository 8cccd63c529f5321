//! Reduced-coordinate assembly of one implicit Euler step.
//!
//! Every entity appends maximal contributions; the Jacobian `J` maps reduced
//! velocities to maximal ones. With step `h`:
//!
//! ```text
//! M_r   = Jᵗ (M_m - h² K) J
//! f_r'  = M_r q̇₀ + h (Jᵗ (f_m - M_m J̇ q̇₀) + f_r)
//! MDK_r = M_r + Jᵗ (h D_m - h² K_m) J + h D_r - h² K_r
//! rhs_G = -ġ - k_p g        rhs_C = -ċ - k_p c
//! ```
//!
//! The velocity solve is then `MDK_r q̇¹ = f_r'` subject to `G q̇¹ = rhs_G`
//! and `C q̇¹ ≤ rhs_C` over the active rows.

use mekano_math::{CsrMatrix, DenseMatrix, Triplet};
use tracing::trace;

use crate::component::Dynamics;
use crate::workspace::{ConstraintRows, StepCache, StepWorkspace};
use crate::world::World;

/// The linear system of one step in reduced coordinates.
#[derive(Debug, Clone)]
pub struct ReducedSystem {
    /// `MDK_r`.
    pub mdk: CsrMatrix,
    /// `f_r'`.
    pub rhs: Vec<f64>,
    /// Reduced positions `q₀`.
    pub q0: Vec<f64>,
    /// Reduced velocities `q̇₀`.
    pub qdot0: Vec<f64>,
    /// Active equality rows `G` (maximal rows first, then reduced).
    pub g: CsrMatrix,
    pub g_value: Vec<f64>,
    pub rhs_g: Vec<f64>,
    /// Active inequality rows `C` (maximal rows first, then reduced).
    pub c: CsrMatrix,
    pub c_value: Vec<f64>,
    pub rhs_c: Vec<f64>,
    /// Block rows behind each row of `G` and `C`.
    pub eq_m_rows: Vec<usize>,
    pub eq_r_rows: Vec<usize>,
    pub ineq_m_rows: Vec<usize>,
    pub ineq_r_rows: Vec<usize>,
}

impl ReducedSystem {
    /// Reduced DOFs.
    #[inline]
    pub fn dof(&self) -> usize {
        self.rhs.len()
    }

    /// Active equality rows.
    #[inline]
    pub fn ne(&self) -> usize {
        self.g.rows
    }

    /// Active inequality rows.
    #[inline]
    pub fn ni(&self) -> usize {
        self.c.rows
    }

    /// The same system in the coordinates of a basis `P` (`q̇ = P q̇_R`).
    ///
    /// `q̇₀` becomes `Pᵗ q̇₀` and serves only as an iterative initial guess.
    pub fn project(&self, p: &DenseMatrix) -> ReducedSystem {
        let pt = p.transpose();
        let mdk = pt.mul(&csr_mul_dense(&self.mdk, p));
        ReducedSystem {
            mdk: CsrMatrix::from_dense(&mdk, 0.0).symmetrize(),
            rhs: pt.mul_vec(&self.rhs),
            q0: pt.mul_vec(&self.q0),
            qdot0: pt.mul_vec(&self.qdot0),
            g: CsrMatrix::from_dense(&csr_mul_dense(&self.g, p), 0.0),
            g_value: self.g_value.clone(),
            rhs_g: self.rhs_g.clone(),
            c: CsrMatrix::from_dense(&csr_mul_dense(&self.c, p), 0.0),
            c_value: self.c_value.clone(),
            rhs_c: self.rhs_c.clone(),
            eq_m_rows: self.eq_m_rows.clone(),
            eq_r_rows: self.eq_r_rows.clone(),
            ineq_m_rows: self.ineq_m_rows.clone(),
            ineq_r_rows: self.ineq_r_rows.clone(),
        }
    }
}

/// `A P` for sparse `A` and dense `P`.
pub fn csr_mul_dense(a: &CsrMatrix, p: &DenseMatrix) -> DenseMatrix {
    let mut out = DenseMatrix::zeros(a.rows, p.cols);
    for r in 0..a.rows {
        for k in a.row_ptr[r]..a.row_ptr[r + 1] {
            let v = a.values[k];
            let src = p.row(a.col_idx[k]);
            for (c, &pv) in src.iter().enumerate() {
                out[(r, c)] += v * pv;
            }
        }
    }
    out
}

/// Mass matrix and constant Jacobian rows, computed once per topology.
pub fn build_cache(world: &World) -> StepCache {
    let sizes = world.sizes();
    let mut mass = Vec::new();
    let mut jacobian_constant = Vec::new();
    world.tree.compute_mass_sparse(&mut mass);
    world.tree.compute_constant_jacobian(&mut jacobian_constant);
    for component in &world.components {
        let dynamics = component.as_dynamics();
        dynamics.compute_mass_sparse(&mut mass);
        dynamics.compute_constant_jacobian(&mut jacobian_constant);
    }
    StepCache {
        sizes,
        mass: CsrMatrix::from_triplets(sizes.nm, sizes.nm, &mass),
        jacobian_constant,
    }
}

/// Active rows of one block mapped to reduced coordinates.
struct ActiveBlock {
    rows: Vec<usize>,
    jacobian: CsrMatrix,
    value: Vec<f64>,
    rhs: Vec<f64>,
}

fn active_block(block: &ConstraintRows, cols: usize, j: Option<&CsrMatrix>, kp: f64) -> ActiveBlock {
    let rows = block.active_rows();
    let full = CsrMatrix::from_triplets(block.len(), cols, &block.jacobian).select_rows(&rows);
    let jacobian = match j {
        Some(j) => full.mul(j),
        None => full,
    };
    let value: Vec<f64> = rows.iter().map(|&r| block.value[r]).collect();
    let rhs = rows
        .iter()
        .map(|&r| -block.rate[r] - kp * block.value[r])
        .collect();
    ActiveBlock {
        rows,
        jacobian,
        value,
        rhs,
    }
}

/// Assembles the step system at the world's current state.
///
/// `ws` is reset first; on return it holds this step's raw contributions.
pub fn assemble(
    world: &mut World,
    cache: &StepCache,
    ws: &mut StepWorkspace,
    h: f64,
    kp: f64,
) -> ReducedSystem {
    let sizes = cache.sizes;
    let (nm, nr) = (sizes.nm, sizes.nr);
    ws.reset(&sizes);
    world.compute_constraints(ws);

    let ctx = world.context();
    world.tree.compute_force(&ctx, ws);
    world.tree.compute_stiffness_sparse(&ctx, ws);
    world.tree.compute_force_damping_sparse(&ctx, ws);
    world.tree.compute_jacobian_sparse(&ctx, ws);
    for component in &world.components {
        let dynamics = component.as_dynamics();
        dynamics.compute_force(&ctx, ws);
        dynamics.compute_stiffness_sparse(&ctx, ws);
        dynamics.compute_force_damping_sparse(&ctx, ws);
        dynamics.compute_jacobian_sparse(&ctx, ws);
    }

    let mut j_triplets: Vec<Triplet> = Vec::with_capacity(cache.jacobian_constant.len() + ws.j.len());
    j_triplets.extend_from_slice(&cache.jacobian_constant);
    j_triplets.extend_from_slice(&ws.j);
    let j = CsrMatrix::from_triplets(nm, nr, &j_triplets);
    let jt = j.transpose();
    let jdot = CsrMatrix::from_triplets(nm, nr, &ws.jdot);
    let k = CsrMatrix::from_triplets(nm, nm, &ws.k);
    let km = CsrMatrix::from_triplets(nm, nm, &ws.km);
    let dm = CsrMatrix::from_triplets(nm, nm, &ws.dm);
    let kr = CsrMatrix::from_triplets(nr, nr, &ws.kr);
    let dr = CsrMatrix::from_triplets(nr, nr, &ws.dr);

    let y = world.gather_state();
    let q0 = y[..nr].to_vec();
    let qdot0 = y[nr..].to_vec();

    let h2 = h * h;
    let m_r = jt.mul(&cache.mass.add_scaled(&k, -h2)).mul(&j);

    // f_r' = M_r q̇₀ + h (Jᵗ (f_m - M_m J̇ q̇₀) + f_r)
    let m_jdot_qdot = cache.mass.mul_vec(&jdot.mul_vec(&qdot0));
    let fm_eff: Vec<f64> = ws.fm.iter().zip(&m_jdot_qdot).map(|(f, m)| f - m).collect();
    let jt_f = jt.mul_vec(&fm_eff);
    let mut rhs = m_r.mul_vec(&qdot0);
    for i in 0..nr {
        rhs[i] += h * (jt_f[i] + ws.fr[i]);
    }

    let mdk = m_r
        .add_scaled(&jt.mul(&dm.scale(h).add_scaled(&km, -h2)).mul(&j), 1.0)
        .add_scaled(&dr, h)
        .add_scaled(&kr, -h2)
        .symmetrize();

    let eq_m = active_block(&ws.eq_m, nm, Some(&j), kp);
    let eq_r = active_block(&ws.eq_r, nr, None, kp);
    let ineq_m = active_block(&ws.ineq_m, nm, Some(&j), kp);
    let ineq_r = active_block(&ws.ineq_r, nr, None, kp);

    trace!(
        nm,
        nr,
        mdk_nnz = mdk.nnz(),
        ne = eq_m.rows.len() + eq_r.rows.len(),
        ni = ineq_m.rows.len() + ineq_r.rows.len(),
        "Assembled step system"
    );

    ReducedSystem {
        mdk,
        rhs,
        q0,
        qdot0,
        g: CsrMatrix::vstack(&eq_m.jacobian, &eq_r.jacobian),
        g_value: [eq_m.value, eq_r.value].concat(),
        rhs_g: [eq_m.rhs, eq_r.rhs].concat(),
        c: CsrMatrix::vstack(&ineq_m.jacobian, &ineq_r.jacobian),
        c_value: [ineq_m.value, ineq_r.value].concat(),
        rhs_c: [ineq_m.rhs, ineq_r.rhs].concat(),
        eq_m_rows: eq_m.rows,
        eq_r_rows: eq_r.rows,
        ineq_m_rows: ineq_m.rows,
        ineq_r_rows: ineq_r.rows,
    }
}
