//! Per-step scratch storage and step-0 cache.
//!
//! [`StepWorkspace`] owns every accumulator the entities append to during
//! assembly. It is reset at the start of each step, so a step can be
//! assembled in isolation. [`StepCache`] holds what stays constant once the
//! topology is fixed: sizes, the maximal mass matrix and the constant
//! Jacobian rows of free nodes.

use serde::{Deserialize, Serialize};

use mekano_math::{CsrMatrix, Triplet};

/// Global dimensions of the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSizes {
    /// Maximal DOFs (6 per body, 3 per node).
    pub nm: usize,
    /// Reduced DOFs (joint DOFs, then free nodes).
    pub nr: usize,
    /// Reduced DOFs owned by joints.
    pub n_joint_dofs: usize,
    /// Maximal equality rows.
    pub nem: usize,
    /// Reduced equality rows.
    pub ner: usize,
    /// Maximal inequality rows.
    pub nim: usize,
    /// Reduced inequality rows.
    pub nir: usize,
}

/// Rows of one constraint block (maximal or reduced, equality or inequality).
#[derive(Debug, Clone, Default)]
pub struct ConstraintRows {
    /// Jacobian rows, indexed by global row within the block.
    pub jacobian: Vec<Triplet>,
    /// Position-level residual `g` (or `c`).
    pub value: Vec<f64>,
    /// Explicit time partial `ġ` (or `ċ`).
    pub rate: Vec<f64>,
    /// Whether each row takes part in this step's solve.
    pub active: Vec<bool>,
}

impl ConstraintRows {
    fn reset(&mut self, rows: usize) {
        self.jacobian.clear();
        self.value.clear();
        self.value.resize(rows, 0.0);
        self.rate.clear();
        self.rate.resize(rows, 0.0);
        self.active.clear();
        self.active.resize(rows, false);
    }

    /// Number of rows in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Indices of the active rows, in order.
    pub fn active_rows(&self) -> Vec<usize> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| a.then_some(i))
            .collect()
    }
}

/// Accumulators for one step.
#[derive(Debug, Clone, Default)]
pub struct StepWorkspace {
    /// Maximal forces `f_m`.
    pub fm: Vec<f64>,
    /// Reduced forces `f_r`.
    pub fr: Vec<f64>,
    /// Elastic stiffness `K` (maximal).
    pub k: Vec<Triplet>,
    /// Spring stiffness `K_m` (maximal).
    pub km: Vec<Triplet>,
    /// Joint stiffness `K_r`.
    pub kr: Vec<Triplet>,
    /// Maximal damping `D_m`.
    pub dm: Vec<Triplet>,
    /// Joint damping `D_r`.
    pub dr: Vec<Triplet>,
    /// Per-step Jacobian rows (bodies and attached nodes).
    pub j: Vec<Triplet>,
    /// Per-step `J̇` rows.
    pub jdot: Vec<Triplet>,
    pub eq_m: ConstraintRows,
    pub eq_r: ConstraintRows,
    pub ineq_m: ConstraintRows,
    pub ineq_r: ConstraintRows,
    /// Inverted elements found while evaluating elastic forces.
    pub inverted_elements: usize,
}

impl StepWorkspace {
    pub fn new(sizes: &WorldSizes) -> Self {
        let mut ws = Self::default();
        ws.reset(sizes);
        ws
    }

    /// Clears every accumulator and resizes the dense ones.
    pub fn reset(&mut self, sizes: &WorldSizes) {
        self.fm.clear();
        self.fm.resize(sizes.nm, 0.0);
        self.fr.clear();
        self.fr.resize(sizes.nr, 0.0);
        for list in [
            &mut self.k,
            &mut self.km,
            &mut self.kr,
            &mut self.dm,
            &mut self.dr,
            &mut self.j,
            &mut self.jdot,
        ] {
            list.clear();
        }
        self.eq_m.reset(sizes.nem);
        self.eq_r.reset(sizes.ner);
        self.ineq_m.reset(sizes.nim);
        self.ineq_r.reset(sizes.nir);
        self.inverted_elements = 0;
    }
}

/// Data computed at step 0 and reused while the topology is unchanged.
#[derive(Debug, Clone)]
pub struct StepCache {
    pub sizes: WorldSizes,
    /// Maximal mass matrix `M_m`.
    pub mass: CsrMatrix,
    /// Constant Jacobian rows (free nodes).
    pub jacobian_constant: Vec<Triplet>,
}
