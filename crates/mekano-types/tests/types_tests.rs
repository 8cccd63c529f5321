//! Integration tests for mekano-types.

use mekano_types::constants;
use mekano_types::{BodyId, JointId, MekanoError, NodeId};

// ─── Id Tests ─────────────────────────────────────────────────

#[test]
fn ids_index_and_convert() {
    assert_eq!(BodyId(3).index(), 3);
    assert_eq!(JointId::from(7).index(), 7);
    assert_eq!(NodeId::from(0), NodeId(0));
}

#[test]
fn ids_are_hashable_keys() {
    let mut set = std::collections::HashSet::new();
    set.insert(NodeId(1));
    set.insert(NodeId(1));
    set.insert(NodeId(2));
    assert_eq!(set.len(), 2);
}

// ─── Error Tests ──────────────────────────────────────────────

#[test]
fn divergence_message_contains_diagnostics() {
    let err = MekanoError::SolverDivergence {
        iterations: 25,
        residual: 1.5e-3,
    };
    let msg = err.to_string();
    assert!(msg.contains("25"));
    assert!(msg.contains("1.50e-3"));
}

#[test]
fn linear_solve_error_carries_context() {
    let err = MekanoError::LinearSolve("lu: zero pivot at 4".into());
    assert_eq!(err.to_string(), "Linear solve failed: lu: zero pivot at 4");
}

// ─── Constant Tests ───────────────────────────────────────────

#[test]
fn defaults_are_sane() {
    assert!(constants::DEFAULT_DT > 0.0);
    assert!(constants::DEFAULT_CLAMP_THRESHOLD > 0.0 && constants::DEFAULT_CLAMP_THRESHOLD < 1.0);
    assert!(constants::DEFAULT_DELTA_LOWER < constants::DEFAULT_DELTA_UPPER);
    assert_eq!(constants::DEFAULT_BAUMGARTE_GAIN, 5.0);
}
