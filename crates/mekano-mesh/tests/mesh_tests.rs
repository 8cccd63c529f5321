//! Integration tests for mekano-mesh.

use mekano_math::DVec3;
use mekano_mesh::generators::{single_tet, tet_block};
use mekano_mesh::TetMesh;
use mekano_types::MekanoError;

// ─── TetMesh Tests ────────────────────────────────────────────

#[test]
fn single_tet_counts_and_volume() {
    let mesh = single_tet();
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.tet_count(), 1);
    assert!((mesh.signed_volume(0) - 1.0 / 6.0).abs() < 1e-15);
    assert_eq!(mesh.edge_matrix(0), mekano_math::DMat3::IDENTITY);
    assert!(mesh.validate().is_ok());
}

#[test]
fn position_access() {
    let mut mesh = single_tet();
    assert_eq!(mesh.position(1), DVec3::Y);
    mesh.set_position(1, DVec3::new(0.0, 2.0, 0.0));
    assert_eq!(mesh.pos_y[1], 2.0);
}

#[test]
fn validate_rejects_out_of_range_index() {
    let mut mesh = single_tet();
    mesh.indices[3] = 9;
    assert!(matches!(mesh.validate(), Err(MekanoError::InvalidMesh(_))));
}

#[test]
fn validate_rejects_repeated_vertex() {
    let mut mesh = single_tet();
    mesh.indices[1] = 0;
    assert!(mesh.validate().is_err());
}

#[test]
fn validate_rejects_flat_tet() {
    let mut mesh = single_tet();
    mesh.set_position(2, DVec3::new(0.5, 0.5, 0.0));
    let err = mesh.validate().unwrap_err();
    assert!(err.to_string().contains("degenerate"));
}

#[test]
fn validate_rejects_inconsistent_soa() {
    let mut mesh = single_tet();
    mesh.pos_z.pop();
    assert!(mesh.validate().is_err());
}

#[test]
fn from_interleaved_roundtrip() {
    let positions = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
    let mesh = TetMesh::from_interleaved(&positions, &[0, 1, 2, 3]).unwrap();
    assert_eq!(mesh, single_tet());
    assert!(TetMesh::from_interleaved(&positions[..5], &[0, 1, 2, 3]).is_err());
}

#[test]
fn orient_positive_fixes_inverted() {
    let mut mesh = single_tet();
    mesh.indices.swap(0, 1);
    assert!(mesh.signed_volume(0) < 0.0);
    mesh.orient_positive();
    assert!(mesh.signed_volume(0) > 0.0);
}

#[test]
fn select_and_translate() {
    let mut mesh = single_tet();
    mesh.translate(DVec3::new(0.0, 10.0, 0.0));
    let top = mesh.select_vertices(|p| p.y > 10.5);
    assert_eq!(top, vec![1]);
    let (lo, hi) = mesh.bounds().unwrap();
    assert_eq!(lo, DVec3::new(0.0, 10.0, 0.0));
    assert_eq!(hi, DVec3::new(1.0, 11.0, 1.0));
}

// ─── Generator Tests ──────────────────────────────────────────

#[test]
fn tet_block_counts() {
    let mesh = tet_block([2, 3, 4], DVec3::new(2.0, 3.0, 4.0), DVec3::ZERO);
    assert_eq!(mesh.vertex_count(), 3 * 4 * 5);
    assert_eq!(mesh.tet_count(), 2 * 3 * 4 * 6);
    assert!(mesh.validate().is_ok());
}

#[test]
fn tet_block_is_positively_oriented_and_fills_volume() {
    let extent = DVec3::new(1.0, 0.5, 2.0);
    let mesh = tet_block([3, 2, 2], extent, DVec3::new(-1.0, 0.0, 0.0));
    for t in 0..mesh.tet_count() {
        assert!(mesh.signed_volume(t) > 0.0);
    }
    assert!((mesh.total_volume() - extent.x * extent.y * extent.z).abs() < 1e-12);
    let (lo, hi) = mesh.bounds().unwrap();
    assert!((lo - DVec3::new(-1.0, 0.0, 0.0)).length() < 1e-12);
    assert!((hi - DVec3::new(0.0, 0.5, 2.0)).length() < 1e-12);
}

#[test]
fn tet_block_json_roundtrip() {
    let mesh = tet_block([1, 1, 1], DVec3::ONE, DVec3::ZERO);
    let json = serde_json::to_string(&mesh).unwrap();
    let back: TetMesh = serde_json::from_str(&json).unwrap();
    assert_eq!(back, mesh);
}
