//! Integration tests for mekano-solver elements and soft bodies.

use mekano_material::{InversionSettings, MaterialModel, SolidProperties};
use mekano_math::{DMat3, DVec3, DenseMatrix, Triplet};
use mekano_mesh::generators::{single_tet, tet_block};
use mekano_solver::{Component, Dynamics, MeshEmbedding, SoftBody, Tetrahedron, World};
use mekano_types::{ComponentId, MekanoError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rubber(model: MaterialModel) -> SolidProperties {
    SolidProperties {
        name: "rubber".into(),
        density: 1000.0,
        youngs_modulus: 1.0e4,
        poisson_ratio: 0.3,
        model,
        damping: 0.0,
    }
}

fn rest() -> [DVec3; 4] {
    [DVec3::X, DVec3::Y, DVec3::Z, DVec3::ZERO]
}

/// Rest shape moved by a random perturbation of every node.
fn deformed(seed: u64, scale: f64) -> [DVec3; 4] {
    let mut rng = StdRng::seed_from_u64(seed);
    rest().map(|p| {
        p + DVec3::new(
            rng.gen_range(-scale..scale),
            rng.gen_range(-scale..scale),
            rng.gen_range(-scale..scale),
        )
    })
}

fn forces_at(
    tet: &Tetrahedron,
    x: &[DVec3; 4],
    props: &SolidProperties,
) -> [DVec3; 4] {
    let mut tet = *tet;
    let r = tet.evaluate(
        x,
        props.model.constitutive(),
        props.lame(),
        &InversionSettings::default(),
    );
    tet.nodal_forces(&r)
}

// ─── Element Tests ────────────────────────────────────────────

#[test]
fn element_rest_state_has_zero_force() {
    for model in MaterialModel::ALL {
        let props = rubber(model);
        let tet = Tetrahedron::new([0, 1, 2, 3], &rest()).unwrap();
        let forces = forces_at(&tet, &rest(), &props);
        for f in forces {
            assert!(f.length() < 1e-9, "{model}: rest force {f}");
        }
    }
}

#[test]
fn element_rest_data() {
    let tet = Tetrahedron::new([0, 1, 2, 3], &rest()).unwrap();
    assert!((tet.volume - 1.0 / 6.0).abs() < 1e-12);
    assert!((tet.bm - DMat3::IDENTITY).abs_diff_eq(DMat3::ZERO, 1e-12));
    assert!((tet.node_mass(1200.0) - 1200.0 / 24.0).abs() < 1e-9);
}

#[test]
fn degenerate_element_is_rejected() {
    let flat = [DVec3::X, DVec3::Y, DVec3::new(1.0, 1.0, 0.0), DVec3::ZERO];
    assert!(Tetrahedron::new([0, 1, 2, 3], &flat).is_err());
}

#[test]
fn element_forces_sum_to_zero() {
    for model in MaterialModel::ALL {
        let props = rubber(model);
        let tet = Tetrahedron::new([0, 1, 2, 3], &rest()).unwrap();
        let forces = forces_at(&tet, &deformed(7, 0.15), &props);
        let sum: DVec3 = forces.iter().copied().sum();
        let scale = forces.iter().map(|f| f.length()).fold(1.0, f64::max);
        assert!(sum.length() < 1e-9 * scale, "{model}: net force {sum}");
    }
}

#[test]
fn element_stiffness_matches_finite_difference() {
    let eps = 1e-6;
    for model in MaterialModel::ALL {
        let props = rubber(model);
        let mut tet = Tetrahedron::new([0, 1, 2, 3], &rest()).unwrap();
        let x = deformed(11, 0.1);
        let response = tet.evaluate(
            &x,
            props.model.constitutive(),
            props.lame(),
            &InversionSettings::default(),
        );
        let mut k = DenseMatrix::zeros(12, 12);
        tet.add_stiffness(
            &response,
            props.model.constitutive(),
            props.lame(),
            &[0, 3, 6, 9],
            &mut k,
        );

        let mut max_err: f64 = 0.0;
        let mut max_entry: f64 = 1.0;
        for a in 0..4 {
            for c in 0..3 {
                let mut xp = x;
                let mut xm = x;
                xp[a][c] += eps;
                xm[a][c] -= eps;
                let fp = forces_at(&tet, &xp, &props);
                let fm = forces_at(&tet, &xm, &props);
                for b in 0..4 {
                    for r in 0..3 {
                        let fd = (fp[b][r] - fm[b][r]) / (2.0 * eps);
                        let analytic = k[(3 * b + r, 3 * a + c)];
                        max_err = max_err.max((fd - analytic).abs());
                        max_entry = max_entry.max(analytic.abs());
                    }
                }
            }
        }
        assert!(max_err < 1e-5 * max_entry, "{model}: max |K - fd| = {max_err}");
    }
}

#[test]
fn element_stiffness_is_symmetric() {
    let props = rubber(MaterialModel::NeoHookean);
    let mut tet = Tetrahedron::new([0, 1, 2, 3], &rest()).unwrap();
    let response = tet.evaluate(
        &deformed(3, 0.1),
        props.model.constitutive(),
        props.lame(),
        &InversionSettings::default(),
    );
    let mut k = DenseMatrix::zeros(12, 12);
    tet.add_stiffness(&response, props.model.constitutive(), props.lame(), &[0, 3, 6, 9], &mut k);
    let asym = k.add_scaled(&k.transpose(), -1.0).max_abs();
    assert!(asym < 1e-8 * k.max_abs(), "asymmetry {asym}");
}

#[test]
fn inverted_element_is_flagged() {
    let props = rubber(MaterialModel::NeoHookean);
    let mut tet = Tetrahedron::new([0, 1, 2, 3], &rest()).unwrap();
    let mut x = rest();
    x[2] = DVec3::new(0.0, 0.0, -0.5);
    let r = tet.evaluate(
        &x,
        props.model.constitutive(),
        props.lame(),
        &InversionSettings::default(),
    );
    assert!(tet.inverted);
    assert!(r.stress.is_finite());
    // the pushed-through node is driven back up
    let forces = tet.nodal_forces(&r);
    assert!(forces[2].z > 0.0);
}

// ─── Soft Body Tests ──────────────────────────────────────────

#[test]
fn soft_body_mass_matches_volume() {
    let mesh = tet_block([2, 2, 2], DVec3::splat(1.0), DVec3::ZERO);
    let body = SoftBody::from_mesh("block", &mesh, rubber(MaterialModel::CoRotated)).unwrap();
    assert_eq!(body.node_count(), 27);
    assert_eq!(body.tet_count(), 48);
    assert!((body.mass() - 1000.0).abs() < 1e-9);
}

#[test]
fn soft_body_rejects_bad_material() {
    let mut props = rubber(MaterialModel::Stvk);
    props.poisson_ratio = 0.5;
    assert!(SoftBody::from_mesh("bad", &single_tet(), props).is_err());
}

#[test]
fn soft_body_fix_and_attach_validate_indices() {
    let mut body = SoftBody::from_mesh("tet", &single_tet(), rubber(MaterialModel::Linear)).unwrap();
    assert!(body.fix_nodes(&[0, 3]).is_ok());
    assert!(body.fix_nodes(&[4]).is_err());
    assert!(!body.nodes[0].is_free());
    assert!(body.nodes[1].is_free());
}

#[test]
fn soft_body_rest_energy_is_zero() {
    let mesh = tet_block([1, 1, 1], DVec3::splat(0.5), DVec3::ZERO);
    for model in MaterialModel::ALL {
        let body = SoftBody::from_mesh("block", &mesh, rubber(model)).unwrap();
        assert!(body.elastic_energy().abs() < 1e-12, "{model}");
        assert_eq!(body.inverted_count(), 0);
    }
}

#[test]
fn soft_body_mass_triplets_are_lumped() {
    let body = SoftBody::from_mesh("tet", &single_tet(), rubber(MaterialModel::Linear)).unwrap();
    let mut mm: Vec<Triplet> = Vec::new();
    body.compute_mass_sparse(&mut mm);
    assert_eq!(mm.len(), 12);
    assert!(mm.iter().all(|t| t.row == t.col));
    let total: f64 = mm.iter().map(|t| t.val).sum();
    assert!((total - 3.0 * body.mass()).abs() < 1e-9);
}

// ─── Mesh Embedding Tests ─────────────────────────────────────

fn coarse_tet() -> SoftBody {
    SoftBody::from_mesh("coarse", &single_tet(), rubber(MaterialModel::CoRotated)).unwrap()
}

fn embedding_in(world: &World, id: ComponentId) -> &MeshEmbedding {
    match world.component(id) {
        Component::Embedding(e) => e,
        other => panic!("expected an embedding, got '{}'", other.name()),
    }
}

#[test]
fn embedding_weights_are_barycentric() {
    let p = DVec3::new(0.1, 0.2, 0.3);
    let embedding = MeshEmbedding::new(coarse_tet(), &[p, DVec3::splat(0.25)], 1e-9).unwrap();

    let first = &embedding.points[0];
    assert_eq!(first.tet, 0);
    let expected = [0.1, 0.2, 0.3, 0.4];
    for (w, e) in first.weights.iter().zip(&expected) {
        assert!((w - e).abs() < 1e-12, "weights {:?}", first.weights);
    }
    assert!((first.x - p).length() < 1e-12);

    let centroid = &embedding.points[1];
    for w in centroid.weights {
        assert!((w - 0.25).abs() < 1e-12);
    }
}

#[test]
fn embedding_picks_containing_tet_in_block() {
    let mesh = tet_block([2, 2, 2], DVec3::splat(1.0), DVec3::ZERO);
    let coarse = SoftBody::from_mesh("block", &mesh, rubber(MaterialModel::CoRotated)).unwrap();
    let points = [
        DVec3::new(0.3, 0.6, 0.2),
        DVec3::new(0.9, 0.1, 0.75),
        DVec3::new(0.5, 0.5, 0.5),
    ];
    let embedding = MeshEmbedding::new(coarse, &points, 1e-9).unwrap();
    for (point, p) in embedding.points.iter().zip(&points) {
        assert!(point.weights.iter().all(|&w| w >= -1e-9), "{:?}", point.weights);
        assert!((point.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        let tet = embedding.coarse.tets[point.tet].nodes;
        let rebuilt: DVec3 = tet
            .iter()
            .zip(&point.weights)
            .map(|(&n, &w)| embedding.coarse.nodes[n].x0 * w)
            .sum();
        assert!((rebuilt - *p).length() < 1e-12);
    }
}

#[test]
fn embedding_rejects_point_outside_coarse_mesh() {
    let result = MeshEmbedding::new(coarse_tet(), &[DVec3::new(0.2, 0.2, 0.2), DVec3::ONE], 1e-6);
    match result {
        Err(MekanoError::InvalidMesh(msg)) => assert!(msg.contains("point 1"), "{msg}"),
        other => panic!("expected InvalidMesh, got {other:?}"),
    }
}

#[test]
fn embedding_tolerance_admits_points_on_the_surface() {
    let just_outside = DVec3::new(-1e-4, 0.3, 0.3);
    assert!(MeshEmbedding::new(coarse_tet(), &[just_outside], 1e-6).is_err());
    let embedding = MeshEmbedding::new(coarse_tet(), &[just_outside], 1e-3).unwrap();
    assert!((embedding.points[0].x - just_outside).length() < 1e-12);
}

#[test]
fn embedding_rejects_coarse_body_without_elements() {
    let mut coarse = coarse_tet();
    coarse.tets.clear();
    assert!(matches!(
        MeshEmbedding::new(coarse, &[DVec3::splat(0.1)], 1e-6),
        Err(MekanoError::InvalidMesh(_))
    ));
}

#[test]
fn embedded_points_follow_scattered_coarse_nodes() {
    let p = DVec3::new(0.2, 0.3, 0.1);
    let embedding = MeshEmbedding::new(coarse_tet(), &[p], 1e-9).unwrap();
    let mut world = World::new();
    let id = world.add_component(embedding);
    let sizes = world.init(&InversionSettings::default()).unwrap();
    assert_eq!(sizes.nr, 12);

    // affine map x ↦ A x + t, reproduced exactly by barycentric weights
    let a = DMat3::from_cols(
        DVec3::new(2.0, 0.5, 0.0),
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(0.0, 0.3, 0.5),
    );
    let t = DVec3::new(0.5, -1.0, 2.0);
    let mut y = world.gather_state();
    for node in 0..4 {
        let x = DVec3::new(y[3 * node], y[3 * node + 1], y[3 * node + 2]);
        let moved = a * x + t;
        y[3 * node..3 * node + 3].copy_from_slice(&moved.to_array());
    }
    world.scatter_state(&y).unwrap();

    let embedded = embedding_in(&world, id);
    let expected = a * p + t;
    assert!(
        (embedded.points[0].x - expected).length() < 1e-12,
        "{} vs {expected}",
        embedded.points[0].x
    );
    // weights are material and do not change with the motion
    assert!((embedded.points[0].weights[0] - 0.2).abs() < 1e-12);
}

#[test]
fn embedding_state_round_trips_through_world() {
    let p = DVec3::new(0.25, 0.25, 0.1);
    let embedding = MeshEmbedding::new(coarse_tet(), &[p], 1e-9).unwrap();
    let mut world = World::new();
    let id = world.add_component(embedding);
    world.init(&InversionSettings::default()).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let y: Vec<f64> = world
        .gather_state()
        .iter()
        .map(|v| v + rng.gen_range(-0.05..0.05))
        .collect();
    world.scatter_state(&y).unwrap();
    assert_eq!(world.gather_state(), y);

    let before = embedding_in(&world, id).points[0].x;
    let again = world.gather_state();
    world.scatter_state(&again).unwrap();
    assert_eq!(embedding_in(&world, id).points[0].x, before);
}
