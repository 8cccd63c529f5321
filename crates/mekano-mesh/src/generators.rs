//! Procedural mesh generators for benchmarks and testing.
//!
//! These generators produce deterministic, resolution-configurable meshes
//! with every tetrahedron positively oriented.

use mekano_math::DVec3;

use crate::mesh::TetMesh;

/// Unit right-corner tetrahedron: vertices `x̂`, `ŷ`, `ẑ` and the origin.
///
/// Its edge matrix is the identity, so `Bm = I` and the rest volume is 1/6.
pub fn single_tet() -> TetMesh {
    let mut mesh = TetMesh::with_capacity(4, 1);
    mesh.push_vertex(DVec3::X);
    mesh.push_vertex(DVec3::Y);
    mesh.push_vertex(DVec3::Z);
    mesh.push_vertex(DVec3::ZERO);
    mesh.push_tet([0, 1, 2, 3]);
    mesh
}

/// Axis orderings of the six Kuhn tetrahedra of a cube.
const KUHN_PATHS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Generates a box of `cells[0] × cells[1] × cells[2]` cubes, each split
/// into six tetrahedra sharing the cube's main diagonal.
///
/// The box spans `[origin, origin + extent]`. The split is conforming, so
/// neighboring cubes share faces exactly.
///
/// # Example
/// ```
/// use mekano_mesh::generators::tet_block;
/// use mekano_math::DVec3;
/// let mesh = tet_block([2, 1, 1], DVec3::new(2.0, 1.0, 1.0), DVec3::ZERO);
/// assert_eq!(mesh.vertex_count(), 12); // 3×2×2 vertices
/// assert_eq!(mesh.tet_count(), 12);    // 2 cubes × 6 tets
/// ```
pub fn tet_block(cells: [usize; 3], extent: DVec3, origin: DVec3) -> TetMesh {
    let [nx, ny, nz] = cells;
    let verts = [nx + 1, ny + 1, nz + 1];
    let vertex_count = verts[0] * verts[1] * verts[2];
    let mut mesh = TetMesh::with_capacity(vertex_count, nx * ny * nz * 6);

    let step = DVec3::new(
        extent.x / nx.max(1) as f64,
        extent.y / ny.max(1) as f64,
        extent.z / nz.max(1) as f64,
    );

    for k in 0..verts[2] {
        for j in 0..verts[1] {
            for i in 0..verts[0] {
                let p = origin + DVec3::new(i as f64, j as f64, k as f64) * step;
                mesh.push_vertex(p);
            }
        }
    }

    let index = |c: [usize; 3]| (c[0] + verts[0] * (c[1] + verts[1] * c[2])) as u32;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let base = [i, j, k];
                for path in KUHN_PATHS {
                    let mut corner = base;
                    let v0 = index(corner);
                    corner[path[0]] += 1;
                    let v1 = index(corner);
                    corner[path[1]] += 1;
                    let v2 = index(corner);
                    corner[path[2]] += 1;
                    let v3 = index(corner);
                    mesh.push_tet([v0, v1, v2, v3]);
                }
            }
        }
    }

    mesh.orient_positive();
    mesh
}
