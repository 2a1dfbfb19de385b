//! Integration tests for mesh loading and deduplication.

use std::io::Write;
use std::path::PathBuf;

use ember_resources::{MeshData, ResourceError, dedup_vertices, load_obj};
use ember_rhi::vertex::Vertex;
use glam::{Vec2, Vec3};

/// Writes `contents` to a unique file under the target temp dir.
fn write_temp_obj(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ember_{}_{}.obj", name, std::process::id()));
    let mut file = std::fs::File::create(&path).expect("Failed to create temp OBJ");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp OBJ");
    path
}

fn vertex(x: f32, y: f32, u: f32, v: f32) -> Vertex {
    Vertex::new(Vec3::new(x, y, 0.0), Vec3::ONE, Vec2::new(u, v))
}

/// A 3x2 grid of corners split into two quads, with the left quad also
/// drawn back-facing. The raw records hold 8 position/UV combinations, two
/// of which repeat earlier ones, and 6 triangles reference them.
#[test]
fn test_dedup_grid_with_shared_edges() {
    let a = vertex(0.0, 0.0, 0.0, 0.0);
    let b = vertex(1.0, 0.0, 0.5, 0.0);
    let c = vertex(1.0, 1.0, 0.5, 1.0);
    let d = vertex(0.0, 1.0, 0.0, 1.0);
    let e = vertex(2.0, 0.0, 1.0, 0.0);
    let f = vertex(2.0, 1.0, 1.0, 1.0);

    // Records 6 and 7 repeat b and c, as a loader emits for the second quad.
    let records = [a, b, c, d, e, f, b, c];
    let triangles: [[usize; 3]; 6] = [
        [0, 1, 2],
        [2, 3, 0],
        [6, 4, 5],
        [5, 7, 6],
        [0, 3, 2],
        [2, 1, 0],
    ];
    let stream: Vec<Vertex> = triangles
        .iter()
        .flatten()
        .map(|&r| records[r])
        .collect();
    assert_eq!(stream.len(), 18);

    let (vertices, indices) = dedup_vertices(stream.clone());
    assert_eq!(vertices.len(), 6);
    assert_eq!(indices.len(), 18);
    assert!(indices.iter().all(|&i| i < 6));

    let rebuilt: Vec<Vertex> = indices.iter().map(|&i| vertices[i as usize]).collect();
    assert_eq!(rebuilt, stream);
}

#[test]
fn test_dedup_reconstructs_stream() {
    let mesh = MeshData::textured_cube();
    let expanded: Vec<Vertex> = mesh
        .indices
        .iter()
        .map(|&i| mesh.vertices[i as usize])
        .collect();

    let (vertices, indices) = dedup_vertices(expanded.clone());
    assert_eq!(vertices, mesh.vertices);
    assert_eq!(indices, mesh.indices);

    let rebuilt: Vec<Vertex> = indices.iter().map(|&i| vertices[i as usize]).collect();
    assert_eq!(rebuilt, expanded);
}

#[test]
fn test_load_obj_quad() {
    let path = write_temp_obj(
        "quad",
        "\
o quad
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3 4/4
",
    );

    let mesh = load_obj(&path).expect("Failed to load quad OBJ");
    std::fs::remove_file(&path).ok();

    // Triangulated into two triangles sharing a diagonal.
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices.len(), 6);
    assert!(mesh.indices.iter().all(|&i| i < 4));

    for vertex in &mesh.vertices {
        assert_eq!(vertex.color, Vec3::ONE);
    }

    // V is flipped: the OBJ corner (0, 0) with vt (0, 0) ends up at v = 1.
    let origin = mesh
        .vertices
        .iter()
        .find(|v| v.position == Vec3::ZERO)
        .expect("origin vertex missing");
    assert_eq!(origin.tex_coord, Vec2::new(0.0, 1.0));
}

#[test]
fn test_load_obj_without_tex_coords() {
    let path = write_temp_obj(
        "no_uv",
        "\
o tri
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
f 1 2 3
",
    );

    let result = load_obj(&path);
    std::fs::remove_file(&path).ok();

    assert!(matches!(result, Err(ResourceError::MissingTexCoords(_))));
}
