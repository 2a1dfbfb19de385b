//! Mesh data: OBJ loading, vertex deduplication and a built-in cube.

use std::collections::HashMap;
use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::{debug, info};

use ember_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Unique vertices and the triangle list indexing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of indices, as passed to the indexed draw.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Unit cube centred on the origin with one full UV square per face.
    ///
    /// Used when no model is configured. Faces wind counter-clockwise when
    /// seen from outside.
    pub fn textured_cube() -> Self {
        // (normal, u axis, v axis) per face; corners are n ± u ± v.
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let white = Vec3::ONE;
        let mut corners = Vec::with_capacity(36);
        for (normal, u_axis, v_axis) in FACES {
            let (n, u, v) = (
                Vec3::from(normal),
                Vec3::from(u_axis),
                Vec3::from(v_axis),
            );
            let quad = CORNERS.map(|(su, sv)| {
                let position = (n + u * su + v * sv) * 0.5;
                let tex_coord = Vec2::new((su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5);
                Vertex::new(position, white, tex_coord)
            });
            corners.extend([quad[0], quad[1], quad[2], quad[2], quad[3], quad[0]]);
        }

        let (vertices, indices) = dedup_vertices(corners);
        Self { vertices, indices }
    }
}

/// Collapses a triangle-list vertex stream into unique vertices plus indices.
///
/// Two vertices are the same only if every attribute is bitwise equal, so
/// `0.0` and `-0.0` stay distinct and NaNs are never merged with non-NaNs.
/// Vertices keep the order of their first occurrence.
pub fn dedup_vertices<I>(stream: I) -> (Vec<Vertex>, Vec<u32>)
where
    I: IntoIterator<Item = Vertex>,
{
    let stream = stream.into_iter();
    let (lower, _) = stream.size_hint();

    let mut unique: HashMap<[u32; 8], u32> = HashMap::with_capacity(lower);
    let mut vertices = Vec::new();
    let mut indices = Vec::with_capacity(lower);

    for vertex in stream {
        let index = *unique.entry(vertex.bit_key()).or_insert_with(|| {
            vertices.push(vertex);
            (vertices.len() - 1) as u32
        });
        indices.push(index);
    }

    (vertices, indices)
}

/// Loads every mesh in an OBJ file into one deduplicated mesh.
///
/// Faces are triangulated, the V texture coordinate is flipped to match
/// Vulkan's top-left image origin, and vertex color is white.
pub fn load_obj(path: &Path) -> ResourceResult<MeshData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) =
        tobj::load_obj(path, &options).map_err(|source| ResourceError::ObjLoad {
            path: path.to_path_buf(),
            source,
        })?;

    if models.is_empty() {
        return Err(ResourceError::NoMeshes(path.to_path_buf()));
    }

    let mut stream = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        if mesh.texcoords.is_empty() {
            return Err(ResourceError::MissingTexCoords(model.name.clone()));
        }
        debug!(
            "OBJ mesh '{}': {} positions, {} indices",
            model.name,
            mesh.positions.len() / 3,
            mesh.indices.len()
        );

        for &index in &mesh.indices {
            let p = 3 * index as usize;
            let t = 2 * index as usize;
            stream.push(Vertex::new(
                Vec3::new(
                    mesh.positions[p],
                    mesh.positions[p + 1],
                    mesh.positions[p + 2],
                ),
                Vec3::ONE,
                Vec2::new(mesh.texcoords[t], 1.0 - mesh.texcoords[t + 1]),
            ));
        }
    }

    let (vertices, indices) = dedup_vertices(stream);
    info!(
        "Loaded '{}': {} unique vertices, {} triangles",
        path.display(),
        vertices.len(),
        indices.len() / 3
    );

    Ok(MeshData { vertices, indices })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32, u: f32, w: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, 0.0), Vec3::ONE, Vec2::new(u, w))
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let a = v(0.0, 0.0, 0.0, 0.0);
        let b = v(1.0, 0.0, 1.0, 0.0);
        let c = v(0.0, 1.0, 0.0, 1.0);

        let (vertices, indices) = dedup_vertices([b, a, b, c, a]);
        assert_eq!(vertices, vec![b, a, c]);
        assert_eq!(indices, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_dedup_is_bitwise() {
        let positive = v(0.0, 0.0, 0.0, 0.0);
        let negative = v(-0.0, 0.0, 0.0, 0.0);

        let (vertices, indices) = dedup_vertices([positive, negative, positive]);
        assert_eq!(vertices.len(), 2);
        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_dedup_distinguishes_tex_coords() {
        // Same position, different UV seam.
        let (vertices, _) = dedup_vertices([v(1.0, 1.0, 0.0, 0.0), v(1.0, 1.0, 1.0, 0.0)]);
        assert_eq!(vertices.len(), 2);
    }

    #[test]
    fn test_dedup_empty() {
        let (vertices, indices) = dedup_vertices(std::iter::empty());
        assert!(vertices.is_empty());
        assert!(indices.is_empty());
    }

    #[test]
    fn test_textured_cube() {
        let cube = MeshData::textured_cube();
        // Corners merge across faces only where their UVs agree.
        assert!((8..=24).contains(&cube.vertices.len()));
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));

        for vertex in &cube.vertices {
            assert_eq!(vertex.position.abs().max_element(), 0.5);
            assert!((0.0..=1.0).contains(&vertex.tex_coord.x));
            assert!((0.0..=1.0).contains(&vertex.tex_coord.y));
        }
    }

    #[test]
    fn test_textured_cube_winds_outward() {
        let cube = MeshData::textured_cube();
        for tri in cube.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| cube.vertices[i as usize].position);
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "triangle {:?} faces inward", tri);
        }
    }

    #[test]
    fn test_load_obj_missing_file() {
        let err = load_obj(Path::new("does/not/exist.obj")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
