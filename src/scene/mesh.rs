//! Triangle meshes: primitive tessellation and imported geometry.
//!
//! Primitive shapes are tessellated once at unit size into a shared
//! [`MeshLibrary`]; objects scale the unit mesh by their own dimensions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::util::{Aabb, Error, Mat4, Result, Vec3};

/// Indexed triangle mesh in local space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self { positions, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        for p in &self.positions {
            b.grow_point(*p);
        }
        b
    }

    /// Corner positions of every triangle, transformed by `m`.
    /// Triangles referencing missing vertices are skipped.
    pub fn world_triangles(&self, m: &Mat4) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        let m = *m;
        let n = self.positions.len();
        self.indices.iter().filter_map(move |tri| {
            let [a, b, c] = tri.map(|i| i as usize);
            if a >= n || b >= n || c >= n {
                return None;
            }
            Some([
                m.transform_point3(self.positions[a]),
                m.transform_point3(self.positions[b]),
                m.transform_point3(self.positions[c]),
            ])
        })
    }

    /// Structural checks used when importing external data.
    pub fn validate(&self) -> Result<()> {
        if self.indices.is_empty() {
            return Err(Error::InvalidSceneData("mesh has no triangles".into()));
        }
        let n = self.positions.len() as u32;
        if self.indices.iter().flatten().any(|&i| i >= n) {
            return Err(Error::InvalidSceneData("mesh index out of range".into()));
        }
        if self.positions.iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidSceneData("non-finite mesh vertex".into()));
        }
        Ok(())
    }

    /// Recenter on the origin and scale to a bounding radius of 1.
    pub fn normalized(mut self) -> Self {
        let b = self.bounds();
        if b.is_empty() {
            return self;
        }
        let center = b.center();
        let radius = self
            .positions
            .iter()
            .map(|p| (*p - center).length())
            .fold(0.0f32, f32::max);
        let inv = if radius > 1e-12 { 1.0 / radius } else { 1.0 };
        for p in &mut self.positions {
            *p = (*p - center) * inv;
        }
        self
    }

    /// Geodesic sphere of radius 1 from a subdivided icosahedron.
    pub fn icosphere(subdivisions: u32) -> Self {
        let t = (1.0 + 5f32.sqrt()) / 2.0;
        let mut positions: Vec<Vec3> = [
            (-1.0, t, 0.0),
            (1.0, t, 0.0),
            (-1.0, -t, 0.0),
            (1.0, -t, 0.0),
            (0.0, -1.0, t),
            (0.0, 1.0, t),
            (0.0, -1.0, -t),
            (0.0, 1.0, -t),
            (t, 0.0, -1.0),
            (t, 0.0, 1.0),
            (-t, 0.0, -1.0),
            (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalize())
        .collect();

        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
            let mut midpoint = |a: u32, b: u32, positions: &mut Vec<Vec3>| -> u32 {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let p = (positions[a as usize] + positions[b as usize]).normalize();
                    positions.push(p);
                    (positions.len() - 1) as u32
                })
            };

            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(a, b, &mut positions);
                let bc = midpoint(b, c, &mut positions);
                let ca = midpoint(c, a, &mut positions);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            faces = next;
        }

        Self::new(positions, faces)
    }

    /// Axis-aligned cube with side length 1 centred on the origin.
    /// Vertices are not shared between faces.
    pub fn unit_box() -> Self {
        let mut positions = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(12);
        let axes = [Vec3::X, Vec3::Y, Vec3::Z];
        for (i, &n) in axes.iter().enumerate() {
            let u = axes[(i + 1) % 3];
            let v = axes[(i + 2) % 3];
            for sign in [1.0f32, -1.0] {
                let normal = n * sign;
                let (u, v) = if sign > 0.0 { (u, v) } else { (v, u) };
                let base = positions.len() as u32;
                let c = normal * 0.5;
                positions.push(c - u * 0.5 - v * 0.5);
                positions.push(c + u * 0.5 - v * 0.5);
                positions.push(c + u * 0.5 + v * 0.5);
                positions.push(c - u * 0.5 + v * 0.5);
                indices.push([base, base + 1, base + 2]);
                indices.push([base, base + 2, base + 3]);
            }
        }
        Self::new(positions, indices)
    }

    /// Unit square in the local XZ plane, facing +Y.
    pub fn unit_quad() -> Self {
        Self::new(
            vec![
                Vec3::new(-0.5, 0.0, 0.5),
                Vec3::new(0.5, 0.0, 0.5),
                Vec3::new(0.5, 0.0, -0.5),
                Vec3::new(-0.5, 0.0, -0.5),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }
}

impl From<mesh_codec::MeshData> for TriangleMesh {
    fn from(data: mesh_codec::MeshData) -> Self {
        let positions = data.positions.into_iter().map(Vec3::from).collect();
        let indices = data
            .indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        Self::new(positions, indices)
    }
}

/// Decode external mesh bytes into a normalized local mesh.
#[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
pub fn decode_mesh(bytes: &[u8]) -> Result<TriangleMesh> {
    let data = mesh_codec::decode(bytes)?;
    let mesh = TriangleMesh::from(data).normalized();
    mesh.validate()
        .map_err(|e| Error::MalformedAsset(e.to_string()))?;
    tracing::debug!(
        "decoded mesh: {} vertices, {} triangles",
        mesh.positions.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

/// Unit-size tessellations shared by all primitive objects.
#[derive(Debug)]
pub struct MeshLibrary {
    pub sphere: Arc<TriangleMesh>,
    pub cube: Arc<TriangleMesh>,
    pub quad: Arc<TriangleMesh>,
    pub sphere_subdivisions: u32,
}

impl MeshLibrary {
    pub fn new(sphere_subdivisions: u32) -> Self {
        Self {
            sphere: Arc::new(TriangleMesh::icosphere(sphere_subdivisions)),
            cube: Arc::new(TriangleMesh::unit_box()),
            quad: Arc::new(TriangleMesh::unit_quad()),
            sphere_subdivisions,
        }
    }
}

impl Default for MeshLibrary {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icosphere_counts() {
        let s0 = TriangleMesh::icosphere(0);
        assert_eq!(s0.positions.len(), 12);
        assert_eq!(s0.triangle_count(), 20);

        let s2 = TriangleMesh::icosphere(2);
        assert_eq!(s2.triangle_count(), 320);
        assert_eq!(s2.positions.len(), 162);
        for p in &s2.positions {
            assert!((p.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_icosphere_outward_winding() {
        let s = TriangleMesh::icosphere(1);
        for [a, b, c] in &s.indices {
            let (a, b, c) = (
                s.positions[*a as usize],
                s.positions[*b as usize],
                s.positions[*c as usize],
            );
            let n = (b - a).cross(c - a);
            assert!(n.dot(a + b + c) > 0.0);
        }
    }

    #[test]
    fn test_box_outward_winding() {
        let m = TriangleMesh::unit_box();
        assert_eq!(m.triangle_count(), 12);
        let b = m.bounds();
        assert_eq!(b.min, Vec3::splat(-0.5));
        assert_eq!(b.max, Vec3::splat(0.5));
        for [a, b, c] in &m.indices {
            let (a, b, c) = (
                m.positions[*a as usize],
                m.positions[*b as usize],
                m.positions[*c as usize],
            );
            let n = (b - a).cross(c - a);
            assert!(n.dot(a + b + c) > 0.0);
        }
    }

    #[test]
    fn test_quad_faces_up() {
        let q = TriangleMesh::unit_quad();
        for [a, b, c] in &q.indices {
            let (a, b, c) = (
                q.positions[*a as usize],
                q.positions[*b as usize],
                q.positions[*c as usize],
            );
            assert!((b - a).cross(c - a).y > 0.0);
        }
    }

    #[test]
    fn test_normalized() {
        let m = TriangleMesh::new(
            vec![
                Vec3::new(10.0, 10.0, 10.0),
                Vec3::new(14.0, 10.0, 10.0),
                Vec3::new(10.0, 14.0, 10.0),
            ],
            vec![[0, 1, 2]],
        )
        .normalized();
        let max = m.positions.iter().map(|p| p.length()).fold(0.0, f32::max);
        assert!((max - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_decode_mesh_rejects_garbage() {
        assert!(matches!(
            decode_mesh(b"not a mesh at all"),
            Err(Error::MalformedAsset(_))
        ));
    }
}
