//! Frozen, render-ready copy of a scene.
//!
//! Built once when ray tracing starts. Later edits to the live [`Scene`]
//! never reach a running job because nothing here points back into it.

use tracing::{debug, warn};

use super::build::build_bvh;
use super::bvh::{Bvh, Hit, Primitive};
use crate::scene::{Camera, Material, Scene, Sky};
use crate::util::Ray;

/// Immutable render input: flat primitives, their BVH, materials, camera.
pub struct SceneSnapshot {
    pub primitives: Vec<Primitive>,
    pub materials: Vec<Material>,
    pub bvh: Bvh,
    /// Indices of emissive primitives, for direct light sampling.
    pub lights: Vec<u32>,
    pub camera: Camera,
    pub sky: Sky,
}

impl SceneSnapshot {
    /// Flatten `scene` into world-space primitives and build the BVH.
    ///
    /// Uniformly scaled spheres stay analytic. Everything else becomes
    /// triangles; degenerate ones are dropped.
    #[tracing::instrument(skip_all, fields(objects = scene.len()))]
    pub fn from_scene(scene: &Scene) -> Self {
        let mut primitives = Vec::new();
        let mut materials = Vec::with_capacity(scene.len());
        let mut skipped = 0usize;

        for obj in scene.objects() {
            let mat_idx = materials.len() as u32;
            materials.push(obj.material);

            if let Some((center, radius)) = obj.analytic_sphere() {
                primitives.push(Primitive::sphere(center, radius, mat_idx));
                continue;
            }

            let mesh = obj.shape.base_mesh(scene.library());
            let m = obj.world_matrix();
            for tri in mesh.world_triangles(&m) {
                match Primitive::triangle(tri, mat_idx) {
                    Some(p) => primitives.push(p),
                    None => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            warn!("snapshot: dropped {} degenerate triangles", skipped);
        }
        let bvh = build_bvh(&primitives);
        let lights: Vec<u32> = primitives
            .iter()
            .enumerate()
            .filter(|(_, p)| materials[p.material as usize].is_light() && p.area() > 0.0)
            .map(|(i, _)| i as u32)
            .collect();
        debug!(
            "snapshot: {} primitives, {} lights, {} BVH nodes",
            primitives.len(),
            lights.len(),
            bvh.nodes.len()
        );

        Self {
            primitives,
            materials,
            bvh,
            lights,
            camera: scene.camera,
            sky: scene.sky,
        }
    }

    #[inline]
    pub fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        self.bvh.intersect(&self.primitives, ray, t_min, t_max)
    }

    #[inline]
    pub fn material(&self, index: u32) -> &Material {
        &self.materials[index as usize]
    }

    /// Density per unit area of picking a point on light primitive `prim`
    /// when one light is chosen uniformly and then a point on its surface.
    pub fn light_area_pdf(&self, prim: u32) -> f32 {
        let area = self.primitives[prim as usize].area();
        if self.lights.is_empty() || area <= 0.0 {
            return 0.0;
        }
        1.0 / (self.lights.len() as f32 * area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Primitive as ScenePrimitive, ScenePreset, Transform};
    use crate::util::Vec3;

    #[test]
    fn test_snapshot_sphere_stays_analytic() {
        let mut scene = Scene::default();
        scene
            .add_primitive(
                ScenePrimitive::Sphere { radius: 1.0 },
                Transform::from_position(Vec3::new(0.0, 0.0, -3.0)),
                Material::default(),
            )
            .unwrap();
        let snap = SceneSnapshot::from_scene(&scene);
        assert_eq!(snap.primitives.len(), 1);
        assert_eq!(snap.materials.len(), 1);

        let hit = snap
            .intersect(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), 1e-4, f32::INFINITY)
            .unwrap();
        assert!((hit.t - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_snapshot_is_isolated_from_edits() {
        let mut scene = Scene::default();
        scene.load_preset(ScenePreset::CornellBox, None).unwrap();
        let snap = SceneSnapshot::from_scene(&scene);
        let count = snap.primitives.len();
        assert!(count > 0);

        scene.clear();
        assert_eq!(snap.primitives.len(), count);
        assert!(snap.materials.iter().any(|m| m.is_light()));
    }

    #[test]
    fn test_lights_list_emissive_primitives() {
        let mut scene = Scene::default();
        scene.load_preset(ScenePreset::CornellBox, None).unwrap();
        let snap = SceneSnapshot::from_scene(&scene);

        // The ceiling panel is one quad
        assert_eq!(snap.lights.len(), 2);
        for &i in &snap.lights {
            let prim = &snap.primitives[i as usize];
            assert!(snap.material(prim.material).is_light());
        }
        let total: f32 = snap.lights.iter().map(|&i| snap.light_area_pdf(i) * snap.primitives[i as usize].area()).sum();
        assert!((total - 1.0).abs() < 1e-5);

        let unlit = snap.primitives.iter().position(|p| !snap.material(p.material).is_light()).unwrap();
        assert!(snap.lights.iter().all(|&i| i as usize != unlit));
    }
}
