//! Scene export and import.
//!
//! Two forms:
//! - [`SceneState`]: full structural snapshot (ids, counter, camera, sky,
//!   objects) as JSON. Importing it reproduces an equal store.
//! - [`FlatGeometry`]: world-space triangle soup with per-vertex colours, for
//!   external persistence that only cares about geometry.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use super::{Camera, Scene, SceneObject, Shape, Sky};
use crate::util::{Error, Result, Vec3};

/// Current [`SceneState`] format version.
pub const SCENE_STATE_VERSION: u32 = 1;

/// Full serializable scene store state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub version: u32,
    pub next_id: u64,
    pub camera: Camera,
    pub sky: Sky,
    pub objects: Vec<SceneObject>,
}

impl SceneState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        info!("Exported scene state to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Structural checks before import.
    pub fn validate(&self) -> Result<()> {
        if self.version != SCENE_STATE_VERSION {
            return Err(Error::InvalidSceneData(format!(
                "unsupported version {}",
                self.version
            )));
        }
        let mut seen = HashSet::new();
        for obj in &self.objects {
            if !seen.insert(obj.id) {
                return Err(Error::InvalidSceneData(format!("duplicate id {}", obj.id)));
            }
            if obj.id.0 >= self.next_id {
                return Err(Error::InvalidSceneData(format!(
                    "id {} not below next_id {}",
                    obj.id, self.next_id
                )));
            }
            if !obj.transform.is_finite() {
                return Err(Error::InvalidSceneData(format!(
                    "non-finite transform on {}",
                    obj.id
                )));
            }
            match &obj.shape {
                Shape::Primitive(p) => p
                    .validate()
                    .map_err(|e| Error::InvalidSceneData(e.to_string()))?,
                Shape::Mesh { mesh } => mesh.validate()?,
            }
        }
        Ok(())
    }
}

impl Scene {
    /// Snapshot the whole store.
    pub fn export_state(&self) -> SceneState {
        SceneState {
            version: SCENE_STATE_VERSION,
            next_id: self.next_id().0,
            camera: self.camera,
            sky: self.sky,
            objects: self.objects().cloned().collect(),
        }
    }

    /// Replace the store with `state`. The scene is untouched on error.
    ///
    /// The id counter never moves backwards, so ids issued before the
    /// import stay unique. Materials and camera parameters are clamped into
    /// their valid ranges.
    pub fn import_state(&mut self, state: SceneState) -> Result<()> {
        state.validate()?;
        let next_id = state.next_id.max(self.next_id().0);
        let count = state.objects.len();
        // Imported records get the same range clamps as every other
        // entry point
        let objects = state
            .objects
            .into_iter()
            .map(|mut obj| {
                obj.material = obj.material.sanitized();
                obj
            })
            .collect();
        self.camera = state.camera.sanitized();
        self.sky = state.sky;
        self.restore(objects, next_id);
        debug!("imported {} objects", count);
        Ok(())
    }

    /// Flatten world-space geometry.
    pub fn export_geometry(&self) -> FlatGeometry {
        let mut positions: Vec<Vec3> = Vec::new();
        let mut colors: Vec<Vec3> = Vec::new();
        let mut triangles_per_object = Vec::with_capacity(self.len());

        for obj in self.objects() {
            let mesh = obj.shape.base_mesh(self.library());
            let m = obj.world_matrix();
            let color = obj.material.color();
            let mut count = 0u32;
            for tri in mesh.world_triangles(&m) {
                positions.extend_from_slice(&tri);
                colors.extend_from_slice(&[color; 3]);
                count += 1;
            }
            triangles_per_object.push(count);
        }

        FlatGeometry {
            metadata: GeometryMetadata {
                object_count: triangles_per_object.len() as u32,
                triangles_per_object,
            },
            positions: bytemuck::cast_slice(&positions).to_vec(),
            colors: bytemuck::cast_slice(&colors).to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryMetadata {
    pub object_count: u32,
    pub triangles_per_object: Vec<u32>,
}

/// Flattened triangle soup: 9 position floats and 9 colour floats per
/// triangle, objects in id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatGeometry {
    pub metadata: GeometryMetadata,
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
}

impl FlatGeometry {
    pub fn triangle_count(&self) -> usize {
        self.metadata
            .triangles_per_object
            .iter()
            .map(|&n| n as usize)
            .sum()
    }

    /// Single float array:
    /// `[object_count, tris_0 .. tris_n-1, positions.., colors..]`.
    pub fn to_float_array(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(
            1 + self.metadata.triangles_per_object.len() + self.positions.len() + self.colors.len(),
        );
        out.push(self.metadata.object_count as f32);
        out.extend(self.metadata.triangles_per_object.iter().map(|&n| n as f32));
        out.extend_from_slice(&self.positions);
        out.extend_from_slice(&self.colors);
        out
    }

    /// Inverse of [`to_float_array`](Self::to_float_array).
    pub fn from_float_array(data: &[f32]) -> Result<Self> {
        let bad = |msg: &str| Error::InvalidSceneData(format!("float array: {}", msg));
        let (&count, rest) = data.split_first().ok_or_else(|| bad("empty"))?;
        if !(count.is_finite() && count >= 0.0 && count.fract() == 0.0) {
            return Err(bad("bad object count"));
        }
        let count = count as usize;
        if rest.len() < count {
            return Err(bad("truncated header"));
        }
        let (header, body) = rest.split_at(count);
        let triangles_per_object: Vec<u32> = header
            .iter()
            .map(|&n| {
                if n.is_finite() && n >= 0.0 && n.fract() == 0.0 {
                    Ok(n as u32)
                } else {
                    Err(bad("bad triangle count"))
                }
            })
            .collect::<Result<_>>()?;
        let floats: usize = triangles_per_object.iter().map(|&n| n as usize * 9).sum();
        if body.len() != floats * 2 {
            return Err(bad("length does not match triangle counts"));
        }
        let (positions, colors) = body.split_at(floats);
        Ok(Self {
            metadata: GeometryMetadata {
                object_count: count as u32,
                triangles_per_object,
            },
            positions: positions.to_vec(),
            colors: colors.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, ObjectId, Primitive, ScenePreset, Transform};

    #[test]
    fn test_state_round_trip_preserves_ids() {
        let mut scene = Scene::default();
        scene.load_preset(ScenePreset::CornellBox, None).unwrap();
        let state = scene.export_state();
        let json = state.to_json().unwrap();

        let mut other = Scene::default();
        other.import_state(SceneState::from_json(&json).unwrap()).unwrap();
        assert_eq!(other.export_state(), state);
        assert_eq!(other.ids(), scene.ids());
    }

    #[test]
    fn test_import_rejects_duplicates() {
        let mut scene = Scene::default();
        scene
            .add_primitive(Primitive::Sphere { radius: 1.0 }, Transform::IDENTITY, Material::default())
            .unwrap();
        let mut state = scene.export_state();
        let dup = state.objects[0].clone();
        state.objects.push(dup);

        let mut target = Scene::default();
        assert!(matches!(
            target.import_state(state),
            Err(Error::InvalidSceneData(_))
        ));
        assert!(target.is_empty());
    }

    #[test]
    fn test_import_never_rewinds_counter() {
        let mut big = Scene::default();
        for _ in 0..5 {
            big.add_primitive(Primitive::Sphere { radius: 1.0 }, Transform::IDENTITY, Material::default())
                .unwrap();
        }
        let small = Scene::default().export_state();
        big.import_state(small).unwrap();
        assert!(big.is_empty());
        assert_eq!(big.next_id(), ObjectId(6));
    }

    #[test]
    fn test_flat_geometry() {
        let mut scene = Scene::default();
        scene
            .add_primitive(
                Primitive::Box { x: 1.0, y: 1.0, z: 1.0 },
                Transform::IDENTITY,
                Material::diffuse(Vec3::new(1.0, 0.0, 0.0)),
            )
            .unwrap();
        scene
            .add_primitive(
                Primitive::Quad { width: 2.0, height: 2.0 },
                Transform::IDENTITY,
                Material::default(),
            )
            .unwrap();

        let flat = scene.export_geometry();
        assert_eq!(flat.metadata.object_count, 2);
        assert_eq!(flat.metadata.triangles_per_object, vec![12, 2]);
        assert_eq!(flat.positions.len(), 14 * 9);
        assert_eq!(flat.colors.len(), flat.positions.len());
        assert_eq!(&flat.colors[0..3], &[1.0, 0.0, 0.0]);

        let arr = flat.to_float_array();
        assert_eq!(FlatGeometry::from_float_array(&arr).unwrap(), flat);
        assert!(FlatGeometry::from_float_array(&arr[..arr.len() - 1]).is_err());
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let mut scene = Scene::default();
        scene.load_preset(ScenePreset::SimpleLight, None).unwrap();
        let state = scene.export_state();
        state.save(&path).unwrap();
        let back = SceneState::load(&path).unwrap();
        assert_eq!(back, state);
        assert!(back.objects.iter().any(|o| o.name == "Light"));
    }
}
