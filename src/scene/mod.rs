//! Scene store: the authoritative set of objects plus the camera.
//!
//! ## Ownership
//!
//! [`Scene`] exclusively owns its [`SceneObject`]s and the [`Camera`].
//! Everything outside refers to objects by [`ObjectId`]; ids come from a
//! monotonic counter and are never handed out twice, even across
//! [`Scene::clear`], so a stale id can only ever miss.
//!
//! Mutations addressed to an unknown id are logged and ignored. Callers may
//! race with deletion and that is not an error.

pub mod camera;
pub mod export;
pub mod material;
pub mod mesh;
pub mod object;
pub mod pick;
pub mod presets;

pub use camera::Camera;
pub use export::{FlatGeometry, GeometryMetadata, SceneState};
pub use material::{Material, MaterialKind, MaterialProperties};
pub use mesh::{MeshLibrary, TriangleMesh};
pub use object::{ObjectId, Primitive, SceneObject, Shape, Transform, TransformUpdate};
pub use presets::ScenePreset;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::util::{Result, Vec3};

/// Vertical sky gradient used as background and environment light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sky {
    pub top: Vec3,
    pub bottom: Vec3,
}

impl Default for Sky {
    fn default() -> Self {
        Self {
            top: Vec3::new(0.5, 0.7, 1.0),
            bottom: Vec3::ONE,
        }
    }
}

impl Sky {
    pub const BLACK: Sky = Sky {
        top: Vec3::ZERO,
        bottom: Vec3::ZERO,
    };

    /// Radiance for a (normalized) direction.
    #[inline]
    pub fn color(&self, dir: Vec3) -> Vec3 {
        let a = 0.5 * (dir.y + 1.0);
        self.bottom.lerp(self.top, a.clamp(0.0, 1.0))
    }
}

/// Object store plus camera.
#[derive(Debug, Clone)]
pub struct Scene {
    objects: BTreeMap<ObjectId, SceneObject>,
    pub camera: Camera,
    pub sky: Sky,
    next_id: u64,
    library: Arc<MeshLibrary>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Arc::new(MeshLibrary::default()))
    }
}

impl Scene {
    pub fn new(library: Arc<MeshLibrary>) -> Self {
        Self {
            objects: BTreeMap::new(),
            camera: Camera::default(),
            sky: Sky::default(),
            next_id: 1,
            library,
        }
    }

    /// Empty scene sized and tessellated per `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut scene = Self::new(Arc::new(MeshLibrary::new(config.sphere_subdivisions)));
        scene.camera.resize(config.width, config.height);
        scene.sky = Sky {
            top: Vec3::from(config.sky_top),
            bottom: Vec3::from(config.sky_bottom),
        };
        scene
    }

    pub fn library(&self) -> &Arc<MeshLibrary> {
        &self.library
    }

    /// Id the next inserted object will receive.
    pub fn next_id(&self) -> ObjectId {
        ObjectId(self.next_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// Insert an object with a fresh id.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        shape: Shape,
        transform: Transform,
        material: Material,
        mat_is_editable: bool,
    ) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let name = name.into();
        debug!("insert {} '{}'", id, name);
        self.objects.insert(
            id,
            SceneObject {
                id,
                name,
                shape,
                transform,
                material,
                mat_is_editable,
            },
        );
        id
    }

    /// Add an analytic primitive. Non-positive dimensions are rejected.
    pub fn add_primitive(
        &mut self,
        primitive: Primitive,
        transform: Transform,
        material: Material,
    ) -> Result<ObjectId> {
        primitive.validate()?;
        Ok(self.insert(
            primitive.name(),
            Shape::Primitive(primitive),
            transform,
            material,
            true,
        ))
    }

    /// Decode mesh bytes and insert them with the default material and an
    /// identity transform. The scene is untouched on failure.
    pub fn add_mesh(&mut self, bytes: &[u8]) -> Result<ObjectId> {
        let mesh = mesh::decode_mesh(bytes)?;
        Ok(self.insert(
            "Mesh",
            Shape::Mesh {
                mesh: Arc::new(mesh),
            },
            Transform::IDENTITY,
            Material::default(),
            true,
        ))
    }

    /// Remove an object. Absent ids are a no-op.
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let removed = self.objects.remove(&id);
        if removed.is_some() {
            debug!("removed {}", id);
        }
        removed
    }

    /// Apply a transform change. Returns false if the id is unknown or the
    /// update is malformed.
    pub fn set_transform(&mut self, id: ObjectId, update: TransformUpdate) -> bool {
        let Some(obj) = self.objects.get_mut(&id) else {
            warn!("set_transform: no object {}", id);
            return false;
        };
        match update.apply(&obj.transform) {
            Some(t) => {
                obj.transform = t;
                true
            }
            None => {
                warn!("set_transform: rejected {:?} for {}", update, id);
                false
            }
        }
    }

    /// Apply caller material properties.
    ///
    /// Unknown type codes are an error and leave the object unchanged.
    /// Unknown ids and non-editable objects are logged no-ops (`Ok(false)`).
    pub fn set_material(&mut self, id: ObjectId, props: &MaterialProperties) -> Result<bool> {
        let Some(obj) = self.objects.get_mut(&id) else {
            warn!("set_material: no object {}", id);
            return Ok(false);
        };
        if !obj.mat_is_editable {
            warn!("set_material: {} is not editable", id);
            return Ok(false);
        }
        obj.material = obj.material.apply(props).inspect_err(|e| {
            warn!("set_material: {} for {}", e, id);
        })?;
        Ok(true)
    }

    /// Current material as a caller record.
    pub fn material_properties(&self, id: ObjectId) -> Option<MaterialProperties> {
        self.objects
            .get(&id)
            .map(|o| MaterialProperties::from_material(&o.material, o.mat_is_editable))
    }

    /// Remove every object. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Replace contents with a preset. Mesh bytes are decoded first, so a
    /// malformed asset leaves the current scene intact.
    pub fn load_preset(&mut self, preset: ScenePreset, mesh_bytes: Option<&[u8]>) -> Result<()> {
        presets::load(self, preset, mesh_bytes)
    }

    /// Objects with a Light material.
    pub fn lights(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values().filter(|o| o.material.is_light())
    }

    pub(crate) fn restore(&mut self, objects: Vec<SceneObject>, next_id: u64) {
        self.objects = objects.into_iter().map(|o| (o.id, o)).collect();
        self.next_id = next_id;
    }
}
