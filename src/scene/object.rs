//! Scene objects: shape, transform, material.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::material::Material;
use super::mesh::{MeshLibrary, TriangleMesh};
use crate::util::{Aabb, Error, EulerRot, Mat4, Quat, Result, Vec3};

/// Stable object identifier. Never reused within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters of an analytic primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Primitive {
    Sphere { radius: f32 },
    Box { x: f32, y: f32, z: f32 },
    /// Flat rectangle in the local XZ plane, facing +Y.
    Quad { width: f32, height: f32 },
}

impl Primitive {
    /// Reject non-positive or non-finite dimensions.
    pub fn validate(&self) -> Result<()> {
        let ok = |d: f32| d.is_finite() && d > 0.0;
        let valid = match *self {
            Primitive::Sphere { radius } => ok(radius),
            Primitive::Box { x, y, z } => ok(x) && ok(y) && ok(z),
            Primitive::Quad { width, height } => ok(width) && ok(height),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidPrimitive(format!("{:?}", self)))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Sphere { .. } => "Sphere",
            Primitive::Box { .. } => "Box",
            Primitive::Quad { .. } => "Quad",
        }
    }
}

/// Geometry of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Primitive(Primitive),
    Mesh { mesh: Arc<TriangleMesh> },
}

impl Shape {
    /// Scale from the unit tessellation to this shape's local size.
    pub fn local_scale(&self) -> Vec3 {
        match self {
            Shape::Primitive(Primitive::Sphere { radius }) => Vec3::splat(*radius),
            Shape::Primitive(Primitive::Box { x, y, z }) => Vec3::new(*x, *y, *z),
            Shape::Primitive(Primitive::Quad { width, height }) => Vec3::new(*width, 1.0, *height),
            Shape::Mesh { .. } => Vec3::ONE,
        }
    }

    /// Unit-size tessellation for this shape.
    pub fn base_mesh(&self, library: &MeshLibrary) -> Arc<TriangleMesh> {
        match self {
            Shape::Primitive(Primitive::Sphere { .. }) => library.sphere.clone(),
            Shape::Primitive(Primitive::Box { .. }) => library.cube.clone(),
            Shape::Primitive(Primitive::Quad { .. }) => library.quad.clone(),
            Shape::Mesh { mesh } => mesh.clone(),
        }
    }
}

/// Position, Euler rotation (radians, XYZ order) and per-axis scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.position)
    }

    /// Uniform scale factor, if all axes agree.
    pub fn uniform_scale(&self) -> Option<f32> {
        let s = self.scale;
        let eps = 1e-5 * s.abs().max_element().max(1.0);
        ((s.x - s.y).abs() <= eps && (s.y - s.z).abs() <= eps).then_some(s.x.abs())
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

/// Relative or absolute transform change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformUpdate {
    Set(Transform),
    Translate(Vec3),
    /// Radians added to each Euler angle.
    Rotate(Vec3),
    /// Multiply the scale; must be finite and positive.
    Scale(f32),
    MoveTo(Vec3),
}

impl TransformUpdate {
    /// Apply to `t`, returning `None` when the update is malformed.
    pub fn apply(self, t: &Transform) -> Option<Transform> {
        let next = match self {
            TransformUpdate::Set(n) => n,
            TransformUpdate::Translate(d) => Transform {
                position: t.position + d,
                ..*t
            },
            TransformUpdate::Rotate(d) => Transform {
                rotation: t.rotation + d,
                ..*t
            },
            TransformUpdate::Scale(f) => {
                if !(f.is_finite() && f > 0.0) {
                    return None;
                }
                Transform {
                    scale: t.scale * f,
                    ..*t
                }
            }
            TransformUpdate::MoveTo(p) => Transform { position: p, ..*t },
        };
        next.is_finite().then_some(next)
    }
}

/// An entry in the scene store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub shape: Shape,
    pub transform: Transform,
    pub material: Material,
    pub mat_is_editable: bool,
}

impl SceneObject {
    /// Local-to-world matrix including the shape's unit-mesh scale.
    pub fn world_matrix(&self) -> Mat4 {
        self.transform.matrix() * Mat4::from_scale(self.shape.local_scale())
    }

    /// World-space sphere `(center, radius)` when the object is an
    /// undistorted sphere.
    pub fn analytic_sphere(&self) -> Option<(Vec3, f32)> {
        match self.shape {
            Shape::Primitive(Primitive::Sphere { radius }) => self
                .transform
                .uniform_scale()
                .map(|s| (self.transform.position, radius * s)),
            _ => None,
        }
    }

    /// World-space bounds.
    pub fn bounds(&self, library: &MeshLibrary) -> Aabb {
        if let Some((c, r)) = self.analytic_sphere() {
            return Aabb::new(c - Vec3::splat(r), c + Vec3::splat(r));
        }
        let mesh = self.shape.base_mesh(library);
        let m = self.world_matrix();
        let mut b = Aabb::EMPTY;
        for p in &mesh.positions {
            b.grow_point(m.transform_point3(*p));
        }
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_validate() {
        assert!(Primitive::Sphere { radius: 1.0 }.validate().is_ok());
        assert!(Primitive::Sphere { radius: 0.0 }.validate().is_err());
        assert!(Primitive::Box { x: 1.0, y: -1.0, z: 1.0 }.validate().is_err());
        assert!(Primitive::Quad { width: f32::NAN, height: 1.0 }.validate().is_err());
    }

    #[test]
    fn test_transform_updates() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let moved = TransformUpdate::Translate(Vec3::X).apply(&t).unwrap();
        assert_eq!(moved.position, Vec3::new(2.0, 2.0, 3.0));

        let scaled = TransformUpdate::Scale(2.0).apply(&t).unwrap();
        assert_eq!(scaled.scale, Vec3::splat(2.0));
        assert!(TransformUpdate::Scale(0.0).apply(&t).is_none());
        assert!(TransformUpdate::Scale(-1.0).apply(&t).is_none());
        assert!(TransformUpdate::Translate(Vec3::splat(f32::NAN))
            .apply(&t)
            .is_none());
    }

    #[test]
    fn test_world_matrix_includes_shape_size() {
        let obj = SceneObject {
            id: ObjectId(1),
            name: "box".into(),
            shape: Shape::Primitive(Primitive::Box { x: 2.0, y: 4.0, z: 6.0 }),
            transform: Transform::from_position(Vec3::new(0.0, 10.0, 0.0)),
            material: Material::default(),
            mat_is_editable: true,
        };
        let b = obj.bounds(&MeshLibrary::new(0));
        assert!((b.min - Vec3::new(-1.0, 8.0, -3.0)).length() < 1e-5);
        assert!((b.max - Vec3::new(1.0, 12.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_analytic_sphere_requires_uniform_scale() {
        let mut obj = SceneObject {
            id: ObjectId(1),
            name: "ball".into(),
            shape: Shape::Primitive(Primitive::Sphere { radius: 0.5 }),
            transform: Transform::IDENTITY.with_scale(Vec3::splat(4.0)),
            material: Material::default(),
            mat_is_editable: true,
        };
        assert_eq!(obj.analytic_sphere(), Some((Vec3::ZERO, 2.0)));
        obj.transform.scale = Vec3::new(1.0, 2.0, 1.0);
        assert_eq!(obj.analytic_sphere(), None);
    }
}
