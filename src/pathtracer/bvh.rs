//! BVH node and primitive types for CPU path tracing.
//!
//! Flat array layout:
//! - 32-byte nodes, index 0 = root
//! - primitives referenced through a reordered index list

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;

use crate::util::{ray_sphere, ray_triangle, Aabb, Ray, Vec2, Vec3};

/// Flat BVH node (32 bytes).
///
/// Internal node: left_or_first = left child index, count = 0
/// Leaf node: left_or_first = first entry in the index list, count > 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb_min: [f32; 3],
    pub left_or_first: u32,
    pub aabb_max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    pub(crate) fn leaf(bounds: &Aabb, first: usize, count: usize) -> Self {
        Self {
            aabb_min: bounds.min.to_array(),
            left_or_first: first as u32,
            aabb_max: bounds.max.to_array(),
            count: count as u32,
        }
    }

    pub(crate) fn internal(bounds: &Aabb, left: usize) -> Self {
        Self {
            aabb_min: bounds.min.to_array(),
            left_or_first: left as u32,
            aabb_max: bounds.max.to_array(),
            count: 0,
        }
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::from(self.aabb_min), Vec3::from(self.aabb_max))
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Geometry the path tracer intersects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { center: Vec3, radius: f32 },
    /// World-space corners; `normal` is the outward (winding) normal.
    Triangle { v: [Vec3; 3], normal: Vec3 },
}

/// A primitive tagged with the index of its material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub shape: Shape,
    pub material: u32,
}

/// Ray/primitive intersection.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub point: Vec3,
    /// Unit normal facing against the incoming ray.
    pub normal: Vec3,
    /// True when the ray arrived from the outside.
    pub front_face: bool,
    pub material: u32,
    /// Index of the primitive hit; only set by [`Bvh::intersect`].
    pub prim: u32,
}

impl Primitive {
    pub fn sphere(center: Vec3, radius: f32, material: u32) -> Self {
        Self {
            shape: Shape::Sphere { center, radius },
            material,
        }
    }

    /// Returns `None` for degenerate (zero-area) triangles.
    pub fn triangle(v: [Vec3; 3], material: u32) -> Option<Self> {
        let n = (v[1] - v[0]).cross(v[2] - v[0]);
        let len = n.length();
        if !(len > 1e-12 && len.is_finite()) {
            return None;
        }
        Some(Self {
            shape: Shape::Triangle { v, normal: n / len },
            material,
        })
    }

    pub fn aabb(&self) -> Aabb {
        match self.shape {
            Shape::Sphere { center, radius } => {
                Aabb::new(center - Vec3::splat(radius), center + Vec3::splat(radius))
            }
            Shape::Triangle { v, .. } => {
                let mut b = Aabb::from_point(v[0]);
                b.grow_point(v[1]);
                b.grow_point(v[2]);
                b
            }
        }
    }

    pub fn centroid(&self) -> Vec3 {
        match self.shape {
            Shape::Sphere { center, .. } => center,
            Shape::Triangle { v, .. } => (v[0] + v[1] + v[2]) / 3.0,
        }
    }

    #[inline]
    pub fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        let (t, outward) = match self.shape {
            Shape::Sphere { center, radius } => {
                let t = ray_sphere(ray, center, radius, t_min, t_max)?;
                (t, (ray.at(t) - center) / radius)
            }
            Shape::Triangle { ref v, normal } => {
                let (t, _, _) = ray_triangle(ray, v, t_min, t_max)?;
                (t, normal)
            }
        };
        let front_face = ray.dir.dot(outward) < 0.0;
        Some(Hit {
            t,
            point: ray.at(t),
            normal: if front_face { outward } else { -outward },
            front_face,
            material: self.material,
            prim: 0,
        })
    }

    pub fn area(&self) -> f32 {
        match self.shape {
            Shape::Sphere { radius, .. } => 4.0 * std::f32::consts::PI * radius * radius,
            Shape::Triangle { v, .. } => 0.5 * (v[1] - v[0]).cross(v[2] - v[0]).length(),
        }
    }

    /// Point spread uniformly over the surface for `u` in `[0,1)^2`, with
    /// its outward normal.
    pub fn sample_surface(&self, u: Vec2) -> (Vec3, Vec3) {
        match self.shape {
            Shape::Sphere { center, radius } => {
                let z = 1.0 - 2.0 * u.x;
                let r = (1.0 - z * z).max(0.0).sqrt();
                let (s, c) = (std::f32::consts::TAU * u.y).sin_cos();
                let n = Vec3::new(r * c, r * s, z);
                (center + radius * n, n)
            }
            Shape::Triangle { v, normal } => {
                let su = u.x.sqrt();
                let (b0, b1) = (1.0 - su, u.y * su);
                (b0 * v[0] + b1 * v[1] + (1.0 - b0 - b1) * v[2], normal)
            }
        }
    }
}

/// Built BVH over a primitive list.
pub struct Bvh {
    /// Flat node array (index 0 = root).
    pub nodes: Vec<BvhNode>,
    /// Reordered primitive indices (leaves reference into this).
    pub prim_indices: Vec<usize>,
}

impl Bvh {
    /// Closest hit in `(t_min, t_max)`.
    pub fn intersect(&self, prims: &[Primitive], ray: &Ray, t_min: f32, mut t_max: f32) -> Option<Hit> {
        if self.prim_indices.is_empty() {
            return None;
        }
        let inv_dir = ray.dir.recip();
        let mut best = None;
        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(0);

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.bounds().hit(ray.origin, inv_dir, t_min, t_max).is_none() {
                continue;
            }
            if node.is_leaf() {
                let first = node.left_or_first as usize;
                for &pi in &self.prim_indices[first..first + node.count as usize] {
                    if let Some(hit) = prims[pi].intersect(ray, t_min, t_max) {
                        t_max = hit.t;
                        best = Some(Hit { prim: pi as u32, ..hit });
                    }
                }
            } else {
                let left = node.left_or_first as usize;
                stack.push(left + 1);
                stack.push(left);
            }
        }
        best
    }
}
