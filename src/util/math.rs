//! Math type re-exports and small rendering helpers.
//!
//! This module re-exports the `glam` types used across the engine and
//! provides the shared bounding box, ray and colour conversion helpers.

// Re-export glam types
pub use glam::{Affine3A, EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec3A, Vec4};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Display gamma applied when converting linear colour to 8-bit.
pub const DISPLAY_GAMMA: f32 = 2.2;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a point.
    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to include another box.
    #[inline]
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Surface area (for SAH cost). Zero for empty boxes.
    #[inline]
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Slab test. Returns the entry distance when the ray overlaps the box
    /// within `[t_min, t_max]`.
    ///
    /// An axis where the ray is parallel and starts exactly on a slab plane
    /// gives `0 * inf = NaN`; that axis places no bound on `t`.
    #[inline]
    pub fn hit(&self, origin: Vec3, inv_dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let on_plane = t0.is_nan_mask() | t1.is_nan_mask();
        let lo = Vec3::select(on_plane, Vec3::NEG_INFINITY, t0.min(t1));
        let hi = Vec3::select(on_plane, Vec3::INFINITY, t0.max(t1));
        let near = lo.max_element().max(t_min);
        let far = hi.min_element().min(t_max);
        (near <= far).then_some(near)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb({:?} - {:?})", self.min, self.max)
    }
}

/// Ray with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    #[inline]
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir: dir.normalize_or_zero(),
        }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Nearest ray-sphere hit distance in `(t_min, t_max)`.
#[inline]
pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32, t_min: f32, t_max: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let half_b = oc.dot(ray.dir);
    let c = oc.length_squared() - radius * radius;
    let disc = half_b * half_b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let mut t = -half_b - sq;
    if t <= t_min || t >= t_max {
        t = -half_b + sq;
        if t <= t_min || t >= t_max {
            return None;
        }
    }
    Some(t)
}

/// Moller-Trumbore ray-triangle test, two-sided. Returns `(t, u, v)`.
#[inline]
pub fn ray_triangle(ray: &Ray, v: &[Vec3; 3], t_min: f32, t_max: f32) -> Option<(f32, f32, f32)> {
    let e1 = v[1] - v[0];
    let e2 = v[2] - v[0];
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let s = ray.origin - v[0];
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let w = ray.dir.dot(q) * inv;
    if w < 0.0 || u + w > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t > t_min && t < t_max).then_some((t, u, w))
}

/// Linear colour to display-encoded 8-bit RGBA (opaque).
#[inline]
pub fn linear_to_rgba8(c: Vec3) -> [u8; 4] {
    let enc = |v: f32| {
        let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        (v.powf(1.0 / DISPLAY_GAMMA) * 255.0 + 0.5) as u8
    };
    [enc(c.x), enc(c.y), enc(c.z), 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_hit_parallel_ray_on_slab_plane() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        for (origin, dir) in [
            (Vec3::new(0.0, 0.5, -1.0), Vec3::Z),
            (Vec3::new(1.0, 0.5, -1.0), Vec3::new(-0.0, 0.0, 1.0)),
            (Vec3::new(0.5, 1.0, -1.0), Vec3::new(0.0, -0.0, 1.0)),
        ] {
            let t = b.hit(origin, dir.recip(), 0.0, f32::INFINITY);
            assert_eq!(t, Some(1.0), "origin {:?}", origin);
        }

        // Parallel but outside the slab still misses
        let outside = Vec3::new(1.5, 0.5, -1.0);
        assert_eq!(b.hit(outside, Vec3::Z.recip(), 0.0, f32::INFINITY), None);
        // Behind the ray
        assert_eq!(b.hit(Vec3::new(0.0, 0.5, 3.0), Vec3::Z.recip(), 0.0, f32::INFINITY), None);
    }

    #[test]
    fn test_aabb_grow() {
        let mut b = Aabb::EMPTY;
        assert!(b.is_empty());
        assert_eq!(b.area(), 0.0);

        b.grow_point(Vec3::new(-1.0, 0.0, 0.0));
        b.grow_point(Vec3::new(1.0, 2.0, 4.0));
        assert!(!b.is_empty());
        assert_eq!(b.center(), Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(b.area(), 2.0 * (2.0 * 2.0 + 2.0 * 4.0 + 4.0 * 2.0));
    }

    #[test]
    fn test_aabb_hit() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let origin = Vec3::new(0.0, 0.0, -5.0);
        let inv = Vec3::new(0.0, 0.0, 1.0).recip();
        let t = b.hit(origin, inv, 0.0, f32::INFINITY).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert!(b.hit(origin, inv, 0.0, 3.0).is_none());

        let inv_up = Vec3::new(0.0, 1.0, 0.0).recip();
        assert!(b.hit(origin, inv_up, 0.0, f32::INFINITY).is_none());
    }

    #[test]
    fn test_ray_sphere() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let t = ray_sphere(&ray, Vec3::ZERO, 1.0, 1e-3, f32::INFINITY).unwrap();
        assert!((t - 4.0).abs() < 1e-5);

        // From inside, the far wall is hit
        let inside = Ray::new(Vec3::ZERO, Vec3::Z);
        let t = ray_sphere(&inside, Vec3::ZERO, 1.0, 1e-3, f32::INFINITY).unwrap();
        assert!((t - 1.0).abs() < 1e-5);

        let miss = Ray::new(Vec3::new(0.0, 2.0, -5.0), Vec3::Z);
        assert!(ray_sphere(&miss, Vec3::ZERO, 1.0, 1e-3, f32::INFINITY).is_none());
    }

    #[test]
    fn test_ray_triangle() {
        let tri = [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let ray = Ray::new(Vec3::new(0.0, 0.0, -3.0), Vec3::Z);
        let (t, _, _) = ray_triangle(&ray, &tri, 1e-4, f32::INFINITY).unwrap();
        assert!((t - 3.0).abs() < 1e-5);

        // Back side is hit too
        let back = Ray::new(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z);
        assert!(ray_triangle(&back, &tri, 1e-4, f32::INFINITY).is_some());

        let miss = Ray::new(Vec3::new(2.0, 0.0, -3.0), Vec3::Z);
        assert!(ray_triangle(&miss, &tri, 1e-4, f32::INFINITY).is_none());
    }

    #[test]
    fn test_rgba8() {
        assert_eq!(linear_to_rgba8(Vec3::ZERO), [0, 0, 0, 255]);
        assert_eq!(linear_to_rgba8(Vec3::ONE), [255, 255, 255, 255]);
        assert_eq!(linear_to_rgba8(Vec3::new(f32::NAN, 2.0, -1.0)), [0, 255, 0, 255]);
    }

    #[test]
    fn test_aabb_pod() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let bytes: &[u8] = bytemuck::bytes_of(&b);
        assert_eq!(bytes.len(), 24);
    }
}
