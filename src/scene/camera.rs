//! First-person camera shared by the rasterizer and the path tracer.
//!
//! Y-up, right-handed. `yaw = 0, pitch = 0` looks down `-Z`.

use serde::{Deserialize, Serialize};

use crate::util::{Mat4, Ray, Vec2, Vec3};

pub const MIN_FOV: f32 = 10.0 * std::f32::consts::PI / 180.0;
pub const MAX_FOV: f32 = 140.0 * std::f32::consts::PI / 180.0;
pub const MAX_DEFOCUS_ANGLE: f32 = 0.05;
/// UI depth-of-field strength range is [0, 100].
pub const MAX_DOF_STRENGTH: f32 = 100.0;

const MIN_FOCAL_DISTANCE: f32 = 1e-3;
const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

pub const NEAR_PLANE: f32 = 0.05;
pub const FAR_PLANE: f32 = 2000.0;

/// Map a UI DOF strength in [0,100] to a defocus angle in radians.
pub fn dof_strength_to_angle(strength: f32) -> f32 {
    let s = if strength.is_finite() { strength } else { 0.0 };
    s.clamp(0.0, MAX_DOF_STRENGTH) * (MAX_DEFOCUS_ANGLE / MAX_DOF_STRENGTH)
}

/// Inverse of [`dof_strength_to_angle`].
pub fn defocus_angle_to_strength(angle: f32) -> f32 {
    angle.clamp(0.0, MAX_DEFOCUS_ANGLE) * (MAX_DOF_STRENGTH / MAX_DEFOCUS_ANGLE)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub pos: Vec3,
    /// Radians, rotation about +Y.
    pub yaw: f32,
    /// Radians, clamped to +-89 degrees.
    pub pitch: f32,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub focal_distance: f32,
    /// Aperture cone angle in radians.
    pub defocus_angle: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pos: Vec3::new(0.0, 1.0, 5.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: 60f32.to_radians(),
            focal_distance: 5.0,
            defocus_angle: 0.0,
            width: 640,
            height: 360,
        }
    }
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            ..Default::default()
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    pub fn right(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        Vec3::new(cy, 0.0, -sy)
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    /// Orient toward `target`. No-op if the target coincides with `pos`.
    pub fn look_at(&mut self, target: Vec3) {
        let d = target - self.pos;
        if d.length_squared() < 1e-12 {
            return;
        }
        let d = d.normalize();
        self.pitch = d.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.yaw = (-d.x).atan2(-d.z);
    }

    /// Apply a yaw/pitch delta (radians).
    pub fn rotate(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw = (self.yaw + d_yaw).rem_euclid(std::f32::consts::TAU);
        self.pitch = (self.pitch + d_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn set_fov(&mut self, fov: f32) {
        if fov.is_finite() {
            self.fov = fov.clamp(MIN_FOV, MAX_FOV);
        }
    }

    pub fn set_focal_distance(&mut self, d: f32) {
        if d.is_finite() {
            self.focal_distance = d.max(MIN_FOCAL_DISTANCE);
        }
    }

    pub fn set_defocus_angle(&mut self, angle: f32) {
        if angle.is_finite() {
            self.defocus_angle = angle.clamp(0.0, MAX_DEFOCUS_ANGLE);
        }
    }

    /// Copy with every field back in its valid range. Non-finite values
    /// fall back to the defaults.
    pub fn sanitized(&self) -> Self {
        let d = Camera::default();
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        let mut c = Camera {
            pos: if self.pos.is_finite() { self.pos } else { d.pos },
            yaw: finite_or(self.yaw, d.yaw),
            pitch: finite_or(self.pitch, d.pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT),
            ..d
        };
        c.set_fov(self.fov);
        c.set_focal_distance(self.focal_distance);
        c.set_defocus_angle(self.defocus_angle);
        c.resize(self.width, self.height);
        c
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    /// Point `distance` units straight ahead.
    pub fn point_ahead(&self, distance: f32) -> Vec3 {
        self.pos + self.forward() * distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.pos, self.forward(), Vec3::Y)
    }

    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect(), NEAR_PLANE, FAR_PLANE)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }

    /// Pinhole ray through pixel coordinates (`px` right, `py` down).
    pub fn ray_through(&self, px: f32, py: f32) -> Ray {
        let (dir, _, _) = self.pixel_frame(px, py);
        Ray::new(self.pos, dir)
    }

    /// Thin-lens ray. `lens` is a point in the unit disk.
    pub fn lens_ray(&self, px: f32, py: f32, lens: Vec2) -> Ray {
        let (dir, right, up) = self.pixel_frame(px, py);
        if self.defocus_angle <= 0.0 {
            return Ray::new(self.pos, dir);
        }
        let fwd = self.forward();
        // Distance along the ray to the focal plane
        let t = self.focal_distance / dir.dot(fwd).max(1e-4);
        let focus = self.pos + dir * t;
        let radius = self.focal_distance * (self.defocus_angle * 0.5).tan();
        let origin = self.pos + (right * lens.x + up * lens.y) * radius;
        Ray::new(origin, focus - origin)
    }

    fn pixel_frame(&self, px: f32, py: f32) -> (Vec3, Vec3, Vec3) {
        let fwd = self.forward();
        let right = self.right();
        let up = right.cross(fwd);
        let h = (self.fov * 0.5).tan();
        let w = h * self.aspect();
        let ndc_x = (px / self.width.max(1) as f32) * 2.0 - 1.0;
        let ndc_y = 1.0 - (py / self.height.max(1) as f32) * 2.0;
        let dir = (fwd + right * (ndc_x * w) + up * (ndc_y * h)).normalize();
        (dir, right, up)
    }
}
