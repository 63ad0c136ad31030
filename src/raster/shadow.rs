//! Omnidirectional shadow maps for the rasterizer's point lights.
//!
//! Each light renders the occluding triangles into six 90 degree faces
//! around its position, keeping the nearest `1/w` per texel like the main
//! depth buffer. Lookups pick the face by the major axis of `p - light` and
//! filter a 3x3 texel neighbourhood.

use std::f32::consts::FRAC_PI_2;

use super::renderer::{project, scan};
use crate::scene::camera::{FAR_PLANE, NEAR_PLANE};
use crate::util::{Mat4, Vec3};

/// Texels per face edge.
pub const SHADOW_MAP_SIZE: u32 = 128;
/// Depth slack against self-shadowing, as a floor plus a share of depth.
const BIAS_MIN: f32 = 0.05;
const BIAS_SLOPE: f32 = 0.05;
const PCF_RADIUS: i64 = 1;

/// `(forward, up)` per face, in `+X -X +Y -Y +Z -Z` order.
const FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Depth cube around one point light.
#[derive(Debug, Clone)]
pub struct ShadowCube {
    center: Vec3,
    view_proj: [Mat4; 6],
    /// Nearest `1/w` per texel, face after face; 0 = nothing drawn.
    depth: Vec<f32>,
}

impl ShadowCube {
    /// Render `occluders` as seen from `center`.
    pub fn build(center: Vec3, occluders: &[[Vec3; 3]]) -> Self {
        let size = SHADOW_MAP_SIZE;
        let proj = Mat4::perspective_rh(FRAC_PI_2, 1.0, NEAR_PLANE, FAR_PLANE);
        let view_proj = FACES.map(|(forward, up)| proj * Mat4::look_to_rh(center, forward, up));
        let mut depth = vec![0.0f32; 6 * (size * size) as usize];

        for (face, vp) in view_proj.iter().enumerate() {
            let plane = &mut depth[face * (size * size) as usize..(face + 1) * (size * size) as usize];
            for tri in occluders {
                let Some(poly) = project(vp, tri, size, size) else {
                    continue;
                };
                for i in 1..poly.len() - 1 {
                    scan(size, size, &[poly[0], poly[i], poly[i + 1]], |x, y, _, inv_w| {
                        let texel = &mut plane[(y * size + x) as usize];
                        if inv_w > *texel {
                            *texel = inv_w;
                        }
                    });
                }
            }
        }

        Self {
            center,
            view_proj,
            depth,
        }
    }

    /// Fraction of the filter footprint around `p` that sees the light,
    /// in `[0, 1]`.
    pub fn visibility(&self, p: Vec3) -> f32 {
        let d = p - self.center;
        let a = d.abs();
        if !d.is_finite() || a.max_element() <= 0.0 {
            return 1.0;
        }
        let face = if a.x >= a.y && a.x >= a.z {
            usize::from(d.x < 0.0)
        } else if a.y >= a.z {
            2 + usize::from(d.y < 0.0)
        } else {
            4 + usize::from(d.z < 0.0)
        };

        let c = self.view_proj[face] * p.extend(1.0);
        if c.w <= NEAR_PLANE {
            return 1.0;
        }
        let size = SHADOW_MAP_SIZE as f32;
        let tx = ((c.x / c.w * 0.5 + 0.5) * size).floor() as i64;
        let ty = ((0.5 - c.y / c.w * 0.5) * size).floor() as i64;
        let bias = BIAS_MIN + BIAS_SLOPE * c.w;
        let plane = &self.depth[face * (SHADOW_MAP_SIZE * SHADOW_MAP_SIZE) as usize..];

        let (mut lit, mut taps) = (0u32, 0u32);
        for y in ty - PCF_RADIUS..=ty + PCF_RADIUS {
            for x in tx - PCF_RADIUS..=tx + PCF_RADIUS {
                if x < 0 || y < 0 || x >= SHADOW_MAP_SIZE as i64 || y >= SHADOW_MAP_SIZE as i64 {
                    continue;
                }
                let stored = plane[(y * SHADOW_MAP_SIZE as i64 + x) as usize];
                taps += 1;
                if stored <= 0.0 || 1.0 / stored + bias >= c.w {
                    lit += 1;
                }
            }
        }
        if taps == 0 {
            1.0
        } else {
            lit as f32 / taps as f32
        }
    }
}
