//! Real-time software rasterizer over the live scene.
//!
//! Per frame:
//! 1. clear to the sky gradient
//! 2. one cube shadow map per point light (see [`super::shadow`])
//! 3. opaque triangles: near-plane clip, edge-function fill, depth test
//! 4. glass triangles sorted back to front and alpha blended (no depth write)
//!
//! Shading is flat per triangle: Lambert + Blinn-Phong from point lights
//! (one per Light object) plus a sky ambient term. Only the shadow lookup
//! runs per pixel. Light objects are drawn emissive.

use smallvec::SmallVec;
use tracing::trace;

use super::framebuffer::Framebuffer;
use super::shadow::ShadowCube;
use crate::scene::camera::NEAR_PLANE;
use crate::scene::{Material, ObjectId, Scene, Sky};
use crate::util::{Mat4, Vec3, Vec4};

/// Opacity of glass in the rasterized preview.
const GLASS_ALPHA: f32 = 0.35;
/// Tint applied to the selected object.
const SELECTION_TINT: Vec3 = Vec3::new(1.0, 0.6, 0.1);
const SELECTION_MIX: f32 = 0.35;

#[derive(Debug, Clone, Copy)]
struct PointLight {
    position: Vec3,
    color: Vec3,
    intensity: f32,
}

/// Projected vertex. `world_w` is the world position times `inv_w`, so it
/// interpolates linearly in screen space.
#[derive(Debug, Clone, Copy)]
pub(super) struct ScreenVertex {
    pub x: f32,
    pub y: f32,
    pub inv_w: f32,
    pub world_w: Vec3,
}

/// Flat shading terms of one triangle. The direct terms are masked per
/// pixel by the matching light's shadow map.
#[derive(Debug, Clone)]
struct FlatShade {
    base: Vec3,
    /// `(light index, contribution)` for lights facing the triangle.
    direct: SmallVec<[(usize, Vec3); 4]>,
    tint: bool,
}

impl FlatShade {
    /// Colour when no per-pixel lookup is needed.
    fn constant(&self, shadows: &[ShadowCube]) -> Option<Vec3> {
        if shadows.is_empty() || self.direct.is_empty() {
            Some(self.resolve(Vec3::ZERO, &[]))
        } else {
            None
        }
    }

    fn resolve(&self, p: Vec3, shadows: &[ShadowCube]) -> Vec3 {
        let mut c = self.base;
        for &(light, direct) in &self.direct {
            let lit = shadows.get(light).map_or(1.0, |s| s.visibility(p));
            c += direct * lit;
        }
        let c = c.min(Vec3::ONE);
        if self.tint {
            c.lerp(SELECTION_TINT, SELECTION_MIX)
        } else {
            c
        }
    }
}

/// Per-frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub objects: usize,
    pub triangles: usize,
    pub clipped: usize,
    pub shadow_maps: usize,
}

/// Forward software rasterizer.
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    /// Strength of the sky ambient term.
    pub ambient: f32,
    /// Occlude point lights through cube shadow maps.
    pub shadows: bool,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self {
            ambient: 0.15,
            shadows: true,
        }
    }
}

impl Rasterizer {
    pub fn new(ambient: f32) -> Self {
        Self {
            ambient: ambient.max(0.0),
            ..Self::default()
        }
    }

    pub fn with_shadows(mut self, shadows: bool) -> Self {
        self.shadows = shadows;
        self
    }

    /// Draw `scene` into `fb`, resizing it to the camera viewport.
    #[tracing::instrument(skip_all, fields(objects = scene.len()))]
    pub fn render(&self, scene: &Scene, selected: Option<ObjectId>, fb: &mut Framebuffer) -> FrameStats {
        let camera = &scene.camera;
        fb.resize(camera.width, camera.height);
        fb.clear_to_sky(camera, &scene.sky);

        let view_proj = camera.view_proj();
        let eye = camera.pos;
        let lights: Vec<PointLight> = scene
            .lights()
            .filter_map(|o| match o.material {
                Material::Light { color, brightness } => Some(PointLight {
                    position: o.transform.position,
                    color,
                    intensity: brightness,
                }),
                _ => None,
            })
            .collect();

        let mut stats = FrameStats::default();
        let mut items: Vec<([Vec3; 3], &Material, bool)> = Vec::new();
        for obj in scene.objects() {
            stats.objects += 1;
            let mesh = obj.shape.base_mesh(scene.library());
            let m = obj.world_matrix();
            let is_selected = selected == Some(obj.id);
            items.extend(mesh.world_triangles(&m).map(|tri| (tri, &obj.material, is_selected)));
        }
        stats.triangles = items.len();

        // Lights and glass let light through
        let shadows: Vec<ShadowCube> = if self.shadows && !lights.is_empty() {
            let occluders: Vec<[Vec3; 3]> = items
                .iter()
                .filter(|(_, mat, _)| !matches!(mat, Material::Light { .. } | Material::Glass { .. }))
                .map(|(tri, _, _)| *tri)
                .collect();
            lights.iter().map(|l| ShadowCube::build(l.position, &occluders)).collect()
        } else {
            Vec::new()
        };
        stats.shadow_maps = shadows.len();

        let mut transparent: Vec<(f32, [Vec3; 3], FlatShade)> = Vec::new();
        for (tri, material, is_selected) in items {
            let shade = shade(material, &tri, eye, &lights, &scene.sky, self.ambient, is_selected);
            if matches!(material, Material::Glass { .. }) {
                let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
                transparent.push((centroid.distance_squared(eye), tri, shade));
            } else if !draw_triangle(fb, &view_proj, &tri, &shade, &shadows, None) {
                stats.clipped += 1;
            }
        }

        // Farthest first
        transparent.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (_, tri, shade) in &transparent {
            if !draw_triangle(fb, &view_proj, tri, shade, &shadows, Some(GLASS_ALPHA)) {
                stats.clipped += 1;
            }
        }

        trace!(?stats, "raster frame");
        stats
    }
}

/// Shading terms for one world-space triangle.
fn shade(
    material: &Material,
    tri: &[Vec3; 3],
    eye: Vec3,
    lights: &[PointLight],
    sky: &Sky,
    ambient: f32,
    tint: bool,
) -> FlatShade {
    let mut out = FlatShade {
        base: Vec3::ZERO,
        direct: SmallVec::new(),
        tint,
    };
    if let Material::Light { color, brightness } = *material {
        out.base = (color * brightness).min(Vec3::ONE);
        return out;
    }

    let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
    let mut normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero();
    let to_eye = (eye - centroid).normalize_or_zero();
    // Two-sided: face the viewer
    if normal.dot(to_eye) < 0.0 {
        normal = -normal;
    }

    let albedo = material.color();
    let (kd, ks, shininess) = match *material {
        Material::Metal { roughness, .. } => (0.3, 0.8, 2.0 / (roughness * roughness + 0.01)),
        Material::Glass { .. } => (0.2, 1.0, 200.0),
        _ => (1.0, 0.04, 16.0),
    };

    out.base = albedo * sky.color(normal) * ambient;
    for (i, light) in lights.iter().enumerate() {
        let offset = light.position - centroid;
        let dist = offset.length().max(1.0);
        let l = offset / dist;
        let n_dot_l = normal.dot(l);
        if n_dot_l <= 0.0 {
            continue;
        }
        let radiance = light.color * (light.intensity / dist);
        let h = (l + to_eye).normalize_or_zero();
        let spec = normal.dot(h).max(0.0).powf(shininess);
        out.direct.push((i, radiance * (albedo * kd * n_dot_l + Vec3::splat(ks * spec))));
    }
    out
}

/// Project, clip and fill one triangle. Returns false if it was fully
/// behind the near plane.
fn draw_triangle(
    fb: &mut Framebuffer,
    view_proj: &Mat4,
    tri: &[Vec3; 3],
    shade: &FlatShade,
    shadows: &[ShadowCube],
    alpha: Option<f32>,
) -> bool {
    let (width, height) = (fb.width, fb.height);
    let Some(poly) = project(view_proj, tri, width, height) else {
        return false;
    };
    let flat = shade.constant(shadows);

    for i in 1..poly.len() - 1 {
        let v = [poly[0], poly[i], poly[i + 1]];
        scan(width, height, &v, |x, y, b, inv_w| {
            let idx = (y * width + x) as usize;
            if inv_w <= fb.depth[idx] {
                return;
            }
            let color = flat.unwrap_or_else(|| {
                let p = (v[0].world_w * b[0] + v[1].world_w * b[1] + v[2].world_w * b[2]) / inv_w;
                shade.resolve(p, shadows)
            });
            match alpha {
                None => {
                    fb.depth[idx] = inv_w;
                    fb.color[idx] = color;
                }
                Some(a) => fb.color[idx] = fb.color[idx].lerp(color, a),
            }
        });
    }
    true
}

/// Clip-space projection of `tri` onto a `width` x `height` target, as a
/// convex polygon. `None` when nothing is in front of the near plane.
pub(super) fn project(
    view_proj: &Mat4,
    tri: &[Vec3; 3],
    width: u32,
    height: u32,
) -> Option<SmallVec<[ScreenVertex; 4]>> {
    let clip = tri.map(|p| (*view_proj * p.extend(1.0), p));
    let poly = clip_near(&clip);
    if poly.len() < 3 {
        return None;
    }
    let (w, h) = (width as f32, height as f32);
    Some(
        poly.iter()
            .map(|(c, world)| {
                let inv_w = 1.0 / c.w;
                ScreenVertex {
                    x: (c.x * inv_w * 0.5 + 0.5) * w,
                    y: (0.5 - c.y * inv_w * 0.5) * h,
                    inv_w,
                    world_w: *world * inv_w,
                }
            })
            .collect(),
    )
}

/// Sutherland-Hodgman against `w >= NEAR_PLANE`, carrying world positions.
fn clip_near(tri: &[(Vec4, Vec3); 3]) -> SmallVec<[(Vec4, Vec3); 4]> {
    let mut out = SmallVec::new();
    for i in 0..3 {
        let (a, wa) = tri[i];
        let (b, wb) = tri[(i + 1) % 3];
        let da = a.w - NEAR_PLANE;
        let db = b.w - NEAR_PLANE;
        if da >= 0.0 {
            out.push((a, wa));
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push((a + (b - a) * t, wa + (wb - wa) * t));
        }
    }
    out
}

#[inline]
fn edge(a: ScreenVertex, b: ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Call `visit(x, y, barycentrics, inv_w)` for every pixel centre inside
/// the screen triangle `v`.
pub(super) fn scan(width: u32, height: u32, v: &[ScreenVertex; 3], mut visit: impl FnMut(u32, u32, [f32; 3], f32)) {
    let [v0, v1, v2] = *v;
    let area = edge(v0, v1, v2.x, v2.y);
    if !area.is_finite() || area.abs() < 1e-9 {
        return;
    }
    let inv_area = 1.0 / area;

    let min_x = v0.x.min(v1.x).min(v2.x).floor().max(0.0) as i64;
    let max_x = v0.x.max(v1.x).max(v2.x).ceil().min(width as f32 - 1.0) as i64;
    let min_y = v0.y.min(v1.y).min(v2.y).floor().max(0.0) as i64;
    let max_y = v0.y.max(v1.y).max(v2.y).ceil().min(height as f32 - 1.0) as i64;

    for y in min_y..=max_y {
        let py = y as f32 + 0.5;
        for x in min_x..=max_x {
            let px = x as f32 + 0.5;
            let b0 = edge(v1, v2, px, py) * inv_area;
            let b1 = edge(v2, v0, px, py) * inv_area;
            let b2 = edge(v0, v1, px, py) * inv_area;
            if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                continue;
            }
            let inv_w = b0 * v0.inv_w + b1 * v1.inv_w + b2 * v2.inv_w;
            visit(x as u32, y as u32, [b0, b1, b2], inv_w);
        }
    }
}
