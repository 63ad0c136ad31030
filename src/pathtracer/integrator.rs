//! Iterative path integrator over a [`SceneSnapshot`].
//!
//! Scattering per material:
//! - Diffuse: cosine-weighted hemisphere
//! - Metal: mirror reflection fuzzed by roughness
//! - Glass: Schlick-weighted reflect/refract
//! - Light: emits `color * brightness` (both faces) and ends the path
//!
//! Diffuse vertices also sample the scene's lights directly with a shadow
//! ray. The light sample and the BSDF bounce that happens to reach a light
//! are combined with the power heuristic, so neither counts twice.

use std::f32::consts::PI;

use rand::Rng;

use super::bvh::Hit;
use super::snapshot::SceneSnapshot;
use crate::scene::Material;
use crate::util::{Ray, Vec2, Vec3};

/// Offset along the ray to avoid self-intersection.
const RAY_EPSILON: f32 = 1e-3;

/// Bounces before Russian roulette starts.
const RR_START_DEPTH: u32 = 3;

/// Per-path settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceOptions {
    pub max_depth: u32,
    /// Sample lights with shadow rays at diffuse vertices.
    pub direct_light: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_depth: 12,
            direct_light: true,
        }
    }
}

/// Radiance along `ray`.
pub fn trace<R: Rng + ?Sized>(scene: &SceneSnapshot, ray: Ray, opts: TraceOptions, rng: &mut R) -> Vec3 {
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;
    let mut ray = ray;
    let sample_lights = opts.direct_light && !scene.lights.is_empty();
    // Cosine pdf of the diffuse bounce that produced `ray`. `None` after the
    // camera or a specular bounce, where emission counts in full.
    let mut bounce_pdf: Option<f32> = None;

    for depth in 0..opts.max_depth {
        let Some(hit) = scene.intersect(&ray, RAY_EPSILON, f32::INFINITY) else {
            radiance += throughput * scene.sky.color(ray.dir);
            break;
        };

        let material = scene.material(hit.material);
        if material.is_light() {
            let weight = match bounce_pdf {
                Some(pdf) if sample_lights => {
                    let cos_light = ray.dir.dot(hit.normal).abs();
                    power_heuristic(pdf, solid_angle_pdf(scene, hit.prim, hit.t * hit.t, cos_light))
                }
                _ => 1.0,
            };
            radiance += throughput * material.emission() * weight;
            break;
        }

        if sample_lights {
            if let Material::Diffuse { color } = *material {
                radiance += throughput * sample_direct(scene, &hit, color, rng);
            }
        }

        let Some((attenuation, dir)) = scatter(material, &ray, &hit, rng) else {
            break;
        };
        throughput *= attenuation;

        if depth >= RR_START_DEPTH {
            let p = throughput.max_element().clamp(0.05, 0.95);
            if rng.random::<f32>() > p {
                break;
            }
            throughput /= p;
        }

        ray = Ray::new(hit.point, dir);
        bounce_pdf = match material {
            Material::Diffuse { .. } => Some(ray.dir.dot(hit.normal).max(0.0) / PI),
            _ => None,
        };
    }

    radiance
}

/// Light reaching a diffuse `hit` from one sampled point on one light,
/// already weighted against the BSDF strategy.
fn sample_direct<R: Rng + ?Sized>(scene: &SceneSnapshot, hit: &Hit, albedo: Vec3, rng: &mut R) -> Vec3 {
    let light = scene.lights[rng.random_range(0..scene.lights.len())];
    let prim = &scene.primitives[light as usize];
    let (point, light_normal) = prim.sample_surface(Vec2::new(rng.random(), rng.random()));

    let to_light = point - hit.point;
    let dist2 = to_light.length_squared();
    if dist2 < RAY_EPSILON * RAY_EPSILON {
        return Vec3::ZERO;
    }
    let dist = dist2.sqrt();
    let wi = to_light / dist;
    let cos_surface = wi.dot(hit.normal);
    let cos_light = wi.dot(light_normal).abs();
    if cos_surface <= 0.0 || cos_light <= 1e-6 {
        return Vec3::ZERO;
    }

    let shadow = Ray::new(hit.point, wi);
    if scene.intersect(&shadow, RAY_EPSILON, dist - RAY_EPSILON).is_some() {
        return Vec3::ZERO;
    }

    let light_pdf = solid_angle_pdf(scene, light, dist2, cos_light);
    if light_pdf <= 0.0 {
        return Vec3::ZERO;
    }
    let weight = power_heuristic(light_pdf, cos_surface / PI);
    let emission = scene.material(prim.material).emission();
    albedo / PI * emission * (cos_surface * weight / light_pdf)
}

/// Light-sampling density of a point on `prim`, per unit solid angle seen
/// from `dist2` away at `cos_light` to the light's surface.
fn solid_angle_pdf(scene: &SceneSnapshot, prim: u32, dist2: f32, cos_light: f32) -> f32 {
    if cos_light <= 1e-6 {
        return 0.0;
    }
    scene.light_area_pdf(prim) * dist2 / cos_light
}

#[inline]
fn power_heuristic(pdf: f32, other: f32) -> f32 {
    let (a, b) = (pdf * pdf, other * other);
    if a + b > 0.0 && (a + b).is_finite() {
        a / (a + b)
    } else {
        0.0
    }
}

/// One jittered, depth-of-field sample for pixel `(px, py)`.
///
/// Non-finite results are rejected and contribute black.
pub fn sample_pixel<R: Rng + ?Sized>(
    scene: &SceneSnapshot,
    px: u32,
    py: u32,
    opts: TraceOptions,
    rng: &mut R,
) -> Vec3 {
    let x = px as f32 + rng.random::<f32>();
    let y = py as f32 + rng.random::<f32>();
    let lens = random_in_unit_disk(rng);
    let ray = scene.camera.lens_ray(x, y, lens);
    let c = trace(scene, ray, opts, rng);
    if c.is_finite() {
        c
    } else {
        Vec3::ZERO
    }
}

/// Attenuation and new direction, or `None` when the path ends here.
fn scatter<R: Rng + ?Sized>(
    material: &Material,
    ray: &Ray,
    hit: &Hit,
    rng: &mut R,
) -> Option<(Vec3, Vec3)> {
    match *material {
        Material::Diffuse { color } => {
            let mut dir = hit.normal + random_unit_vector(rng);
            if dir.length_squared() < 1e-8 {
                dir = hit.normal;
            }
            Some((color, dir))
        }
        Material::Metal { color, roughness } => {
            let reflected = reflect(ray.dir, hit.normal);
            let dir = reflected + roughness * random_unit_vector(rng);
            (dir.dot(hit.normal) > 0.0).then_some((color, dir))
        }
        Material::Glass { color, ior } => {
            let ratio = if hit.front_face { 1.0 / ior } else { ior };
            let cos_theta = (-ray.dir).dot(hit.normal).min(1.0);
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let cannot_refract = ratio * sin_theta > 1.0;
            let dir = if cannot_refract || schlick(cos_theta, ratio) > rng.random::<f32>() {
                reflect(ray.dir, hit.normal)
            } else {
                refract(ray.dir, hit.normal, ratio, cos_theta)
            };
            Some((color, dir))
        }
        Material::Light { .. } => None,
    }
}

#[inline]
fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

#[inline]
fn refract(uv: Vec3, n: Vec3, ratio: f32, cos_theta: f32) -> Vec3 {
    let perp = ratio * (uv + cos_theta * n);
    let parallel = -(1.0 - perp.length_squared()).abs().sqrt() * n;
    perp + parallel
}

/// Schlick's approximation of Fresnel reflectance.
#[inline]
fn schlick(cosine: f32, ratio: f32) -> f32 {
    let r0 = ((1.0 - ratio) / (1.0 + ratio)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z = rng.random_range(-1.0f32..1.0);
    let phi = rng.random_range(0.0f32..std::f32::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let (s, c) = phi.sin_cos();
    Vec3::new(r * c, r * s, z)
}

fn random_in_unit_disk<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    let r = rng.random::<f32>().sqrt();
    let phi = rng.random_range(0.0f32..std::f32::consts::TAU);
    let (s, c) = phi.sin_cos();
    Vec2::new(r * c, r * s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Primitive, Scene, ScenePreset, Sky, Transform};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn depth(max_depth: u32) -> TraceOptions {
        TraceOptions {
            max_depth,
            direct_light: true,
        }
    }

    /// Grey floor at y = 0 under a small spherical light at (0, 2, 0).
    fn floor_under_sphere_light() -> SceneSnapshot {
        let mut scene = Scene::default();
        scene.sky = Sky::BLACK;
        scene
            .add_primitive(
                Primitive::Quad { width: 40.0, height: 40.0 },
                Transform::IDENTITY,
                Material::diffuse(Vec3::splat(0.5)),
            )
            .unwrap();
        scene
            .add_primitive(
                Primitive::Sphere { radius: 0.5 },
                Transform::from_position(Vec3::new(0.0, 2.0, 0.0)),
                Material::light(Vec3::ONE, 10.0),
            )
            .unwrap();
        SceneSnapshot::from_scene(&scene)
    }

    /// Mean and variance of `n` one-bounce estimates at the floor origin.
    fn floor_estimates(snap: &SceneSnapshot, direct_light: bool, n: usize, seed: u64) -> (f32, f32) {
        let mut rng = StdRng::seed_from_u64(seed);
        let opts = TraceOptions {
            max_depth: 2,
            direct_light,
        };
        let origin = Vec3::new(0.0, 1.0, 3.0);
        let samples: Vec<f32> = (0..n)
            .map(|_| trace(snap, Ray::new(origin, -origin), opts, &mut rng).x)
            .collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
        (mean, var)
    }

    fn one_sphere(material: Material, sky: Sky) -> SceneSnapshot {
        let mut scene = Scene::default();
        scene.sky = sky;
        scene
            .add_primitive(
                Primitive::Sphere { radius: 1.0 },
                Transform::from_position(Vec3::new(0.0, 0.0, -3.0)),
                material,
            )
            .unwrap();
        SceneSnapshot::from_scene(&scene)
    }

    #[test]
    fn test_light_hit_returns_emission() {
        let snap = one_sphere(Material::light(Vec3::new(1.0, 0.5, 0.25), 4.0), Sky::BLACK);
        let mut rng = StdRng::seed_from_u64(1);
        let c = trace(&snap, Ray::new(Vec3::ZERO, Vec3::NEG_Z), depth(8), &mut rng);
        assert!((c - Vec3::new(4.0, 2.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_miss_returns_sky() {
        let snap = one_sphere(Material::default(), Sky::default());
        let mut rng = StdRng::seed_from_u64(2);
        let c = trace(&snap, Ray::new(Vec3::ZERO, Vec3::Y), depth(8), &mut rng);
        assert!((c - Sky::default().top).length() < 1e-6);
    }

    #[test]
    fn test_unlit_scene_is_black() {
        let snap = one_sphere(Material::default(), Sky::BLACK);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..64 {
            let c = trace(&snap, Ray::new(Vec3::ZERO, Vec3::NEG_Z), depth(8), &mut rng);
            assert_eq!(c, Vec3::ZERO);
        }
    }

    #[test]
    fn test_glass_and_metal_stay_finite() {
        let mut rng = StdRng::seed_from_u64(4);
        for mat in [Material::glass(Vec3::ONE, 1.5), Material::metal(Vec3::splat(0.8), 0.3)] {
            let snap = one_sphere(mat, Sky::default());
            for _ in 0..256 {
                let c = trace(&snap, Ray::new(Vec3::ZERO, Vec3::new(0.1, 0.05, -1.0)), depth(12), &mut rng);
                assert!(c.is_finite());
                assert!(c.min_element() >= 0.0);
            }
        }
    }

    #[test]
    fn test_schlick_bounds() {
        assert!((schlick(1.0, 1.0 / 1.5) - 0.04).abs() < 1e-3);
        assert!((schlick(0.0, 1.0 / 1.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unit_sampling() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            assert!((random_unit_vector(&mut rng).length() - 1.0).abs() < 1e-4);
            assert!(random_in_unit_disk(&mut rng).length() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_light_sampling_matches_sphere_irradiance() {
        // Radiance leaving the floor below a sphere light of radiance L at
        // height d is albedo * L * (r / d)^2
        let expected = 0.5 * 10.0 * (0.5f32 / 2.0).powi(2);
        let snap = floor_under_sphere_light();
        assert_eq!(snap.lights.len(), 1);

        let (with_lights, var_with) = floor_estimates(&snap, true, 4_000, 11);
        let (bsdf_only, var_without) = floor_estimates(&snap, false, 40_000, 12);

        assert!((with_lights - expected).abs() < 0.08 * expected, "{} vs {}", with_lights, expected);
        assert!((bsdf_only - expected).abs() < 0.08 * expected, "{} vs {}", bsdf_only, expected);
        assert!(var_with < 0.5 * var_without, "{} vs {}", var_with, var_without);
    }

    #[test]
    fn test_occluded_light_adds_nothing() {
        let mut scene = Scene::default();
        scene.sky = Sky::BLACK;
        scene
            .add_primitive(Primitive::Quad { width: 40.0, height: 40.0 }, Transform::IDENTITY, Material::default())
            .unwrap();
        // Opaque black slab between floor and light
        scene
            .add_primitive(
                Primitive::Box { x: 40.0, y: 0.1, z: 40.0 },
                Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
                Material::diffuse(Vec3::ZERO),
            )
            .unwrap();
        scene
            .add_primitive(
                Primitive::Sphere { radius: 0.5 },
                Transform::from_position(Vec3::new(0.0, 2.0, 0.0)),
                Material::light(Vec3::ONE, 10.0),
            )
            .unwrap();
        let snap = SceneSnapshot::from_scene(&scene);
        let mut rng = StdRng::seed_from_u64(13);
        let origin = Vec3::new(0.0, 0.5, 3.0);
        for _ in 0..256 {
            let c = trace(&snap, Ray::new(origin, Vec3::new(0.0, -0.5, -3.0)), depth(4), &mut rng);
            assert_eq!(c, Vec3::ZERO);
        }
    }

    #[test]
    fn test_cornell_box_less_noisy_with_light_sampling() {
        let mut scene = Scene::default();
        scene.load_preset(ScenePreset::CornellBox, None).unwrap();
        scene.camera.resize(16, 12);
        let snap = SceneSnapshot::from_scene(&scene);

        // Per-pixel sample variance averaged over the frame, and frame mean
        let stats = |direct_light: bool| {
            let opts = TraceOptions {
                max_depth: 4,
                direct_light,
            };
            let mut rng = StdRng::seed_from_u64(21);
            let spp = 64;
            let (mut mean, mut var) = (0.0f32, 0.0f32);
            for y in 0..12 {
                for x in 0..16 {
                    let s: Vec<f32> = (0..spp)
                        .map(|_| sample_pixel(&snap, x, y, opts, &mut rng).element_sum() / 3.0)
                        .collect();
                    let m = s.iter().sum::<f32>() / spp as f32;
                    mean += m;
                    var += s.iter().map(|v| (v - m).powi(2)).sum::<f32>() / spp as f32;
                }
            }
            (mean / 192.0, var / 192.0)
        };

        let (mean_nee, var_nee) = stats(true);
        let (mean_bsdf, var_bsdf) = stats(false);
        assert!(mean_nee > 0.0 && mean_bsdf > 0.0);
        assert!((mean_nee - mean_bsdf).abs() < 0.25 * mean_bsdf, "{} vs {}", mean_nee, mean_bsdf);
        assert!(var_nee < var_bsdf, "{} vs {}", var_nee, var_bsdf);
    }
}
