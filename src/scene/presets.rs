//! Built-in scene configurations.
//!
//! Every preset is deterministic: the same preset with the same mesh bytes
//! always produces the same objects, camera and sky.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::camera::dof_strength_to_angle;
use super::mesh::{decode_mesh, TriangleMesh};
use super::{Material, Primitive, Scene, Shape, Sky, Transform};
use crate::util::{Error, Result, Vec3};

const RANDOM_SPHERES_SEED: u64 = 0x5EED_0B1E;

/// Cornell box edge length.
const CORNELL_SIZE: f32 = 55.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenePreset {
    RandomSpheres,
    CornellBox,
    CornellBoxExtra,
    SimpleLight,
    MeshShowcase,
}

impl ScenePreset {
    pub const ALL: [ScenePreset; 5] = [
        ScenePreset::RandomSpheres,
        ScenePreset::CornellBox,
        ScenePreset::CornellBoxExtra,
        ScenePreset::SimpleLight,
        ScenePreset::MeshShowcase,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenePreset::RandomSpheres => "random-spheres",
            ScenePreset::CornellBox => "cornell-box",
            ScenePreset::CornellBoxExtra => "cornell-box-extra",
            ScenePreset::SimpleLight => "simple-light",
            ScenePreset::MeshShowcase => "mesh-showcase",
        }
    }

    /// Whether the preset places caller-supplied mesh bytes.
    pub fn uses_mesh(self) -> bool {
        matches!(self, ScenePreset::CornellBoxExtra | ScenePreset::MeshShowcase)
    }
}

impl fmt::Display for ScenePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        ScenePreset::ALL
            .into_iter()
            .find(|p| p.name() == key)
            .ok_or_else(|| Error::UnknownPreset(s.to_string()))
    }
}

/// Replace `scene` contents with `preset`.
#[tracing::instrument(skip(scene, mesh_bytes), fields(mesh = mesh_bytes.is_some()))]
pub(crate) fn load(scene: &mut Scene, preset: ScenePreset, mesh_bytes: Option<&[u8]>) -> Result<()> {
    // Decode before touching the scene
    let mesh = match mesh_bytes {
        Some(bytes) if preset.uses_mesh() => Some(Arc::new(decode_mesh(bytes)?)),
        Some(_) => {
            tracing::debug!("{} ignores mesh bytes", preset);
            None
        }
        None => None,
    };

    scene.clear();
    scene.camera.defocus_angle = 0.0;
    match preset {
        ScenePreset::RandomSpheres => random_spheres(scene),
        ScenePreset::CornellBox => cornell_box(scene, false, None),
        ScenePreset::CornellBoxExtra => cornell_box(scene, true, mesh),
        ScenePreset::SimpleLight => simple_light(scene),
        ScenePreset::MeshShowcase => mesh_showcase(scene, mesh),
    }
    tracing::info!("loaded preset {} ({} objects)", preset, scene.len());
    Ok(())
}

fn sphere(scene: &mut Scene, center: Vec3, radius: f32, material: Material) {
    scene.insert(
        "Sphere",
        Shape::Primitive(Primitive::Sphere { radius }),
        Transform::from_position(center),
        material,
        true,
    );
}

/// Non-editable quad. `rotation` orients the local +Y normal.
fn wall(scene: &mut Scene, name: &str, center: Vec3, rotation: Vec3, size: (f32, f32), material: Material) {
    scene.insert(
        name,
        Shape::Primitive(Primitive::Quad {
            width: size.0,
            height: size.1,
        }),
        Transform::from_position(center).with_rotation(rotation),
        material,
        false,
    );
}

/// Place a unit-radius mesh so it rests on `floor_y`.
fn place_mesh(scene: &mut Scene, mesh: Arc<TriangleMesh>, x: f32, z: f32, floor_y: f32, radius: f32, material: Material) {
    let lowest = mesh.bounds().min.y;
    let transform = Transform::from_position(Vec3::new(x, floor_y - lowest * radius, z))
        .with_scale(Vec3::splat(radius));
    scene.insert("Mesh", Shape::Mesh { mesh }, transform, material, true);
}

fn random_spheres(scene: &mut Scene) {
    fn rand_color(rng: &mut StdRng) -> Vec3 {
        Vec3::new(rng.random(), rng.random(), rng.random())
    }

    let mut rng = StdRng::seed_from_u64(RANDOM_SPHERES_SEED);

    wall(
        scene,
        "Ground",
        Vec3::ZERO,
        Vec3::ZERO,
        (100.0, 100.0),
        Material::diffuse(Vec3::splat(0.5)),
    );

    for a in -11..11 {
        for b in -11..11 {
            let choose: f32 = rng.random();
            let center = Vec3::new(
                a as f32 + 0.9 * rng.random::<f32>(),
                0.2,
                b as f32 + 0.9 * rng.random::<f32>(),
            );
            if (center - Vec3::new(4.0, 0.2, 0.0)).length() <= 0.9 {
                continue;
            }
            let material = if choose < 0.8 {
                let c = rand_color(&mut rng) * rand_color(&mut rng);
                Material::diffuse(c)
            } else if choose < 0.95 {
                let c = rand_color(&mut rng) * 0.5 + Vec3::splat(0.5);
                Material::metal(c, rng.random_range(0.0..0.5))
            } else {
                Material::glass(Vec3::ONE, 1.5)
            };
            sphere(scene, center, 0.2, material);
        }
    }

    sphere(scene, Vec3::new(0.0, 1.0, 0.0), 1.0, Material::glass(Vec3::ONE, 1.5));
    sphere(
        scene,
        Vec3::new(-4.0, 1.0, 0.0),
        1.0,
        Material::diffuse(Vec3::new(0.4, 0.2, 0.1)),
    );
    sphere(
        scene,
        Vec3::new(4.0, 1.0, 0.0),
        1.0,
        Material::metal(Vec3::new(0.7, 0.6, 0.5), 0.0),
    );

    scene.sky = Sky::default();
    let cam = &mut scene.camera;
    cam.pos = Vec3::new(13.0, 2.0, 3.0);
    cam.look_at(Vec3::ZERO);
    cam.set_fov(20f32.to_radians());
    cam.set_defocus_angle(0.6f32.to_radians());
    cam.set_focal_distance(10.0);
}

fn cornell_box(scene: &mut Scene, extra: bool, mesh: Option<Arc<TriangleMesh>>) {
    let s = CORNELL_SIZE;
    let h = s * 0.5;
    let red = Vec3::new(0.65, 0.05, 0.05);
    let green = Vec3::new(0.12, 0.45, 0.15);
    let white = Vec3::splat(0.73);

    let side = |c: Vec3| {
        if extra {
            Material::metal(c, 0.0)
        } else {
            Material::diffuse(c)
        }
    };

    wall(scene, "Floor", Vec3::new(h, 0.0, -h), Vec3::ZERO, (s, s), Material::diffuse(white));
    wall(scene, "Ceiling", Vec3::new(h, s, -h), Vec3::new(PI, 0.0, 0.0), (s, s), Material::diffuse(white));
    wall(scene, "Back", Vec3::new(h, h, -s), Vec3::new(FRAC_PI_2, 0.0, 0.0), (s, s), Material::diffuse(white));
    wall(scene, "Left", Vec3::new(0.0, h, -h), Vec3::new(0.0, 0.0, -FRAC_PI_2), (s, s), side(green));
    wall(scene, "Right", Vec3::new(s, h, -h), Vec3::new(0.0, 0.0, FRAC_PI_2), (s, s), side(red));

    let brightness = if extra { 25.0 } else { 15.0 };
    wall(
        scene,
        "Light",
        Vec3::new(h, s - 0.05, -h),
        Vec3::new(PI, 0.0, 0.0),
        (13.0, 10.5),
        Material::light(Vec3::ONE, brightness),
    );

    let tall = if extra { Material::metal(white, 0.0) } else { Material::diffuse(white) };
    scene.insert(
        "Tall box",
        Shape::Primitive(Primitive::Box { x: 16.5, y: 33.0, z: 16.5 }),
        Transform::from_position(Vec3::new(18.85, 16.5, -37.75))
            .with_rotation(Vec3::new(0.0, 15f32.to_radians(), 0.0)),
        tall,
        true,
    );

    let short = if extra { Material::glass(white, 1.5) } else { Material::diffuse(white) };
    scene.insert(
        "Short box",
        Shape::Primitive(Primitive::Box { x: 16.5, y: 16.5, z: 16.5 }),
        Transform::from_position(Vec3::new(36.85, 8.25, -14.75))
            .with_rotation(Vec3::new(0.0, (-18f32).to_radians(), 0.0)),
        short,
        true,
    );

    if let Some(mesh) = mesh {
        place_mesh(scene, mesh, 16.0, -12.0, 0.0, 7.0, Material::diffuse(Vec3::new(0.8, 0.6, 0.2)));
    }

    scene.sky = Sky::BLACK;
    let cam = &mut scene.camera;
    cam.pos = Vec3::new(h, h, 80.0);
    cam.look_at(Vec3::new(h, h, 0.0));
    cam.set_fov(40f32.to_radians());
    cam.set_focal_distance(80.0 + h);
    cam.set_defocus_angle(0.0);
}

fn simple_light(scene: &mut Scene) {
    wall(
        scene,
        "Ground",
        Vec3::ZERO,
        Vec3::ZERO,
        (200.0, 200.0),
        Material::diffuse(Vec3::splat(0.9)),
    );
    sphere(scene, Vec3::new(0.0, 2.0, 0.0), 2.0, Material::diffuse(Vec3::splat(0.9)));
    wall(
        scene,
        "Light",
        Vec3::new(4.0, 2.0, -2.0),
        Vec3::new(FRAC_PI_2, 0.0, 0.0),
        (2.0, 2.0),
        Material::light(Vec3::ONE, 4.0),
    );
    sphere(scene, Vec3::new(0.0, 7.0, 0.0), 2.0, Material::light(Vec3::ONE, 4.0));

    scene.sky = Sky {
        top: Vec3::splat(0.01),
        bottom: Vec3::ZERO,
    };
    let cam = &mut scene.camera;
    cam.pos = Vec3::new(26.0, 3.0, 6.0);
    cam.look_at(Vec3::new(0.0, 2.0, 0.0));
    cam.set_fov(20f32.to_radians());
    cam.set_defocus_angle(0.0);
    cam.set_focal_distance(26.0);
}

fn mesh_showcase(scene: &mut Scene, mesh: Option<Arc<TriangleMesh>>) {
    wall(
        scene,
        "Floor",
        Vec3::ZERO,
        Vec3::ZERO,
        (40.0, 40.0),
        Material::diffuse(Vec3::splat(0.6)),
    );
    match mesh {
        Some(mesh) => place_mesh(scene, mesh, 0.0, 0.0, 0.0, 1.5, Material::default()),
        None => sphere(scene, Vec3::new(0.0, 1.5, 0.0), 1.5, Material::glass(Vec3::ONE, 1.5)),
    }
    wall(
        scene,
        "Light",
        Vec3::new(0.0, 6.0, 0.0),
        Vec3::new(PI, 0.0, 0.0),
        (4.0, 4.0),
        Material::light(Vec3::ONE, 8.0),
    );

    scene.sky = Sky {
        top: Vec3::new(0.25, 0.3, 0.4),
        bottom: Vec3::splat(0.05),
    };
    let cam = &mut scene.camera;
    cam.pos = Vec3::new(0.0, 3.0, 7.0);
    cam.look_at(Vec3::new(0.0, 1.2, 0.0));
    cam.set_fov(45f32.to_radians());
    cam.set_focal_distance(7.0);
    cam.set_defocus_angle(dof_strength_to_angle(10.0));
}
