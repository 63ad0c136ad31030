//! Path tracer convergence and cancellation.

use rastertrace::prelude::*;
use rastertrace::scene::Sky;
use std::time::{Duration, Instant};

fn sphere_and_light() -> Scene {
    let mut scene = Scene::default();
    scene.sky = Sky::BLACK;
    scene.camera.pos = Vec3::new(0.0, 0.5, 5.0);
    scene.camera.look_at(Vec3::ZERO);
    scene
        .add_primitive(Primitive::Sphere { radius: 1.0 }, Transform::IDENTITY, Material::default())
        .unwrap();
    scene
        .add_primitive(
            Primitive::Quad { width: 3.0, height: 3.0 },
            Transform::from_position(Vec3::new(0.0, 3.0, 0.0))
                .with_rotation(Vec3::new(std::f32::consts::PI, 0.0, 0.0)),
            Material::light(Vec3::ONE, 8.0),
        )
        .unwrap();
    scene
}

fn settings(target: u32) -> RenderSettings {
    RenderSettings {
        width: 32,
        height: 24,
        tile_size: 8,
        samples_per_pass: 2,
        target_samples: target,
        max_depth: 8,
        direct_light: true,
        seed: 42,
    }
}

#[test]
fn test_diffuse_sphere_converges_lit_and_finite() {
    let scene = sphere_and_light();
    let pool = WorkerPool::new(2).unwrap();
    let mut job = RenderJob::start(SceneSnapshot::from_scene(&scene), settings(32), pool).unwrap();
    let image = job.wait().expect("image published");

    assert_eq!(image.samples, 32);
    assert!(image.pixels.iter().all(|p| p.is_finite() && p.min_element() >= 0.0));

    // Black sky: every bit of energy comes from the overhead panel
    let mean = image.mean();
    assert!(mean > 0.0, "sphere should receive light");
    assert!(image.pixels.iter().all(|p| p.max_element() <= 8.0 + 1e-3));
    assert!(mean < 8.0);
    assert!(job.progress().cursor().is_none());
}

#[test]
fn test_stop_at_zero_percent() {
    let pool = WorkerPool::new(2).unwrap();
    let mut job = RenderJob::start(SceneSnapshot::from_scene(&sphere_and_light()), settings(1_000_000), pool).unwrap();
    job.stop();
    assert!(job.is_finished());
    assert!(job.progress().samples < 1_000_000);
}

#[test]
fn test_stop_mid_render() {
    let pool = WorkerPool::new(2).unwrap();
    let mut job = RenderJob::start(SceneSnapshot::from_scene(&sphere_and_light()), settings(1_000_000), pool).unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    while job.progress().samples == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let during = job.progress();
    assert!(during.samples > 0);
    assert!(during.cursor().is_some());

    job.stop();
    let after = job.progress();
    assert!(after.finished);
    assert!(after.cursor().is_none());

    let image = job.latest_image().expect("at least one pass published");
    assert_eq!(image.samples, after.samples);
    assert_eq!(image.pixels.len(), 32 * 24);
    assert!(image.pixels.iter().all(|p| p.is_finite()));
}

#[test]
fn test_stop_after_completion() {
    let pool = WorkerPool::new(2).unwrap();
    let mut job = RenderJob::start(SceneSnapshot::from_scene(&sphere_and_light()), settings(4), pool).unwrap();
    let done = job.wait().unwrap();
    job.stop();
    job.stop();
    assert_eq!(job.latest_image().unwrap().samples, done.samples);
}

#[test]
fn test_pool_reused_across_jobs() {
    let pool = WorkerPool::new(2).unwrap();
    for _ in 0..3 {
        let mut job = RenderJob::start(SceneSnapshot::from_scene(&sphere_and_light()), settings(2), pool.clone()).unwrap();
        assert_eq!(job.wait().unwrap().samples, 2);
    }
}

#[test]
fn test_live_edits_do_not_reach_snapshot() {
    let mut scene = sphere_and_light();
    let snapshot = SceneSnapshot::from_scene(&scene);
    let prims = snapshot.primitives.len();
    scene.clear();

    let pool = WorkerPool::new(1).unwrap();
    let mut job = RenderJob::start(snapshot, settings(2), pool).unwrap();
    let image = job.wait().unwrap();
    assert!(prims > 0);
    assert!(image.mean() > 0.0);
}
