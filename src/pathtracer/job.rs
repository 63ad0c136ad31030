//! Progressive render job.
//!
//! A driver thread owns the accumulation buffer and runs passes on the
//! [`WorkerPool`]. Each pass renders every tile in parallel; tiles return
//! their own buffers, so workers never share mutable state. A pass is
//! published as a fresh immutable [`RenderedImage`] only after all of its
//! tiles completed, which means readers can never observe a torn frame.
//!
//! Cancellation is an atomic flag checked before each tile and each row, so
//! a stop request waits for at most one row of work per worker.

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::integrator::{sample_pixel, TraceOptions};
use super::pool::WorkerPool;
use super::snapshot::SceneSnapshot;
use crate::config::EngineConfig;
use crate::util::{linear_to_rgba8, Error, Result, Vec3};

/// Per-job render parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub samples_per_pass: u32,
    pub target_samples: u32,
    pub max_depth: u32,
    /// Shadow-ray light sampling at diffuse bounces.
    pub direct_light: bool,
    pub seed: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RenderSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            tile_size: config.tile_size,
            samples_per_pass: config.samples_per_pass,
            target_samples: config.target_samples,
            max_depth: config.max_depth,
            direct_light: config.direct_light,
            seed: 0x7EA5_u64,
        }
        .validated()
    }

    /// Raise every count to at least 1.
    pub fn validated(mut self) -> Self {
        self.width = self.width.max(1);
        self.height = self.height.max(1);
        self.tile_size = self.tile_size.max(1);
        self.samples_per_pass = self.samples_per_pass.max(1);
        self.target_samples = self.target_samples.max(1);
        self.max_depth = self.max_depth.max(1);
        self
    }

    pub fn trace_options(&self) -> TraceOptions {
        TraceOptions {
            max_depth: self.max_depth,
            direct_light: self.direct_light,
        }
    }
}

/// Averaged linear radiance after some number of samples per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    /// Row-major, top row first.
    pub pixels: Vec<Vec3>,
}

impl RenderedImage {
    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Mean luminance-ish brightness (channel average over all pixels).
    pub fn mean(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: Vec3 = self.pixels.iter().copied().sum();
        sum.element_sum() / (3.0 * self.pixels.len() as f32)
    }

    /// Gamma-encoded RGBA8.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&c| linear_to_rgba8(c)).collect()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.to_rgba8())
            .ok_or_else(|| Error::Image("buffer size does not match dimensions".into()))?;
        img.save_with_format(path, image::ImageFormat::Png)?;
        info!("Saved {}x{} render to {}", self.width, self.height, path.display());
        Ok(())
    }
}

/// Snapshot of job progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    /// Samples per pixel in the latest published image.
    pub samples: u32,
    pub target_samples: u32,
    /// Tiles finished in the pass currently running.
    pub tiles_done: usize,
    pub tiles_total: usize,
    /// True once the driver has exited (target reached or stopped).
    pub finished: bool,
}

impl RenderProgress {
    /// Linear work position, or `None` once the job has ended.
    pub fn cursor(&self) -> Option<usize> {
        if self.finished {
            None
        } else {
            Some(self.samples as usize * self.tiles_total + self.tiles_done)
        }
    }

    /// Completed fraction in [0, 1].
    pub fn fraction(&self) -> f32 {
        let done = self.samples as f32 / self.target_samples.max(1) as f32;
        done.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Tile {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Tile {
    fn pixel_count(&self) -> usize {
        ((self.x1 - self.x0) * (self.y1 - self.y0)) as usize
    }
}

fn make_tiles(width: u32, height: u32, size: u32) -> Vec<Tile> {
    let mut tiles = Vec::new();
    for y0 in (0..height).step_by(size as usize) {
        for x0 in (0..width).step_by(size as usize) {
            tiles.push(Tile {
                x0,
                y0,
                x1: (x0 + size).min(width),
                y1: (y0 + size).min(height),
            });
        }
    }
    tiles
}

/// State shared between the handle and the driver thread.
struct Shared {
    cancel: AtomicBool,
    finished: AtomicBool,
    samples: AtomicU32,
    tiles_done: AtomicUsize,
    image: RwLock<Option<Arc<RenderedImage>>>,
}

/// Handle to a running progressive render.
pub struct RenderJob {
    shared: Arc<Shared>,
    settings: RenderSettings,
    tiles_total: usize,
    handle: Option<JoinHandle<()>>,
}

impl RenderJob {
    /// Start rendering `snapshot` on `pool`. The snapshot camera is resized
    /// to the settings' resolution.
    pub fn start(mut snapshot: SceneSnapshot, settings: RenderSettings, pool: WorkerPool) -> Result<Self> {
        let settings = settings.validated();
        snapshot.camera.resize(settings.width, settings.height);
        let tiles = make_tiles(settings.width, settings.height, settings.tile_size);
        let tiles_total = tiles.len();

        let shared = Arc::new(Shared {
            cancel: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            samples: AtomicU32::new(0),
            tiles_done: AtomicUsize::new(0),
            image: RwLock::new(None),
        });

        let driver_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("rastertrace-render".into())
            .spawn(move || {
                drive(&snapshot, &settings, &tiles, &pool, &driver_shared);
                driver_shared.finished.store(true, Ordering::Release);
            })?;

        info!(
            "Render started: {}x{}, {} tiles, target {} spp",
            settings.width, settings.height, tiles_total, settings.target_samples
        );
        Ok(Self {
            shared,
            settings,
            tiles_total,
            handle: Some(handle),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn progress(&self) -> RenderProgress {
        RenderProgress {
            samples: self.shared.samples.load(Ordering::Acquire),
            target_samples: self.settings.target_samples,
            tiles_done: self.shared.tiles_done.load(Ordering::Relaxed),
            tiles_total: self.tiles_total,
            finished: self.is_finished(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Most recent fully completed pass.
    pub fn latest_image(&self) -> Option<Arc<RenderedImage>> {
        self.shared.image.read().clone()
    }

    /// Cancel and join. Safe to call repeatedly and after completion.
    pub fn stop(&mut self) {
        self.shared.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("render driver panicked");
            }
            debug!("render job stopped");
        }
    }

    /// Block until the target is reached (or the job was stopped).
    pub fn wait(&mut self) -> Option<Arc<RenderedImage>> {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("render driver panicked");
            }
        }
        self.latest_image()
    }
}

impl Drop for RenderJob {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Driver loop: one parallel pass per iteration until target or cancel.
fn drive(
    scene: &SceneSnapshot,
    settings: &RenderSettings,
    tiles: &[Tile],
    pool: &WorkerPool,
    shared: &Shared,
) {
    let (w, h) = (settings.width, settings.height);
    let mut accum = vec![Vec3::ZERO; (w * h) as usize];
    let mut samples = 0u32;
    let mut pass = 0u64;
    let started = Instant::now();

    while samples < settings.target_samples {
        if shared.cancel.load(Ordering::Acquire) {
            break;
        }
        let spp = settings.samples_per_pass.min(settings.target_samples - samples);
        shared.tiles_done.store(0, Ordering::Relaxed);

        let buffers: Vec<Option<Vec<Vec3>>> = pool.install(|| {
            tiles
                .par_iter()
                .enumerate()
                .map(|(i, tile)| {
                    let seed = settings.seed
                        ^ pass.wrapping_mul(0x9E37_79B9_7F4A_7C15)
                        ^ (i as u64).wrapping_mul(0xD1B5_4A32_D192_ED03);
                    render_tile(scene, tile, spp, settings.trace_options(), seed, shared)
                })
                .collect()
        });

        if buffers.iter().any(Option::is_none) {
            debug!("pass {} cancelled", pass);
            break;
        }

        for (tile, buf) in tiles.iter().zip(buffers.into_iter().flatten()) {
            let tw = (tile.x1 - tile.x0) as usize;
            for (row, chunk) in buf.chunks_exact(tw).enumerate() {
                let start = ((tile.y0 as usize + row) * w as usize) + tile.x0 as usize;
                for (dst, src) in accum[start..start + tw].iter_mut().zip(chunk) {
                    *dst += *src;
                }
            }
        }
        samples += spp;
        pass += 1;

        let inv = 1.0 / samples as f32;
        let image = RenderedImage {
            width: w,
            height: h,
            samples,
            pixels: accum.iter().map(|&c| c * inv).collect(),
        };
        *shared.image.write() = Some(Arc::new(image));
        shared.samples.store(samples, Ordering::Release);
        debug!("pass {} published ({} spp)", pass, samples);
    }

    info!(
        "Render ended at {}/{} spp in {:.2?}",
        samples,
        settings.target_samples,
        started.elapsed()
    );
}

/// Render one tile. `None` if cancelled part-way.
fn render_tile(
    scene: &SceneSnapshot,
    tile: &Tile,
    spp: u32,
    opts: TraceOptions,
    seed: u64,
    shared: &Shared,
) -> Option<Vec<Vec3>> {
    if shared.cancel.load(Ordering::Relaxed) {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = Vec::with_capacity(tile.pixel_count());
    for y in tile.y0..tile.y1 {
        if shared.cancel.load(Ordering::Relaxed) {
            return None;
        }
        for x in tile.x0..tile.x1 {
            let mut sum = Vec3::ZERO;
            for _ in 0..spp {
                sum += sample_pixel(scene, x, y, opts, &mut rng);
            }
            buf.push(sum);
        }
    }
    shared.tiles_done.fetch_add(1, Ordering::Relaxed);
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, Primitive, Scene, Sky, Transform};

    fn small_settings(target: u32) -> RenderSettings {
        RenderSettings {
            width: 24,
            height: 16,
            tile_size: 8,
            samples_per_pass: 2,
            target_samples: target,
            max_depth: 6,
            direct_light: true,
            seed: 9,
        }
    }

    fn lit_snapshot() -> SceneSnapshot {
        let mut scene = Scene::default();
        scene.sky = Sky::BLACK;
        scene.camera.pos = Vec3::new(0.0, 0.0, 4.0);
        scene
            .add_primitive(Primitive::Sphere { radius: 1.0 }, Transform::IDENTITY, Material::default())
            .unwrap();
        scene
            .add_primitive(
                Primitive::Sphere { radius: 0.4 },
                Transform::from_position(Vec3::new(1.2, 1.0, 0.5)),
                Material::light(Vec3::ONE, 10.0),
            )
            .unwrap();
        SceneSnapshot::from_scene(&scene)
    }

    #[test]
    fn test_tiles_cover_image() {
        let tiles = make_tiles(20, 10, 8);
        assert_eq!(tiles.len(), 3 * 2);
        let total: usize = tiles.iter().map(Tile::pixel_count).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn test_job_reaches_target() {
        let pool = WorkerPool::new(2).unwrap();
        let mut job = RenderJob::start(lit_snapshot(), small_settings(6), pool).unwrap();
        let image = job.wait().unwrap();
        assert_eq!(image.samples, 6);
        assert_eq!(image.pixels.len(), 24 * 16);
        assert!(image.pixels.iter().all(|p| p.is_finite()));
        assert!(image.mean() > 0.0);

        let progress = job.progress();
        assert!(progress.finished);
        assert_eq!(progress.cursor(), None);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_stop_immediately() {
        let pool = WorkerPool::new(2).unwrap();
        let mut job = RenderJob::start(lit_snapshot(), small_settings(100_000), pool).unwrap();
        job.stop();
        assert!(job.is_finished());
        let progress = job.progress();
        assert!(progress.samples < 100_000);
        if let Some(img) = job.latest_image() {
            assert_eq!(img.samples, progress.samples);
        }
        job.stop();
    }

    #[test]
    fn test_rgba_and_png() {
        let img = RenderedImage {
            width: 2,
            height: 1,
            samples: 1,
            pixels: vec![Vec3::ZERO, Vec3::ONE],
        };
        assert_eq!(img.to_rgba8(), vec![0, 0, 0, 255, 255, 255, 255, 255]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        img.save_png(&path).unwrap();
        assert!(path.exists());
    }
}
