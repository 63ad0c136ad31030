//! Colour + depth target for the software rasterizer.

use rayon::prelude::*;
use std::path::Path;

use crate::scene::{Camera, Sky};
use crate::util::{linear_to_rgba8, Error, Result, Vec3};

/// Linear colour and inverse-depth buffers.
///
/// Depth stores `1 / w` (view distance reciprocal), so larger is nearer and
/// a cleared buffer is 0.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub color: Vec<Vec3>,
    pub depth: Vec<f32>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let n = (width * height) as usize;
        Self {
            width,
            height,
            color: vec![Vec3::ZERO; n],
            depth: vec![0.0; n],
        }
    }

    /// Reallocate if the size changed.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width != width.max(1) || self.height != height.max(1) {
            *self = Self::new(width, height);
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        self.color[self.index(x, y)]
    }

    /// Fill with the sky gradient seen through `camera` and reset depth.
    pub fn clear_to_sky(&mut self, camera: &Camera, sky: &Sky) {
        let w = self.width as usize;
        self.color
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    let ray = camera.ray_through(x as f32 + 0.5, y as f32 + 0.5);
                    *px = sky.color(ray.dir);
                }
            });
        self.depth.fill(0.0);
    }

    /// Gamma-encoded RGBA8, row-major.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.color.iter().flat_map(|&c| linear_to_rgba8(c)).collect()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.to_rgba8())
            .ok_or_else(|| Error::Image("framebuffer size mismatch".into()))?;
        img.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_to_sky() {
        let mut cam = Camera::new(8, 8);
        cam.pitch = 0.0;
        let mut fb = Framebuffer::new(8, 8);
        fb.depth[3] = 0.5;
        let sky = Sky::default();
        fb.clear_to_sky(&cam, &sky);
        assert!(fb.depth.iter().all(|&d| d == 0.0));
        // Upper rows look further up, so they are closer to the top colour
        let top = fb.pixel(4, 0);
        let bottom = fb.pixel(4, 7);
        assert!((top - sky.top).length() < (bottom - sky.top).length());
    }

    #[test]
    fn test_resize_and_rgba() {
        let mut fb = Framebuffer::new(4, 2);
        fb.resize(3, 3);
        assert_eq!(fb.color.len(), 9);
        assert_eq!(fb.to_rgba8().len(), 9 * 4);
    }
}
