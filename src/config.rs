//! Persistent engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::util::Result;

/// Engine settings that persist between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Viewport
    pub width: u32,
    pub height: u32,

    // Path tracer
    pub tile_size: u32,
    pub samples_per_pass: u32,
    pub target_samples: u32,
    pub max_depth: u32,
    /// Worker count, 0 = hardware concurrency
    pub threads: usize,
    /// Sample lights with shadow rays at diffuse bounces
    pub direct_light: bool,

    // Sky gradient (linear RGB)
    pub sky_top: [f32; 3],
    pub sky_bottom: [f32; 3],

    // Tessellation
    pub sphere_subdivisions: u32,

    // Controls
    pub move_speed: f32,
    pub look_sensitivity: f32,
    pub spawn_distance: f32,
    pub follow_distance: f32,

    // Rasterizer
    pub ambient: f32,
    /// Shadow-map occlusion for point lights
    pub shadows: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            tile_size: 32,
            samples_per_pass: 1,
            target_samples: 256,
            max_depth: 12,
            threads: 0,
            direct_light: true,
            sky_top: [0.5, 0.7, 1.0],
            sky_bottom: [1.0, 1.0, 1.0],
            sphere_subdivisions: 3,
            move_speed: 0.1,
            look_sensitivity: 0.003,
            spawn_distance: 4.0,
            follow_distance: 4.0,
            ambient: 0.15,
            shadows: true,
        }
    }
}

impl EngineConfig {
    /// Default config file location.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("rastertrace");
            p.push("config.json");
            p
        })
    }

    /// Load from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| match Self::load_from(&p) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    tracing::debug!("no usable config at {}: {}", p.display(), e);
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        Ok(cfg.validated())
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<()> {
        match Self::path() {
            Some(p) => self.save_to(&p),
            None => Err(crate::util::Error::other("no config directory available")),
        }
    }

    /// Save as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Clamp values into usable ranges.
    pub fn validated(mut self) -> Self {
        let d = Self::default();
        self.width = self.width.clamp(1, 8192);
        self.height = self.height.clamp(1, 8192);
        self.tile_size = self.tile_size.clamp(1, 512);
        self.samples_per_pass = self.samples_per_pass.clamp(1, 1024);
        self.target_samples = self.target_samples.max(1);
        self.max_depth = self.max_depth.clamp(1, 128);
        self.sphere_subdivisions = self.sphere_subdivisions.min(6);
        for c in self.sky_top.iter_mut().chain(self.sky_bottom.iter_mut()) {
            if !c.is_finite() || *c < 0.0 {
                *c = 0.0;
            }
        }
        let positive = |v: f32, fallback: f32| if v.is_finite() && v > 0.0 { v } else { fallback };
        self.move_speed = positive(self.move_speed, d.move_speed);
        self.look_sensitivity = positive(self.look_sensitivity, d.look_sensitivity);
        self.spawn_distance = positive(self.spawn_distance, d.spawn_distance);
        self.follow_distance = positive(self.follow_distance, d.follow_distance);
        self.ambient = if self.ambient.is_finite() {
            self.ambient.clamp(0.0, 1.0)
        } else {
            d.ambient
        };
        self
    }

    /// Resolved worker count.
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let cfg = EngineConfig {
            width: 320,
            target_samples: 16,
            ..Default::default()
        };
        cfg.save_to(&path).unwrap();
        let back = EngineConfig::load_from(&path).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "width": 100 }"#).unwrap();
        let cfg = EngineConfig::load_from(&path).unwrap();
        assert_eq!(cfg.width, 100);
        assert_eq!(cfg.height, EngineConfig::default().height);
    }

    #[test]
    fn test_validated_clamps() {
        let cfg = EngineConfig {
            width: 0,
            tile_size: 0,
            samples_per_pass: 0,
            move_speed: -1.0,
            ambient: f32::NAN,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.width, 1);
        assert_eq!(cfg.tile_size, 1);
        assert_eq!(cfg.samples_per_pass, 1);
        assert_eq!(cfg.move_speed, EngineConfig::default().move_speed);
        assert_eq!(cfg.ambient, EngineConfig::default().ambient);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load_from(&dir.path().join("nope.json")).is_err());
    }
}
