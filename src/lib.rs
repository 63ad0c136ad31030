//! # rastertrace
//!
//! Interactive 3D scene editor core with two renderers: a real-time
//! software rasterizer for editing and a progressive multi-threaded path
//! tracer for final images.
//!
//! ## Modules
//!
//! - [`util`] - Math types, ray intersection helpers, errors
//! - [`config`] - Persistent engine configuration
//! - [`scene`] - Scene store, objects, materials, camera, presets, export
//! - [`raster`] - Software rasterization loop
//! - [`pathtracer`] - Scene snapshot, BVH, integrator, render jobs
//! - [`editor`] - Edit-mode state machine, selection, input, events
//!
//! ## Example
//!
//! ```no_run
//! use rastertrace::prelude::*;
//!
//! let mut ctl = Controller::new(EngineConfig::load());
//! ctl.load_scene(ScenePreset::CornellBox, None)?;
//! ctl.init_and_begin_game_loop();
//! ctl.enter_edit_mode();
//! let id = ctl.add_sphere(5.0);
//! ctl.enter_ray_tracing_mode();
//! # Ok::<(), rastertrace::Error>(())
//! ```

pub mod config;
pub mod editor;
pub mod pathtracer;
pub mod raster;
pub mod scene;
pub mod util;

pub use config::EngineConfig;
pub use util::{Error, Result};

/// Build date embedded by the build script.
pub const BUILD_DATE: &str = env!("RASTERTRACE_BUILD_DATE");
/// Build time embedded by the build script.
pub const BUILD_TIME: &str = env!("RASTERTRACE_BUILD_TIME");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::editor::{Controller, EngineEvent, GameStatus, Key};
    pub use crate::pathtracer::{RenderJob, RenderProgress, RenderSettings, RenderedImage, SceneSnapshot, WorkerPool};
    pub use crate::raster::{Framebuffer, Rasterizer};
    pub use crate::scene::{
        Camera, Material, MaterialKind, MaterialProperties, ObjectId, Primitive, Scene, ScenePreset,
        SceneState, Transform, TransformUpdate,
    };
    pub use crate::util::{Error, Result, Vec3};
}
