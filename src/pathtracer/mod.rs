//! Progressive CPU path tracer.
//!
//! ## Architecture
//! ```text
//! Scene -> SceneSnapshot (flat primitives, SAH BVH) -> RenderJob passes on WorkerPool -> RenderedImage
//! ```
//!
//! The snapshot is taken once per job, so the live scene can keep changing
//! without affecting an in-flight render.

pub mod build;
pub mod bvh;
pub mod integrator;
pub mod job;
pub mod pool;
pub mod snapshot;

pub use job::{RenderJob, RenderProgress, RenderSettings, RenderedImage};
pub use pool::WorkerPool;
pub use snapshot::SceneSnapshot;
