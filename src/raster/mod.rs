//! Software rasterization loop used for the live preview.

pub mod framebuffer;
pub mod renderer;
pub mod shadow;

pub use framebuffer::Framebuffer;
pub use renderer::{FrameStats, Rasterizer};
