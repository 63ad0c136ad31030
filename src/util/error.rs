//! Error types for the engine.

use thiserror::Error;

/// Main error type for engine operations.
///
/// Only asset loading, scene import, thread-pool provisioning and file IO
/// produce errors. Controller preconditions (no selection, wrong mode,
/// non-editable material) are logged no-ops instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Mesh or asset bytes failed to decode
    #[error("Malformed asset: {0}")]
    MalformedAsset(String),

    /// Material type code outside the known variants
    #[error("Invalid material type: {0} (expected 0..=3)")]
    InvalidMaterialType(u32),

    /// Non-positive or non-finite primitive parameters
    #[error("Invalid primitive: {0}")]
    InvalidPrimitive(String),

    /// Preset name not recognized
    #[error("Unknown scene preset: {0}")]
    UnknownPreset(String),

    /// Worker pool could not be created
    #[error("Thread pool initialization failed: {0}")]
    ThreadPoolInit(String),

    /// Imported scene state is structurally invalid
    #[error("Invalid scene data: {0}")]
    InvalidSceneData(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a malformed asset error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedAsset(msg.into())
    }
}

impl From<mesh_codec::CodecError> for Error {
    fn from(e: mesh_codec::CodecError) -> Self {
        Self::MalformedAsset(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPoolInit(e.to_string())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
