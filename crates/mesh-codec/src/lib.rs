//! Minimal triangle mesh decoding.
//!
//! Turns raw asset bytes into an indexed triangle list. Supported inputs:
//!
//! - binary STL
//! - ASCII STL
//! - binary glTF 2.0 (`.glb`), triangle primitives with float positions
//!
//! Everything else (materials, textures, animation, node hierarchies) is
//! ignored; only geometry is returned.
//!
//! ## Example
//!
//! ```ignore
//! let mesh = mesh_codec::decode(&std::fs::read("bunny.stl")?)?;
//! println!("{} triangles", mesh.triangle_count());
//! ```

mod glb;
mod stl;

use std::collections::HashMap;
use thiserror::Error;

pub use glb::decode_glb;
pub use stl::{decode_stl, decode_stl_ascii, decode_stl_binary};

/// Errors produced while decoding mesh bytes.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Input is empty
    #[error("empty input")]
    Empty,

    /// Input format could not be identified
    #[error("unrecognized mesh format")]
    UnknownFormat,

    /// Input ended before the declared data
    #[error("truncated data: {0}")]
    Truncated(String),

    /// Structurally invalid data
    #[error("invalid mesh data: {0}")]
    Invalid(String),

    /// Decoded successfully but contains no triangles
    #[error("mesh contains no triangles")]
    NoTriangles,

    /// glTF JSON chunk failed to parse
    #[error("invalid glTF JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying read error
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Recognized container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    StlBinary,
    StlAscii,
    Glb,
}

/// Decoded indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Triangle list, three indices per triangle.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Build an indexed mesh from a flat triangle soup, merging bit-identical
    /// vertices.
    pub fn from_triangle_soup(soup: &[[f32; 3]]) -> Self {
        let mut positions = Vec::new();
        let mut indices = Vec::with_capacity(soup.len());
        let mut lookup: HashMap<[u32; 3], u32> = HashMap::new();

        for p in soup {
            let key = [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()];
            let idx = *lookup.entry(key).or_insert_with(|| {
                positions.push(*p);
                (positions.len() - 1) as u32
            });
            indices.push(idx);
        }

        Self { positions, indices }
    }

    /// Check index bounds, finiteness and triangle count.
    pub fn validate(&self) -> Result<()> {
        if self.indices.is_empty() {
            return Err(CodecError::NoTriangles);
        }
        if self.indices.len() % 3 != 0 {
            return Err(CodecError::Invalid(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let n = self.positions.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= n) {
            return Err(CodecError::Invalid(format!(
                "index {} out of range ({} vertices)",
                bad, n
            )));
        }
        if self.positions.iter().flatten().any(|c| !c.is_finite()) {
            return Err(CodecError::Invalid("non-finite vertex position".into()));
        }
        Ok(())
    }
}

/// Guess the container format from the leading bytes.
pub fn detect_format(bytes: &[u8]) -> Option<MeshFormat> {
    if bytes.len() >= 4 && &bytes[0..4] == b"glTF" {
        return Some(MeshFormat::Glb);
    }
    if stl::looks_like_binary_stl(bytes) {
        return Some(MeshFormat::StlBinary);
    }
    if stl::looks_like_ascii_stl(bytes) {
        return Some(MeshFormat::StlAscii);
    }
    None
}

/// Decode mesh bytes of any supported format.
pub fn decode(bytes: &[u8]) -> Result<MeshData> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    let mesh = match detect_format(bytes).ok_or(CodecError::UnknownFormat)? {
        MeshFormat::Glb => decode_glb(bytes)?,
        MeshFormat::StlBinary => decode_stl_binary(bytes)?,
        MeshFormat::StlAscii => decode_stl_ascii(bytes)?,
    };
    mesh.validate()?;
    Ok(mesh)
}
