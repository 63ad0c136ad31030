//! STL decoding (binary and ASCII).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::{CodecError, MeshData, Result};

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

/// Binary STL is identified by its size matching the declared triangle count.
pub(crate) fn looks_like_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_LEN + 4 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    count
        .checked_mul(TRIANGLE_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN + 4))
        .is_some_and(|expected| expected == bytes.len())
}

pub(crate) fn looks_like_ascii_stl(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    match std::str::from_utf8(head) {
        Ok(s) => s.trim_start().starts_with("solid") && s.contains("facet"),
        // Truncated multibyte char at the 512 boundary
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()])
            .map(|s| s.trim_start().starts_with("solid") && s.contains("facet"))
            .unwrap_or(false),
    }
}

/// Decode STL, picking binary or ASCII by content.
pub fn decode_stl(bytes: &[u8]) -> Result<MeshData> {
    if looks_like_binary_stl(bytes) {
        decode_stl_binary(bytes)
    } else if looks_like_ascii_stl(bytes) {
        decode_stl_ascii(bytes)
    } else {
        Err(CodecError::UnknownFormat)
    }
}

/// Decode binary STL. Facet normals are ignored.
pub fn decode_stl_binary(bytes: &[u8]) -> Result<MeshData> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(CodecError::Truncated(format!(
            "binary STL needs at least {} bytes, got {}",
            HEADER_LEN + 4,
            bytes.len()
        )));
    }

    let mut cur = Cursor::new(&bytes[HEADER_LEN..]);
    let count = cur.read_u32::<LittleEndian>()? as usize;
    let available = (bytes.len() - HEADER_LEN - 4) / TRIANGLE_LEN;
    if count > available {
        return Err(CodecError::Truncated(format!(
            "header declares {} triangles, data holds {}",
            count, available
        )));
    }

    let mut soup = Vec::with_capacity(count * 3);
    for _ in 0..count {
        // normal
        for _ in 0..3 {
            cur.read_f32::<LittleEndian>()?;
        }
        for _ in 0..3 {
            let x = cur.read_f32::<LittleEndian>()?;
            let y = cur.read_f32::<LittleEndian>()?;
            let z = cur.read_f32::<LittleEndian>()?;
            soup.push([x, y, z]);
        }
        // attribute byte count
        cur.read_u16::<LittleEndian>()?;
    }

    Ok(MeshData::from_triangle_soup(&soup))
}

/// Decode ASCII STL.
pub fn decode_stl_ascii(bytes: &[u8]) -> Result<MeshData> {
    let text = String::from_utf8_lossy(bytes);
    let mut soup = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("vertex") {
            continue;
        }
        let mut v = [0.0f32; 3];
        for c in v.iter_mut() {
            let tok = parts.next().ok_or_else(|| {
                CodecError::Invalid(format!("line {}: vertex needs 3 coordinates", line_no + 1))
            })?;
            *c = tok.parse().map_err(|_| {
                CodecError::Invalid(format!("line {}: bad coordinate '{}'", line_no + 1, tok))
            })?;
        }
        soup.push(v);
    }

    if soup.len() % 3 != 0 {
        return Err(CodecError::Invalid(format!(
            "vertex count {} is not a multiple of 3",
            soup.len()
        )));
    }

    Ok(MeshData::from_triangle_soup(&soup))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    pub(crate) fn binary_stl(tris: &[[[f32; 3]; 3]]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out.write_u32::<LittleEndian>(tris.len() as u32).unwrap();
        for tri in tris {
            for _ in 0..3 {
                out.write_f32::<LittleEndian>(0.0).unwrap();
            }
            for v in tri {
                for c in v {
                    out.write_f32::<LittleEndian>(*c).unwrap();
                }
            }
            out.write_u16::<LittleEndian>(0).unwrap();
        }
        out
    }

    #[test]
    fn test_binary_quad() {
        let bytes = binary_stl(&[
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
            [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        ]);
        assert!(looks_like_binary_stl(&bytes));
        let mesh = decode_stl(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.positions.len(), 4);
    }

    #[test]
    fn test_binary_truncated() {
        let mut bytes = binary_stl(&[[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            decode_stl_binary(&bytes),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn test_ascii() {
        let src = "solid test\n\
            facet normal 0 0 1\n\
              outer loop\n\
                vertex 0 0 0\n\
                vertex 1 0 0\n\
                vertex 0 1 0\n\
              endloop\n\
            endfacet\n\
            endsolid test\n";
        assert!(looks_like_ascii_stl(src.as_bytes()));
        let mesh = decode_stl(src.as_bytes()).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.positions[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ascii_bad_coordinate() {
        let src = "solid x\nfacet normal 0 0 1\nouter loop\nvertex 0 zero 0\n";
        assert!(matches!(
            decode_stl_ascii(src.as_bytes()),
            Err(CodecError::Invalid(_))
        ));
    }
}
