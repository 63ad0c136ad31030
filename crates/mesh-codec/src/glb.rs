//! Binary glTF 2.0 decoding, geometry only.
//!
//! Reads the JSON and BIN chunks, then gathers every triangle primitive of
//! every mesh into a single indexed list. Node transforms are not applied.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Deserialize;
use std::io::Cursor;

use crate::{CodecError, MeshData, Result};

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const COMPONENT_U8: u32 = 5121;
const COMPONENT_U16: u32 = 5123;
const COMPONENT_U32: u32 = 5125;
const COMPONENT_F32: u32 = 5126;

const MODE_TRIANGLES: u32 = 4;

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    meshes: Vec<Mesh>,
    #[serde(default)]
    accessors: Vec<Accessor>,
    #[serde(default, rename = "bufferViews")]
    buffer_views: Vec<BufferView>,
}

#[derive(Deserialize)]
struct Mesh {
    #[serde(default)]
    primitives: Vec<Primitive>,
}

#[derive(Deserialize)]
struct Primitive {
    attributes: Attributes,
    indices: Option<usize>,
    mode: Option<u32>,
}

#[derive(Deserialize)]
struct Attributes {
    #[serde(rename = "POSITION")]
    position: Option<usize>,
}

#[derive(Deserialize)]
struct Accessor {
    #[serde(rename = "bufferView")]
    buffer_view: Option<usize>,
    #[serde(default, rename = "byteOffset")]
    byte_offset: usize,
    #[serde(rename = "componentType")]
    component_type: u32,
    count: usize,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct BufferView {
    #[serde(default)]
    buffer: usize,
    #[serde(default, rename = "byteOffset")]
    byte_offset: usize,
    #[serde(rename = "byteLength")]
    byte_length: usize,
    #[serde(rename = "byteStride")]
    byte_stride: Option<usize>,
}

/// Decode a `.glb` container.
pub fn decode_glb(bytes: &[u8]) -> Result<MeshData> {
    let (json, bin) = split_chunks(bytes)?;
    let doc: Document = serde_json::from_slice(json)?;

    let mut out = MeshData::default();
    for mesh in &doc.meshes {
        for prim in &mesh.primitives {
            let mode = prim.mode.unwrap_or(MODE_TRIANGLES);
            if mode != MODE_TRIANGLES {
                continue;
            }
            let Some(pos_idx) = prim.attributes.position else {
                continue;
            };
            let positions = read_positions(&doc, bin, pos_idx)?;
            let indices = match prim.indices {
                Some(i) => read_indices(&doc, bin, i)?,
                None => (0..positions.len() as u32).collect(),
            };

            let base = out.positions.len() as u32;
            if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(CodecError::Invalid(format!(
                    "index {} out of range ({} vertices)",
                    bad,
                    positions.len()
                )));
            }
            out.positions.extend(positions);
            out.indices.extend(indices.into_iter().map(|i| i + base));
        }
    }

    // Trailing partial triangle from a malformed index list
    let whole = out.indices.len() / 3 * 3;
    out.indices.truncate(whole);
    Ok(out)
}

fn split_chunks(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let mut cur = Cursor::new(bytes);
    let magic = cur.read_u32::<LittleEndian>()?;
    if magic != GLB_MAGIC {
        return Err(CodecError::Invalid("missing glTF magic".into()));
    }
    let version = cur.read_u32::<LittleEndian>()?;
    if version != 2 {
        return Err(CodecError::Invalid(format!(
            "unsupported glTF version {}",
            version
        )));
    }
    let total = cur.read_u32::<LittleEndian>()? as usize;
    if total > bytes.len() {
        return Err(CodecError::Truncated(format!(
            "header declares {} bytes, got {}",
            total,
            bytes.len()
        )));
    }

    let mut json: Option<&[u8]> = None;
    let mut bin: &[u8] = &[];
    let mut pos = 12usize;
    while pos + 8 <= total {
        let len = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let kind =
            u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]);
        let start = pos + 8;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= total)
            .ok_or_else(|| CodecError::Truncated("chunk exceeds file length".into()))?;
        match kind {
            CHUNK_JSON if json.is_none() => json = Some(&bytes[start..end]),
            CHUNK_BIN if bin.is_empty() => bin = &bytes[start..end],
            _ => {}
        }
        pos = end;
    }

    let json = json.ok_or_else(|| CodecError::Invalid("missing JSON chunk".into()))?;
    Ok((json, bin))
}

/// Returns the byte slice and element stride for an accessor.
fn accessor_bytes<'a>(
    doc: &Document,
    bin: &'a [u8],
    index: usize,
    elem_size: usize,
) -> Result<(&'a [u8], usize, usize)> {
    let acc = doc
        .accessors
        .get(index)
        .ok_or_else(|| CodecError::Invalid(format!("accessor {} not found", index)))?;
    let view_idx = acc
        .buffer_view
        .ok_or_else(|| CodecError::Invalid(format!("accessor {} has no buffer view", index)))?;
    let view = doc
        .buffer_views
        .get(view_idx)
        .ok_or_else(|| CodecError::Invalid(format!("buffer view {} not found", view_idx)))?;
    if view.buffer != 0 {
        return Err(CodecError::Invalid(
            "external buffers are not supported".into(),
        ));
    }

    let stride = view.byte_stride.unwrap_or(elem_size).max(elem_size);
    let overflow = || CodecError::Truncated(format!("accessor {} reads past its buffer", index));

    let view_end = view
        .byte_offset
        .checked_add(view.byte_length)
        .filter(|&end| end <= bin.len())
        .ok_or_else(overflow)?;
    let start = view
        .byte_offset
        .checked_add(acc.byte_offset)
        .filter(|&s| s <= view_end)
        .ok_or_else(overflow)?;
    // Bound the element count by what the view can hold before any math
    // or allocation depends on it
    if acc.count > (view_end - start) / stride + 1 {
        return Err(overflow());
    }
    let needed = match acc.count {
        0 => 0,
        n => stride
            .checked_mul(n - 1)
            .and_then(|b| b.checked_add(elem_size))
            .ok_or_else(overflow)?,
    };
    let end = start
        .checked_add(needed)
        .filter(|&e| e <= view_end)
        .ok_or_else(overflow)?;
    Ok((&bin[start..end], stride, acc.count))
}

fn read_positions(doc: &Document, bin: &[u8], index: usize) -> Result<Vec<[f32; 3]>> {
    let acc = doc
        .accessors
        .get(index)
        .ok_or_else(|| CodecError::Invalid(format!("accessor {} not found", index)))?;
    if acc.component_type != COMPONENT_F32 || acc.kind != "VEC3" {
        return Err(CodecError::Invalid(
            "POSITION must be a float VEC3 accessor".into(),
        ));
    }
    let (data, stride, count) = accessor_bytes(doc, bin, index, 12)?;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let mut cur = Cursor::new(&data[i * stride..i * stride + 12]);
        out.push([
            cur.read_f32::<LittleEndian>()?,
            cur.read_f32::<LittleEndian>()?,
            cur.read_f32::<LittleEndian>()?,
        ]);
    }
    Ok(out)
}

fn read_indices(doc: &Document, bin: &[u8], index: usize) -> Result<Vec<u32>> {
    let acc = doc
        .accessors
        .get(index)
        .ok_or_else(|| CodecError::Invalid(format!("accessor {} not found", index)))?;
    let size = match acc.component_type {
        COMPONENT_U8 => 1,
        COMPONENT_U16 => 2,
        COMPONENT_U32 => 4,
        other => {
            return Err(CodecError::Invalid(format!(
                "unsupported index component type {}",
                other
            )))
        }
    };
    let (data, stride, count) = accessor_bytes(doc, bin, index, size)?;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let mut cur = Cursor::new(&data[i * stride..i * stride + size]);
        out.push(match size {
            1 => cur.read_u8()? as u32,
            2 => cur.read_u16::<LittleEndian>()? as u32,
            _ => cur.read_u32::<LittleEndian>()?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn pad4(v: &mut Vec<u8>, fill: u8) {
        while v.len() % 4 != 0 {
            v.push(fill);
        }
    }

    const TRIANGLE_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1}]}],
        "accessors": [
            {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"},
            {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
        ],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 36},
            {"buffer": 0, "byteOffset": 36, "byteLength": 6}
        ],
        "buffers": [{"byteLength": 44}]
    }"#;

    /// Container around `json` with a single-triangle BIN chunk
    /// (three float VEC3 positions, then three u16 indices).
    fn glb_with(json: &str) -> Vec<u8> {
        let mut bin = Vec::new();
        for c in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bin.write_f32::<LittleEndian>(c).unwrap();
        }
        for i in [0u16, 1, 2] {
            bin.write_u16::<LittleEndian>(i).unwrap();
        }
        pad4(&mut bin, 0);

        let mut json = json.as_bytes().to_vec();
        pad4(&mut json, b' ');

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(GLB_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(2).unwrap();
        out.write_u32::<LittleEndian>(total as u32).unwrap();
        out.write_u32::<LittleEndian>(json.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(CHUNK_JSON).unwrap();
        out.extend_from_slice(&json);
        out.write_u32::<LittleEndian>(bin.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(CHUNK_BIN).unwrap();
        out.extend_from_slice(&bin);
        out
    }

    fn triangle_glb() -> Vec<u8> {
        glb_with(TRIANGLE_JSON)
    }

    #[test]
    fn test_decode_triangle() {
        let bytes = triangle_glb();
        assert_eq!(crate::detect_format(&bytes), Some(crate::MeshFormat::Glb));
        let mesh = crate::decode(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.positions[2], [0.0, 1.0, 0.0]);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_truncated_container() {
        let mut bytes = triangle_glb();
        bytes.truncate(bytes.len() - 8);
        assert!(decode_glb(&bytes).is_err());
    }

    #[test]
    fn test_wrong_version() {
        let mut bytes = triangle_glb();
        bytes[4] = 1;
        assert!(matches!(decode_glb(&bytes), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_huge_count_is_truncated_error() {
        let json = TRIANGLE_JSON.replace(
            r#""componentType": 5126, "count": 3"#,
            r#""componentType": 5126, "count": 4611686018427387907"#,
        );
        assert!(matches!(decode_glb(&glb_with(&json)), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_huge_byte_offset_is_truncated_error() {
        let json = TRIANGLE_JSON.replace(
            r#""byteOffset": 0, "byteLength": 36"#,
            r#""byteOffset": 18446744073709551611, "byteLength": 36"#,
        );
        assert!(matches!(decode_glb(&glb_with(&json)), Err(CodecError::Truncated(_))));

        let json = TRIANGLE_JSON.replace(
            r#""bufferView": 1, "componentType": 5123"#,
            r#""bufferView": 1, "byteOffset": 18446744073709551615, "componentType": 5123"#,
        );
        assert!(matches!(decode_glb(&glb_with(&json)), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_count_past_view_end() {
        let json = TRIANGLE_JSON.replace(r#""count": 3, "type": "VEC3""#, r#""count": 4, "type": "VEC3""#);
        assert!(matches!(decode_glb(&glb_with(&json)), Err(CodecError::Truncated(_))));
    }
}
