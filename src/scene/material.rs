//! Object materials and the caller-facing property record.
//!
//! Engine-side a material is a tagged [`Material`] variant. Callers exchange
//! the flat [`MaterialProperties`] record instead: a colour, a numeric type
//! code and one variant-specific scalar (`extra_prop`).
//!
//! | code | variant | `extra_prop`          | range        | default |
//! |------|---------|-----------------------|--------------|---------|
//! | 0    | Diffuse | unused                | 0            | 0       |
//! | 1    | Metal   | roughness             | [0, 1]       | 0       |
//! | 2    | Glass   | index of refraction   | [0.1, 5]     | 1.5     |
//! | 3    | Light   | emissive brightness   | [0.1, 100]   | 5       |
//!
//! Light colours keep raw float channels (possibly above 1.0). Brightness is
//! a separate scalar and is never derived from colour magnitude.

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result, Vec3};

pub const ROUGHNESS_RANGE: (f32, f32) = (0.0, 1.0);
pub const IOR_RANGE: (f32, f32) = (0.1, 5.0);
pub const BRIGHTNESS_RANGE: (f32, f32) = (0.1, 100.0);

pub const DEFAULT_ROUGHNESS: f32 = 0.0;
pub const DEFAULT_IOR: f32 = 1.5;
pub const DEFAULT_BRIGHTNESS: f32 = 5.0;

/// Default colour for new objects (mid-gray).
pub const DEFAULT_COLOR: Vec3 = Vec3::splat(0.5);

/// Numeric material type code used at the caller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MaterialKind {
    Diffuse = 0,
    Metal = 1,
    Glass = 2,
    Light = 3,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 4] = [
        MaterialKind::Diffuse,
        MaterialKind::Metal,
        MaterialKind::Glass,
        MaterialKind::Light,
    ];

    /// Default `extra_prop` for this variant.
    pub fn default_extra(self) -> f32 {
        match self {
            MaterialKind::Diffuse => 0.0,
            MaterialKind::Metal => DEFAULT_ROUGHNESS,
            MaterialKind::Glass => DEFAULT_IOR,
            MaterialKind::Light => DEFAULT_BRIGHTNESS,
        }
    }

    /// Clamp a scalar into this variant's `extra_prop` range.
    /// Non-finite input falls back to the default.
    pub fn clamp_extra(self, v: f32) -> f32 {
        if !v.is_finite() {
            return self.default_extra();
        }
        let (lo, hi) = match self {
            MaterialKind::Diffuse => return 0.0,
            MaterialKind::Metal => ROUGHNESS_RANGE,
            MaterialKind::Glass => IOR_RANGE,
            MaterialKind::Light => BRIGHTNESS_RANGE,
        };
        v.clamp(lo, hi)
    }

    pub fn name(self) -> &'static str {
        match self {
            MaterialKind::Diffuse => "diffuse",
            MaterialKind::Metal => "metal",
            MaterialKind::Glass => "glass",
            MaterialKind::Light => "light",
        }
    }
}

impl TryFrom<u32> for MaterialKind {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        match code {
            0 => Ok(MaterialKind::Diffuse),
            1 => Ok(MaterialKind::Metal),
            2 => Ok(MaterialKind::Glass),
            3 => Ok(MaterialKind::Light),
            other => Err(Error::InvalidMaterialType(other)),
        }
    }
}

/// Surface material of a scene object. Exactly one variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Material {
    Diffuse { color: Vec3 },
    Metal { color: Vec3, roughness: f32 },
    Glass { color: Vec3, ior: f32 },
    Light { color: Vec3, brightness: f32 },
}

impl Default for Material {
    fn default() -> Self {
        Material::Diffuse {
            color: DEFAULT_COLOR,
        }
    }
}

impl Material {
    pub fn diffuse(color: Vec3) -> Self {
        Material::Diffuse {
            color: clamp_color(color, MaterialKind::Diffuse),
        }
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Material::Metal {
            color: clamp_color(color, MaterialKind::Metal),
            roughness: MaterialKind::Metal.clamp_extra(roughness),
        }
    }

    pub fn glass(color: Vec3, ior: f32) -> Self {
        Material::Glass {
            color: clamp_color(color, MaterialKind::Glass),
            ior: MaterialKind::Glass.clamp_extra(ior),
        }
    }

    pub fn light(color: Vec3, brightness: f32) -> Self {
        Material::Light {
            color: clamp_color(color, MaterialKind::Light),
            brightness: MaterialKind::Light.clamp_extra(brightness),
        }
    }

    /// Build a variant from parts, clamping colour and scalar.
    pub fn from_parts(kind: MaterialKind, color: Vec3, extra: f32) -> Self {
        match kind {
            MaterialKind::Diffuse => Self::diffuse(color),
            MaterialKind::Metal => Self::metal(color, extra),
            MaterialKind::Glass => Self::glass(color, extra),
            MaterialKind::Light => Self::light(color, extra),
        }
    }

    pub fn kind(&self) -> MaterialKind {
        match self {
            Material::Diffuse { .. } => MaterialKind::Diffuse,
            Material::Metal { .. } => MaterialKind::Metal,
            Material::Glass { .. } => MaterialKind::Glass,
            Material::Light { .. } => MaterialKind::Light,
        }
    }

    pub fn color(&self) -> Vec3 {
        match *self {
            Material::Diffuse { color }
            | Material::Metal { color, .. }
            | Material::Glass { color, .. }
            | Material::Light { color, .. } => color,
        }
    }

    /// The variant-specific scalar (0 for Diffuse).
    pub fn extra(&self) -> f32 {
        match *self {
            Material::Diffuse { .. } => 0.0,
            Material::Metal { roughness, .. } => roughness,
            Material::Glass { ior, .. } => ior,
            Material::Light { brightness, .. } => brightness,
        }
    }

    /// Emitted radiance (zero for non-lights).
    pub fn emission(&self) -> Vec3 {
        match *self {
            Material::Light { color, brightness } => color * brightness,
            _ => Vec3::ZERO,
        }
    }

    pub fn is_light(&self) -> bool {
        matches!(self, Material::Light { .. })
    }

    /// Same variant with colour and scalar pulled back into range.
    pub fn sanitized(&self) -> Material {
        Material::from_parts(self.kind(), self.color(), self.extra())
    }

    /// Apply a caller-supplied property record.
    ///
    /// Switching variant remaps `extra_prop`: a value that merely echoes the
    /// previous variant's scalar is replaced with the new variant's default,
    /// anything else is clamped into the new range.
    pub fn apply(&self, props: &MaterialProperties) -> Result<Material> {
        let kind = MaterialKind::try_from(props.material_type)?;
        if kind != self.kind() && props.extra_prop == self.extra() {
            return Ok(Material::from_parts(kind, props.color(), kind.default_extra()));
        }
        props.to_material()
    }
}

/// Clamp colour channels: [0,1] for reflective variants, >= 0 for lights.
pub fn clamp_color(c: Vec3, kind: MaterialKind) -> Vec3 {
    let f = |v: f32| {
        if !v.is_finite() {
            0.0
        } else if kind == MaterialKind::Light {
            v.max(0.0)
        } else {
            v.clamp(0.0, 1.0)
        }
    };
    Vec3::new(f(c.x), f(c.y), f(c.z))
}

/// Flat material record exchanged with callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties {
    pub mat_is_editable: bool,
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub material_type: u32,
    pub extra_prop: f32,
}

impl MaterialProperties {
    pub fn new(editable: bool, color: Vec3, kind: MaterialKind, extra: f32) -> Self {
        Self {
            mat_is_editable: editable,
            r: color.x,
            g: color.y,
            b: color.z,
            material_type: kind as u32,
            extra_prop: extra,
        }
    }

    /// Snapshot of an engine material.
    pub fn from_material(material: &Material, editable: bool) -> Self {
        Self::new(editable, material.color(), material.kind(), material.extra())
    }

    pub fn color(&self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    /// Decode into an engine material, validating the type code.
    pub fn to_material(&self) -> Result<Material> {
        let kind = MaterialKind::try_from(self.material_type)?;
        Ok(Material::from_parts(kind, self.color(), self.extra_prop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(kind: u32, extra: f32) -> MaterialProperties {
        MaterialProperties {
            mat_is_editable: true,
            r: 0.2,
            g: 0.4,
            b: 0.6,
            material_type: kind,
            extra_prop: extra,
        }
    }

    #[test]
    fn test_kind_codes() {
        for kind in MaterialKind::ALL {
            assert_eq!(MaterialKind::try_from(kind as u32).unwrap(), kind);
        }
        assert!(matches!(
            MaterialKind::try_from(4),
            Err(Error::InvalidMaterialType(4))
        ));
    }

    #[test]
    fn test_extra_clamped() {
        let m = Material::default().apply(&props(1, 3.0)).unwrap();
        assert_eq!(m, Material::metal(Vec3::new(0.2, 0.4, 0.6), 1.0));

        let m = Material::default().apply(&props(2, 0.05)).unwrap();
        assert_eq!(m.extra(), 0.1);

        // Diffuse carries 0, so a 0 arriving with a switch is a stale echo
        let m = Material::default().apply(&props(2, 0.0)).unwrap();
        assert_eq!(m.extra(), DEFAULT_IOR);

        let m = Material::default().apply(&props(3, 1000.0)).unwrap();
        assert_eq!(m.extra(), 100.0);

        let m = Material::default().apply(&props(0, 42.0)).unwrap();
        assert_eq!(m.extra(), 0.0);
    }

    #[test]
    fn test_variant_switch_resets_stale_extra() {
        // Metal roughness 0.3 echoed back while switching to Glass
        let metal = Material::metal(Vec3::ONE, 0.3);
        let glass = metal.apply(&props(2, 0.3)).unwrap();
        assert_eq!(glass.kind(), MaterialKind::Glass);
        assert_eq!(glass.extra(), DEFAULT_IOR);

        // Explicit new value survives the switch
        let glass = metal.apply(&props(2, 2.4)).unwrap();
        assert_eq!(glass.extra(), 2.4);

        // IOR echoed while switching to Metal must not leak through as 1.0
        let metal = glass.apply(&props(1, 2.4)).unwrap();
        assert_eq!(metal.extra(), DEFAULT_ROUGHNESS);
    }

    #[test]
    fn test_light_keeps_overbright_color() {
        let p = MaterialProperties {
            r: 15.0,
            g: 15.0,
            b: 15.0,
            ..props(3, 10.0)
        };
        let m = Material::default().apply(&p).unwrap();
        assert_eq!(m.color(), Vec3::splat(15.0));
        assert_eq!(m.extra(), 10.0);
        assert_eq!(m.emission(), Vec3::splat(150.0));

        let back = MaterialProperties::from_material(&m, true);
        assert_eq!(back.r, 15.0);
        assert_eq!(back.extra_prop, 10.0);
    }

    #[test]
    fn test_reflective_color_clamped() {
        let m = Material::diffuse(Vec3::new(2.0, -1.0, f32::NAN));
        assert_eq!(m.color(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_invalid_type_rejected() {
        assert!(matches!(
            Material::default().apply(&props(9, 0.0)),
            Err(Error::InvalidMaterialType(9))
        ));
    }

    #[test]
    fn test_serde() {
        let m = Material::glass(Vec3::ONE, 1.33);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"type\":\"glass\""));
        let back: Material = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_sanitized_clamps_out_of_range_fields() {
        let raw = Material::Metal {
            color: Vec3::new(-3.0, 7.0, 0.5),
            roughness: 50.0,
        };
        assert_eq!(raw.sanitized(), Material::metal(Vec3::new(0.0, 1.0, 0.5), 1.0));

        let glass = Material::Glass { color: Vec3::ONE, ior: f32::NAN };
        assert_eq!(glass.sanitized().extra(), DEFAULT_IOR);

        let ok = Material::light(Vec3::new(2.0, 1.0, 1.0), 10.0);
        assert_eq!(ok.sanitized(), ok);
    }
}
