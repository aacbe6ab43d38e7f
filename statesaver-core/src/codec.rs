//! Conversion between runtime values and their portable JSON form.
//!
//! Composite values are written as fixed-shape records (`{x,y,z}`,
//! `{r,g,b,a}`, `{x,y,z,w}`, `{position,rotation,scale}`), enums as their
//! member name and everything else as a plain JSON scalar. Decoding is
//! always driven by the declared type of the destination field.

use crate::math::{Color, Quat, Transform, Vec3};
use crate::value::{EnumInfo, PrimitiveKind, Value, ValueType};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number};
use thiserror::Error;

/// Errors from decoding a stored value into a field's declared type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("'{member}' is not a member of enum {enum_name}")]
    UnknownEnumMember {
        enum_name: &'static str,
        member: String,
    },

    #[error("cannot convert {found} to {expected}")]
    TypeMismatch { expected: String, found: String },

    #[error("{kind} record is missing component '{component}'")]
    MissingComponent {
        kind: &'static str,
        component: &'static str,
    },
}

impl DecodeError {
    fn mismatch(expected: &ValueType, found: &EncodedValue) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.describe(),
        }
    }
}

/// A JSON scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
}

/// The stored form of one field value.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Scalar(Scalar),
    /// Enum member name. Reads back from disk as `Scalar::Text`.
    Enum(String),
    Vector(Vec3),
    Color(Color),
    Rotation(Quat),
    Transform(Transform),
    /// JSON that matches none of the known shapes, kept verbatim.
    Unrecognized(serde_json::Value),
}

impl EncodedValue {
    /// Short description used in decode errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Scalar(Scalar::Bool(b)) => format!("bool {b}"),
            Self::Scalar(Scalar::Number(n)) => format!("number {n}"),
            Self::Scalar(Scalar::Text(s)) => format!("string {s:?}"),
            Self::Enum(name) => format!("enum member {name:?}"),
            Self::Vector(_) => "vector record".to_string(),
            Self::Color(_) => "color record".to_string(),
            Self::Rotation(_) => "rotation record".to_string(),
            Self::Transform(_) => "transform record".to_string(),
            Self::Unrecognized(json) => format!("unrecognized value {json}"),
        }
    }

    /// Render as JSON in the on-disk shape.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Scalar(Scalar::Bool(b)) => Json::Bool(*b),
            Self::Scalar(Scalar::Number(n)) => Json::Number(n.clone()),
            Self::Scalar(Scalar::Text(s)) | Self::Enum(s) => Json::String(s.clone()),
            Self::Vector(v) => vec3_json(v),
            Self::Color(c) => record(&[("r", c.r), ("g", c.g), ("b", c.b), ("a", c.a)]),
            Self::Rotation(q) => quat_json(q),
            Self::Transform(t) => {
                let mut map = Map::new();
                map.insert("position".to_string(), vec3_json(&t.position));
                map.insert("rotation".to_string(), quat_json(&t.rotation));
                map.insert("scale".to_string(), vec3_json(&t.scale));
                Json::Object(map)
            }
            Self::Unrecognized(json) => json.clone(),
        }
    }

    /// Classify stored JSON by shape.
    ///
    /// Objects become composite records only when their keys match a known
    /// shape exactly, so `{x,y,z}` is a vector and `{x,y,z,w}` a rotation.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Json::Number(n) => Self::Scalar(Scalar::Number(n)),
            Json::String(s) => Self::Scalar(Scalar::Text(s)),
            Json::Object(map) => match classify_record(&map) {
                Some(record) => record,
                None => Self::Unrecognized(Json::Object(map)),
            },
            other => Self::Unrecognized(other),
        }
    }
}

impl Serialize for EncodedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EncodedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}

/// Encode a runtime value. Pure.
pub fn encode(value: &Value) -> EncodedValue {
    match value {
        Value::Bool(b) => EncodedValue::Scalar(Scalar::Bool(*b)),
        Value::Int(i) => EncodedValue::Scalar(Scalar::Number(Number::from(*i))),
        Value::UInt(u) => EncodedValue::Scalar(Scalar::Number(Number::from(*u))),
        Value::Float(f) => float_scalar(*f),
        Value::Float32(f) => float_scalar(widen_f32(*f)),
        Value::Char(c) => EncodedValue::Scalar(Scalar::Text(c.to_string())),
        Value::Text(s) => EncodedValue::Scalar(Scalar::Text(s.clone())),
        Value::Vector3(v) => EncodedValue::Vector(*v),
        Value::Color(c) => EncodedValue::Color(*c),
        Value::Rotation(q) => EncodedValue::Rotation(*q),
        Value::Enum(member) => EncodedValue::Enum(member.member.to_string()),
        Value::Transform(t) => EncodedValue::Transform(*t),
    }
}

/// Decode a stored value into `target`. Pure and deterministic.
pub fn decode(encoded: &EncodedValue, target: &ValueType) -> Result<Value, DecodeError> {
    match target {
        ValueType::Vector3 => match encoded {
            EncodedValue::Vector(v) => Ok(Value::Vector3(*v)),
            EncodedValue::Unrecognized(serde_json::Value::Object(map)) => {
                parse_vec3(map, "Vec3").map(Value::Vector3)
            }
            other => Err(DecodeError::mismatch(target, other)),
        },
        ValueType::Color => match encoded {
            EncodedValue::Color(c) => Ok(Value::Color(*c)),
            EncodedValue::Unrecognized(serde_json::Value::Object(map)) => {
                parse_color(map).map(Value::Color)
            }
            other => Err(DecodeError::mismatch(target, other)),
        },
        ValueType::Rotation => match encoded {
            EncodedValue::Rotation(q) => Ok(Value::Rotation(*q)),
            EncodedValue::Unrecognized(serde_json::Value::Object(map)) => {
                parse_quat(map).map(Value::Rotation)
            }
            other => Err(DecodeError::mismatch(target, other)),
        },
        ValueType::Transform => match encoded {
            EncodedValue::Transform(t) => Ok(Value::Transform(*t)),
            EncodedValue::Unrecognized(serde_json::Value::Object(map)) => {
                parse_transform(map).map(Value::Transform)
            }
            other => Err(DecodeError::mismatch(target, other)),
        },
        ValueType::Enum(info) => decode_enum(encoded, *info, target),
        ValueType::Primitive(kind) => coerce_primitive(encoded, *kind, target),
    }
}

fn decode_enum(
    encoded: &EncodedValue,
    info: &'static EnumInfo,
    target: &ValueType,
) -> Result<Value, DecodeError> {
    let name = match encoded {
        EncodedValue::Enum(name) | EncodedValue::Scalar(Scalar::Text(name)) => name,
        other => return Err(DecodeError::mismatch(target, other)),
    };

    info.member(name)
        .map(Value::Enum)
        .ok_or_else(|| DecodeError::UnknownEnumMember {
            enum_name: info.name,
            member: name.clone(),
        })
}

/// Best-effort conversion of a scalar into a primitive field type.
fn coerce_primitive(
    encoded: &EncodedValue,
    kind: PrimitiveKind,
    target: &ValueType,
) -> Result<Value, DecodeError> {
    let mismatch = || DecodeError::mismatch(target, encoded);

    let scalar = match encoded {
        EncodedValue::Scalar(scalar) => scalar,
        EncodedValue::Enum(name) => {
            return match kind {
                PrimitiveKind::String => Ok(Value::Text(name.clone())),
                _ => Err(mismatch()),
            };
        }
        _ => return Err(mismatch()),
    };

    match kind {
        PrimitiveKind::String => Ok(Value::Text(match scalar {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        })),
        PrimitiveKind::Bool => match scalar {
            Scalar::Bool(b) => Ok(Value::Bool(*b)),
            Scalar::Text(s) => parse_bool(s).map(Value::Bool).ok_or_else(mismatch),
            Scalar::Number(n) => n
                .as_f64()
                .map(|f| Value::Bool(f != 0.0))
                .ok_or_else(mismatch),
        },
        PrimitiveKind::Char => match scalar {
            Scalar::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(mismatch()),
                }
            }
            _ => Err(mismatch()),
        },
        PrimitiveKind::F32 | PrimitiveKind::F64 => {
            let f = match scalar {
                Scalar::Number(n) => n.as_f64(),
                Scalar::Text(s) => parse_float(s),
                Scalar::Bool(_) => None,
            }
            .ok_or_else(mismatch)?;
            Ok(if kind == PrimitiveKind::F32 {
                Value::Float32(f as f32)
            } else {
                Value::Float(f)
            })
        }
        PrimitiveKind::I8 | PrimitiveKind::I16 | PrimitiveKind::I32 | PrimitiveKind::I64 => {
            let i = match scalar {
                Scalar::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(integral_i64)),
                Scalar::Text(s) => s.trim().parse::<i64>().ok(),
                Scalar::Bool(_) => None,
            }
            .ok_or_else(mismatch)?;
            if fits_signed(i, kind) {
                Ok(Value::Int(i))
            } else {
                Err(mismatch())
            }
        }
        PrimitiveKind::U8 | PrimitiveKind::U16 | PrimitiveKind::U32 | PrimitiveKind::U64 => {
            let u = match scalar {
                Scalar::Number(n) => n
                    .as_u64()
                    .or_else(|| n.as_f64().and_then(integral_u64)),
                Scalar::Text(s) => s.trim().parse::<u64>().ok(),
                Scalar::Bool(_) => None,
            }
            .ok_or_else(mismatch)?;
            if fits_unsigned(u, kind) {
                Ok(Value::UInt(u))
            } else {
                Err(mismatch())
            }
        }
    }
}

fn fits_signed(i: i64, kind: PrimitiveKind) -> bool {
    match kind {
        PrimitiveKind::I8 => i8::try_from(i).is_ok(),
        PrimitiveKind::I16 => i16::try_from(i).is_ok(),
        PrimitiveKind::I32 => i32::try_from(i).is_ok(),
        _ => true,
    }
}

fn fits_unsigned(u: u64, kind: PrimitiveKind) -> bool {
    match kind {
        PrimitiveKind::U8 => u8::try_from(u).is_ok(),
        PrimitiveKind::U16 => u16::try_from(u).is_ok(),
        PrimitiveKind::U32 => u32::try_from(u).is_ok(),
        _ => true,
    }
}

fn integral_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn integral_u64(f: f64) -> Option<u64> {
    (f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64).then_some(f as u64)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_float(s: &str) -> Option<f64> {
    match s.trim() {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

/// Widen an `f32` through its shortest decimal spelling so that `0.1f32`
/// is stored as `0.1` and not `0.10000000149011612`.
fn widen_f32(f: f32) -> f64 {
    if f.is_finite() {
        f.to_string().parse::<f64>().unwrap_or(f64::from(f))
    } else {
        f64::from(f)
    }
}

fn float_scalar(f: f64) -> EncodedValue {
    EncodedValue::Scalar(match Number::from_f64(f) {
        Some(n) => Scalar::Number(n),
        None => Scalar::Text(non_finite_name(f).to_string()),
    })
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn component_json(f: f32) -> serde_json::Value {
    let wide = widen_f32(f);
    Number::from_f64(wide)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(non_finite_name(wide).to_string()))
}

fn record(components: &[(&str, f32)]) -> serde_json::Value {
    let map = components
        .iter()
        .map(|(key, value)| (key.to_string(), component_json(*value)))
        .collect::<Map<_, _>>();
    serde_json::Value::Object(map)
}

fn vec3_json(v: &Vec3) -> serde_json::Value {
    record(&[("x", v.x), ("y", v.y), ("z", v.z)])
}

fn quat_json(q: &Quat) -> serde_json::Value {
    record(&[("x", q.x), ("y", q.y), ("z", q.z), ("w", q.w)])
}

fn has_exact_keys(map: &Map<String, serde_json::Value>, keys: &[&str]) -> bool {
    map.len() == keys.len() && keys.iter().all(|k| map.contains_key(*k))
}

fn classify_record(map: &Map<String, serde_json::Value>) -> Option<EncodedValue> {
    if has_exact_keys(map, &["position", "rotation", "scale"]) {
        parse_transform(map).ok().map(EncodedValue::Transform)
    } else if has_exact_keys(map, &["r", "g", "b", "a"]) {
        parse_color(map).ok().map(EncodedValue::Color)
    } else if has_exact_keys(map, &["x", "y", "z", "w"]) {
        parse_quat(map).ok().map(EncodedValue::Rotation)
    } else if has_exact_keys(map, &["x", "y", "z"]) {
        parse_vec3(map, "Vec3").ok().map(EncodedValue::Vector)
    } else {
        None
    }
}

fn component(
    map: &Map<String, serde_json::Value>,
    kind: &'static str,
    name: &'static str,
) -> Result<f32, DecodeError> {
    let Some(json) = map.get(name) else {
        return Err(DecodeError::MissingComponent {
            kind,
            component: name,
        });
    };
    let parsed = match json {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_float(s),
        _ => None,
    };
    parsed.map(|f| f as f32).ok_or_else(|| DecodeError::TypeMismatch {
        expected: format!("number for {kind}.{name}"),
        found: json.to_string(),
    })
}

/// Records may lack components but never carry keys outside their shape.
fn reject_extra_keys(
    map: &Map<String, serde_json::Value>,
    keys: &[&str],
    kind: &'static str,
) -> Result<(), DecodeError> {
    match map.keys().find(|key| !keys.contains(&key.as_str())) {
        Some(extra) => Err(DecodeError::TypeMismatch {
            expected: format!("{kind} record"),
            found: format!("record with unexpected key '{extra}'"),
        }),
        None => Ok(()),
    }
}

fn parse_vec3(
    map: &Map<String, serde_json::Value>,
    kind: &'static str,
) -> Result<Vec3, DecodeError> {
    reject_extra_keys(map, &["x", "y", "z"], kind)?;
    Ok(Vec3::new(
        component(map, kind, "x")?,
        component(map, kind, "y")?,
        component(map, kind, "z")?,
    ))
}

fn parse_color(map: &Map<String, serde_json::Value>) -> Result<Color, DecodeError> {
    reject_extra_keys(map, &["r", "g", "b", "a"], "Color")?;
    Ok(Color::rgba(
        component(map, "Color", "r")?,
        component(map, "Color", "g")?,
        component(map, "Color", "b")?,
        component(map, "Color", "a")?,
    ))
}

fn parse_quat(map: &Map<String, serde_json::Value>) -> Result<Quat, DecodeError> {
    reject_extra_keys(map, &["x", "y", "z", "w"], "Quat")?;
    Ok(Quat::new(
        component(map, "Quat", "x")?,
        component(map, "Quat", "y")?,
        component(map, "Quat", "z")?,
        component(map, "Quat", "w")?,
    ))
}

fn parse_transform(map: &Map<String, serde_json::Value>) -> Result<Transform, DecodeError> {
    reject_extra_keys(map, &["position", "rotation", "scale"], "Transform")?;
    let part = |name: &'static str| match map.get(name) {
        Some(serde_json::Value::Object(inner)) => Ok(inner),
        _ => Err(DecodeError::MissingComponent {
            kind: "Transform",
            component: name,
        }),
    };

    Ok(Transform {
        position: parse_vec3(part("position")?, "Transform.position")?,
        rotation: parse_quat(part("rotation")?)?,
        scale: parse_vec3(part("scale")?, "Transform.scale")?,
    })
}
