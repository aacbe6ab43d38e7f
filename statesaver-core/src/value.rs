//! Runtime values and declared field types.
//!
//! [`Value`] is what a field currently holds, [`ValueType`] is what a field is
//! declared to hold. [`FieldValue`] connects both to concrete Rust types so
//! the derive macros can read and write struct fields generically.

use crate::math::{Color, Quat, Transform, Vec3};
use std::fmt;

/// Static description of an enum whose members are stored by name.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumInfo {
    /// Type name used in diagnostics.
    pub name: &'static str,
    /// Member names in declaration order. The first one is the default.
    pub members: &'static [&'static str],
}

impl EnumInfo {
    /// Look up a member by its exact name.
    pub fn member(&'static self, name: &str) -> Option<EnumMember> {
        self.members
            .iter()
            .copied()
            .find(|m| *m == name)
            .map(|member| EnumMember { info: self, member })
    }
}

/// One member of a reflected enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumMember {
    pub info: &'static EnumInfo,
    pub member: &'static str,
}

impl EnumMember {
    /// Whether this is the first declared member, i.e. the zero value.
    pub fn is_first(&self) -> bool {
        self.info.members.first() == Some(&self.member)
    }
}

/// Primitive field types that round-trip through plain JSON scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::String => "String",
        }
    }
}

/// The declared type of a reflected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Primitive(PrimitiveKind),
    Vector3,
    Color,
    Rotation,
    Enum(&'static EnumInfo),
    Transform,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => f.write_str(kind.name()),
            Self::Vector3 => f.write_str("Vec3"),
            Self::Color => f.write_str("Color"),
            Self::Rotation => f.write_str("Quat"),
            Self::Enum(info) => write!(f, "enum {}", info.name),
            Self::Transform => f.write_str("Transform"),
        }
    }
}

/// A field's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Same as `Float` but remembers the value came from an `f32`, so it can
    /// be stored with its shortest single-precision spelling.
    Float32(f32),
    Char(char),
    Text(String),
    Vector3(Vec3),
    Color(Color),
    Rotation(Quat),
    Enum(EnumMember),
    Transform(Transform),
}

impl Value {
    /// Whether this is the zero value of its type.
    ///
    /// Strings and transforms behave like references and are never zero.
    pub fn is_default(&self) -> bool {
        match self {
            Self::Bool(b) => !*b,
            Self::Int(i) => *i == 0,
            Self::UInt(u) => *u == 0,
            Self::Float(f) => *f == 0.0,
            Self::Float32(f) => *f == 0.0,
            Self::Char(c) => *c == '\0',
            Self::Text(_) => false,
            Self::Vector3(v) => *v == Vec3::default(),
            Self::Color(c) => *c == Color::default(),
            Self::Rotation(q) => *q == Quat::default(),
            Self::Enum(member) => member.is_first(),
            Self::Transform(_) => false,
        }
    }

    /// Short description of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::UInt(_) => "unsigned integer",
            Self::Float(_) | Self::Float32(_) => "float",
            Self::Char(_) => "char",
            Self::Text(_) => "string",
            Self::Vector3(_) => "Vec3",
            Self::Color(_) => "Color",
            Self::Rotation(_) => "Quat",
            Self::Enum(_) => "enum",
            Self::Transform(_) => "Transform",
        }
    }
}

/// A Rust type that can live in a reflected field.
///
/// `to_value` returns `None` for null values (an empty `Option`), which are
/// never captured. `from_value` returns `None` when the value has the wrong
/// runtime kind for this type.
pub trait FieldValue: Sized {
    fn value_type() -> ValueType;
    fn to_value(&self) -> Option<Value>;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! signed_field_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn value_type() -> ValueType {
                ValueType::Primitive(PrimitiveKind::$kind)
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::Int(i64::from(*self)))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).ok(),
                    Value::UInt(u) => <$ty>::try_from(u).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

macro_rules! unsigned_field_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn value_type() -> ValueType {
                ValueType::Primitive(PrimitiveKind::$kind)
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::UInt(u64::from(*self)))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::UInt(u) => <$ty>::try_from(u).ok(),
                    Value::Int(i) => <$ty>::try_from(i).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

signed_field_value!(i8 => I8, i16 => I16, i32 => I32, i64 => I64);
unsigned_field_value!(u8 => U8, u16 => U16, u32 => U32, u64 => U64);

impl FieldValue for bool {
    fn value_type() -> ValueType {
        ValueType::Primitive(PrimitiveKind::Bool)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FieldValue for f32 {
    fn value_type() -> ValueType {
        ValueType::Primitive(PrimitiveKind::F32)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Float32(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float32(f) => Some(f),
            Value::Float(f) => Some(f as f32),
            _ => None,
        }
    }
}

impl FieldValue for f64 {
    fn value_type() -> ValueType {
        ValueType::Primitive(PrimitiveKind::F64)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Float(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            Value::Float32(f) => Some(f64::from(f)),
            _ => None,
        }
    }
}

impl FieldValue for char {
    fn value_type() -> ValueType {
        ValueType::Primitive(PrimitiveKind::Char)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Char(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Char(c) => Some(c),
            _ => None,
        }
    }
}

impl FieldValue for String {
    fn value_type() -> ValueType {
        ValueType::Primitive(PrimitiveKind::String)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.clone()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! composite_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn value_type() -> ValueType {
                ValueType::$variant
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::$variant(*self))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    )*};
}

composite_field_value!(
    Vec3 => Vector3,
    Color => Color,
    Quat => Rotation,
    Transform => Transform,
);

impl<T: FieldValue> FieldValue for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(T::to_value)
    }

    fn from_value(value: Value) -> Option<Self> {
        T::from_value(value).map(Some)
    }
}

/// An enum stored by member name rather than by ordinal.
///
/// Implemented by `#[derive(ReflectEnum)]`, which also provides the matching
/// [`FieldValue`] impl.
pub trait ReflectEnum: Sized + 'static {
    const INFO: &'static EnumInfo;

    fn member_name(&self) -> &'static str;

    fn from_member_name(name: &str) -> Option<Self>;

    /// This value as a runtime enum member.
    fn to_member(&self) -> EnumMember {
        EnumMember {
            info: Self::INFO,
            member: self.member_name(),
        }
    }
}
