//! Field-level access to live objects.
//!
//! [`Reflect`] is the capability the snapshot engine needs from a host
//! object: list its fields, read one by name, write one by name. It is
//! usually implemented with `#[derive(Reflect)]`, which builds the field
//! table at compile time in declaration order.

use crate::value::{Value, ValueType};
use thiserror::Error;

/// Errors from reading or writing a single field.
///
/// These never abort a multi-field operation; callers log and move on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldAccessError {
    #[error("field '{field}' could not be read: {reason}")]
    Unreadable { field: String, reason: String },

    #[error("field '{field}' expects {expected}, got {found}")]
    Incompatible {
        field: String,
        expected: ValueType,
        found: &'static str,
    },
}

/// Name and declared type of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub value_type: ValueType,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, value_type: ValueType) -> Self {
        Self { name, value_type }
    }
}

/// Result of writing a field by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The field exists and now holds the value.
    Written,
    /// The object has no field with that name; the value was dropped.
    NotPresent,
}

/// Named field access on an object.
pub trait Reflect {
    /// Concrete runtime type name, used to derive identities.
    fn type_name(&self) -> &'static str;

    /// All instance fields in declaration order.
    fn fields(&self) -> Vec<FieldDescriptor>;

    /// Current value of `name`, or `None` when it holds null.
    fn read_field(&self, name: &str) -> Result<Option<Value>, FieldAccessError>;

    /// Overwrite `name` with `value`.
    fn write_field(&mut self, name: &str, value: Value) -> Result<WriteOutcome, FieldAccessError>;

    /// Declared type of `name`, if the field exists.
    fn field_type(&self, name: &str) -> Option<ValueType> {
        self.fields()
            .into_iter()
            .find(|field| field.name == name)
            .map(|field| field.value_type)
    }
}

/// One step of [`enumerate`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReading {
    pub descriptor: FieldDescriptor,
    pub value: Result<Option<Value>, FieldAccessError>,
}

/// Lazily reads each field of an object in declaration order.
pub struct FieldReadings<'a> {
    target: &'a dyn Reflect,
    descriptors: std::vec::IntoIter<FieldDescriptor>,
}

impl Iterator for FieldReadings<'_> {
    type Item = FieldReading;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.descriptors.next()?;
        let value = self.target.read_field(descriptor.name);
        Some(FieldReading { descriptor, value })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.descriptors.size_hint()
    }
}

/// Enumerate the fields of `target`, reading each value on demand.
///
/// Calling it again starts a fresh pass.
pub fn enumerate(target: &dyn Reflect) -> FieldReadings<'_> {
    FieldReadings {
        target,
        descriptors: target.fields().into_iter(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PrimitiveKind;

    /// Hand-written accessor with one field that always fails to read.
    struct Gauge {
        level: f32,
    }

    impl Reflect for Gauge {
        fn type_name(&self) -> &'static str {
            "Gauge"
        }

        fn fields(&self) -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::new("sensor", ValueType::Primitive(PrimitiveKind::String)),
                FieldDescriptor::new("level", ValueType::Primitive(PrimitiveKind::F32)),
            ]
        }

        fn read_field(&self, name: &str) -> Result<Option<Value>, FieldAccessError> {
            match name {
                "level" => Ok(Some(Value::Float32(self.level))),
                _ => Err(FieldAccessError::Unreadable {
                    field: name.to_string(),
                    reason: "sensor offline".to_string(),
                }),
            }
        }

        fn write_field(
            &mut self,
            name: &str,
            value: Value,
        ) -> Result<WriteOutcome, FieldAccessError> {
            match (name, value) {
                ("level", Value::Float32(f)) => {
                    self.level = f;
                    Ok(WriteOutcome::Written)
                }
                ("level", other) => Err(FieldAccessError::Incompatible {
                    field: name.to_string(),
                    expected: ValueType::Primitive(PrimitiveKind::F32),
                    found: other.kind(),
                }),
                _ => Ok(WriteOutcome::NotPresent),
            }
        }
    }

    #[test]
    fn test_enumerate_continues_past_unreadable_field() {
        let gauge = Gauge { level: 0.75 };
        let readings: Vec<_> = enumerate(&gauge).collect();

        assert_eq!(readings.len(), 2);
        assert!(readings[0].value.is_err());
        assert_eq!(readings[1].value, Ok(Some(Value::Float32(0.75))));
    }

    #[test]
    fn test_enumerate_is_restartable() {
        let gauge = Gauge { level: 1.0 };
        assert_eq!(enumerate(&gauge).count(), 2);
        assert_eq!(enumerate(&gauge).count(), 2);
    }

    #[test]
    fn test_field_type_lookup() {
        let gauge = Gauge { level: 1.0 };
        assert_eq!(
            gauge.field_type("level"),
            Some(ValueType::Primitive(PrimitiveKind::F32))
        );
        assert_eq!(gauge.field_type("missing"), None);
    }

    #[test]
    fn test_write_unknown_field_is_dropped() {
        let mut gauge = Gauge { level: 1.0 };
        let outcome = gauge.write_field("pressure", Value::Float32(3.0));
        assert_eq!(outcome, Ok(WriteOutcome::NotPresent));
        assert_eq!(gauge.level, 1.0);
    }
}
