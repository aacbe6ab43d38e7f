//! Testing utilities for snapshot capture and apply.
//!
//! This module provides fixture objects for integration tests:
//! - `Mover` with a persistent identity and a mix of field kinds
//! - `Beacon` whose identity is its memory address
//! - `FlakySensor`, a hand-written `Reflect` impl with an unreadable field

use crate::identity::{Identify, ObjectIdentity, StableId};
use crate::math::{Color, Quat, Transform, Vec3};
use crate::reflect::{FieldAccessError, FieldDescriptor, WriteOutcome};
use crate::value::{FieldValue, Value};
use crate::{Reflect, ReflectEnum};

/// Movement style of a [`Mover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReflectEnum)]
pub enum Gait {
    #[default]
    Stand,
    Walk,
    Run,
    Sprint,
}

/// A moving object with one field of every common kind.
#[derive(Debug, Clone, PartialEq, Reflect)]
#[reflect(name = "Testing.Mover")]
pub struct Mover {
    #[reflect(id)]
    pub id: StableId,
    pub speed: f32,
    pub label: String,
    pub count: i32,
    pub gait: Gait,
    pub heading: Vec3,
    pub tint: Option<Color>,
}

impl Mover {
    /// Create a mover with `speed` and `label` and every other field zeroed.
    pub fn new(speed: f32, label: impl Into<String>) -> Self {
        Self {
            id: StableId::new(),
            speed,
            label: label.into(),
            count: 0,
            gait: Gait::Stand,
            heading: Vec3::ZERO,
            tint: None,
        }
    }
}

/// An object placed in the world, identified by address only.
#[derive(Debug, Clone, PartialEq, Reflect)]
#[reflect(name = "Testing.Beacon")]
pub struct Beacon {
    pub transform: Transform,
    pub spin: Quat,
    pub range: f64,
    pub channel: u8,
}

impl Default for Beacon {
    fn default() -> Self {
        Self {
            transform: Transform::IDENTITY,
            spin: Quat::IDENTITY,
            range: 10.0,
            channel: 1,
        }
    }
}

/// A legacy version of [`Mover`] without the `label` field.
#[derive(Debug, Clone, PartialEq, Reflect)]
#[reflect(name = "Testing.Mover")]
pub struct SlimMover {
    #[reflect(id)]
    pub id: StableId,
    pub speed: f32,
    pub count: i32,
}

/// A sensor whose `reading` field fails to read while `offline` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct FlakySensor {
    pub name: String,
    pub reading: f32,
    pub offline: bool,
}

impl Reflect for FlakySensor {
    fn type_name(&self) -> &'static str {
        "Testing.FlakySensor"
    }

    fn fields(&self) -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("name", String::value_type()),
            FieldDescriptor::new("reading", f32::value_type()),
        ]
    }

    fn read_field(&self, name: &str) -> Result<Option<Value>, FieldAccessError> {
        match name {
            "name" => Ok(self.name.to_value()),
            "reading" if self.offline => Err(FieldAccessError::Unreadable {
                field: name.to_string(),
                reason: "sensor offline".to_string(),
            }),
            "reading" => Ok(self.reading.to_value()),
            _ => Err(FieldAccessError::Unreadable {
                field: name.to_string(),
                reason: "no such field".to_string(),
            }),
        }
    }

    fn write_field(&mut self, name: &str, value: Value) -> Result<WriteOutcome, FieldAccessError> {
        let found = value.kind();
        let incompatible = |expected| FieldAccessError::Incompatible {
            field: name.to_string(),
            expected,
            found,
        };
        match name {
            "name" => {
                self.name =
                    String::from_value(value).ok_or_else(|| incompatible(String::value_type()))?;
            }
            "reading" => {
                self.reading =
                    f32::from_value(value).ok_or_else(|| incompatible(f32::value_type()))?;
            }
            _ => return Ok(WriteOutcome::NotPresent),
        }
        Ok(WriteOutcome::Written)
    }
}

impl Identify for FlakySensor {
    fn identity(&self) -> ObjectIdentity {
        ObjectIdentity::derive(self.type_name(), &self.name)
    }
}
