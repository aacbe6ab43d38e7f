//! Named snapshots of object field values.
//!
//! This crate provides:
//! - Field reflection through `#[derive(Reflect)]`
//! - A value codec that stores vectors, colors, rotations, transforms and
//!   enums in a stable JSON shape
//! - A single-file snapshot store keyed by object identity and snapshot name
//! - `StateSaver`, which captures a snapshot from a live object and applies
//!   one back onto it
//!
//! # Quick Start
//!
//! ```ignore
//! use statesaver_core::{Identify, Reflect, ReflectEnum, SaverConfig, StableId, StateSaver};
//!
//! #[derive(ReflectEnum)]
//! enum Gait { Stand, Walk, Run }
//!
//! #[derive(Reflect)]
//! struct Mover {
//!     #[reflect(id)]
//!     id: StableId,
//!     speed: f32,
//!     gait: Gait,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = StateSaver::new(SaverConfig::new("Assets/StateData.json"));
//!     let mut mover = Mover { id: StableId::new(), speed: 5.0, gait: Gait::Walk };
//!
//!     let id = mover.identity();
//!
//!     saver.capture(&mover, "checkpoint")?;
//!     mover.speed = 9.0;
//!     saver.apply(&mut mover, &id, "checkpoint")?;
//!     Ok(())
//! }
//! ```

extern crate self as statesaver_core;

pub mod codec;
pub mod identity;
pub mod math;
pub mod reflect;
pub mod saver;
pub mod store;
pub mod testing;
pub mod value;

// Re-export for convenience
pub use statesaver_macros::{Reflect, ReflectEnum};

// Primary public API
pub use codec::{decode, encode, DecodeError, EncodedValue, Scalar};
pub use identity::{Identify, ObjectIdentity, StableId};
pub use math::{Color, Quat, Transform, Vec3};
pub use reflect::{enumerate, FieldAccessError, FieldDescriptor, Reflect, WriteOutcome};
pub use saver::{ApplyReport, CaptureReport, SaverConfig, SaverError, StateSaver};
pub use store::{
    CorruptStoreError, FieldKey, Snapshot, SnapshotGroup, SnapshotStore, StoreError, StoreLayout,
};
pub use value::{EnumInfo, EnumMember, FieldValue, PrimitiveKind, ReflectEnum, Value, ValueType};

#[cfg(test)]
mod tests {
    use super::*;

    /// Facing direction
    #[derive(Debug, Clone, Copy, PartialEq, ReflectEnum)]
    #[reflect(name = "Facing")]
    enum Facing {
        North,
        #[reflect(rename = "Orient")]
        East,
        South,
    }

    #[derive(Reflect)]
    #[reflect(name = "Test.Lantern")]
    struct Lantern {
        #[reflect(id)]
        id: StableId,
        lit: bool,
        #[reflect(rename = "tint")]
        color: Color,
        facing: Facing,
        fuel: Option<f32>,
        #[reflect(skip)]
        #[allow(dead_code)]
        flicker_seed: u64,
    }

    fn lantern() -> Lantern {
        Lantern {
            id: StableId::new(),
            lit: true,
            color: Color::WHITE,
            facing: Facing::South,
            fuel: None,
            flicker_seed: 7,
        }
    }

    #[test]
    fn test_reflect_enum_derive() {
        assert_eq!(Facing::INFO.name, "Facing");
        assert_eq!(Facing::INFO.members, &["North", "Orient", "South"]);
        assert_eq!(Facing::East.member_name(), "Orient");
        assert_eq!(Facing::from_member_name("Orient"), Some(Facing::East));
        assert_eq!(Facing::from_member_name("East"), None);
    }

    #[test]
    fn test_reflect_derive_fields() {
        let lantern = lantern();
        let names: Vec<_> = lantern.fields().iter().map(|f| f.name).collect();

        assert_eq!(names, vec!["lit", "tint", "facing", "fuel"]);
        assert_eq!(lantern.field_type("tint"), Some(ValueType::Color));
        assert_eq!(lantern.field_type("flicker_seed"), None);
        assert_eq!(lantern.read_field("fuel"), Ok(None));
    }

    #[test]
    fn test_reflect_derive_write() {
        let mut lantern = lantern();

        assert_eq!(
            lantern.write_field("facing", Value::Enum(Facing::North.to_member())),
            Ok(WriteOutcome::Written)
        );
        assert_eq!(lantern.facing, Facing::North);

        assert_eq!(
            lantern.write_field("fuel", Value::Float32(0.5)),
            Ok(WriteOutcome::Written)
        );
        assert_eq!(lantern.fuel, Some(0.5));

        assert_eq!(
            lantern.write_field("wick", Value::Bool(true)),
            Ok(WriteOutcome::NotPresent)
        );
        assert!(matches!(
            lantern.write_field("lit", Value::Int(1)),
            Err(FieldAccessError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_identity_uses_id_field() {
        let lantern = lantern();
        assert_eq!(
            lantern.identity().as_str(),
            format!("Test.Lantern{}", lantern.id)
        );
        assert_eq!(lantern.type_name(), "Test.Lantern");
    }
}
