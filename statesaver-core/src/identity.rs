//! Object identities used as store keys.
//!
//! An identity is the object's type name immediately followed by an
//! instance token. What the token is decides how long the identity lives:
//!
//! - a [`StableId`] or any other persisted `#[reflect(id)]` field survives
//!   restarts and object recreation;
//! - the default instance address only lives as long as the value stays at
//!   the same place in memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key of one object's snapshot group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectIdentity(String);

impl ObjectIdentity {
    /// Wrap an identity string supplied by the caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Type name concatenated with an instance token.
    pub fn derive(type_name: &str, instance_token: impl fmt::Display) -> Self {
        Self(format!("{type_name}{instance_token}"))
    }

    /// Identity of `target` keyed on its current memory address.
    ///
    /// Only valid while `target` is neither moved nor dropped.
    pub fn of_instance<T: ?Sized>(type_name: &str, target: &T) -> Self {
        let address = target as *const T as *const () as usize;
        Self::derive(type_name, address)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ObjectIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Objects that know their own store key.
pub trait Identify {
    fn identity(&self) -> ObjectIdentity;
}

/// A persistent instance token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    /// Create a new random ID
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StableId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StableId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
