//! File-backed snapshot store.
//!
//! The whole store lives in one JSON file. Every operation loads it, and
//! every write replaces it in full through a temporary file in the same
//! directory, so a failed write never leaves a truncated store behind.

use crate::codec::EncodedValue;
use crate::identity::ObjectIdentity;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Prefix of keys captured from plain fields.
const FIELD_PREFIX: &str = "FIELD&";

/// Prefix of keys captured from inspector-visible properties.
const PROPERTY_PREFIX: &str = "PROP&";

/// The store file exists but is not a valid store.
#[derive(Debug, Error)]
#[error("snapshot store {} is corrupt: {source}", path.display())]
pub struct CorruptStoreError {
    pub path: PathBuf,
    #[source]
    pub source: serde_json::Error,
}

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Corrupt(#[from] CorruptStoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("single-group store already holds {stored}, cannot add {requested}")]
    LayoutConflict {
        stored: ObjectIdentity,
        requested: ObjectIdentity,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a stored value came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    /// A plain instance field, `FIELD&<name>`.
    Field(String),
    /// An inspector property, `PROP&<name>&<kind>`.
    Property { name: String, kind: String },
    /// Anything else, kept verbatim.
    Other(String),
}

impl FieldKey {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// The plain field name, if this key came from a field.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{FIELD_PREFIX}{name}"),
            Self::Property { name, kind } => write!(f, "{PROPERTY_PREFIX}{name}&{kind}"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<&str> for FieldKey {
    fn from(s: &str) -> Self {
        if let Some(name) = s.strip_prefix(FIELD_PREFIX) {
            return Self::Field(name.to_string());
        }
        if let Some((name, kind)) = s
            .strip_prefix(PROPERTY_PREFIX)
            .and_then(|rest| rest.split_once('&'))
        {
            return Self::Property {
                name: name.to_string(),
                kind: kind.to_string(),
            };
        }
        Self::Other(s.to_string())
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|raw| Self::from(raw.as_str()))
    }
}

/// Stored values of one snapshot, keyed by provenance-tagged field name.
pub type SnapshotFields = BTreeMap<FieldKey, EncodedValue>;

/// A named set of captured field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "stateName")]
    pub name: String,

    #[serde(rename = "variables", default)]
    pub fields: SnapshotFields,
}

/// All snapshots of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotGroup {
    #[serde(rename = "targetId")]
    pub identity: ObjectIdentity,

    #[serde(rename = "states", default)]
    pub snapshots: Vec<Snapshot>,
}

impl SnapshotGroup {
    pub fn new(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            snapshots: Vec::new(),
        }
    }

    /// Find a snapshot by exact name.
    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }

    /// Replace the snapshot called `name`, or append it.
    pub fn upsert(&mut self, name: &str, fields: SnapshotFields) -> UpsertOutcome {
        match self.snapshots.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                existing.fields = fields;
                UpsertOutcome::Replaced
            }
            None => {
                self.snapshots.push(Snapshot {
                    name: name.to_string(),
                    fields,
                });
                UpsertOutcome::Created
            }
        }
    }

    /// Snapshot names in store order.
    pub fn names(&self) -> Vec<String> {
        self.snapshots.iter().map(|s| s.name.clone()).collect()
    }
}

/// Whether an upsert added a new snapshot or overwrote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// Top-level shape of the store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreLayout {
    /// A map from identity to group, holding any number of objects.
    #[default]
    Keyed,
    /// A single group written directly, for stores dedicated to one object.
    SingleGroup,
}

/// Identity to group mapping as held in memory.
pub type StoreContents = BTreeMap<ObjectIdentity, SnapshotGroup>;

/// Snapshot store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    layout: StoreLayout,
    pretty: bool,
}

impl SnapshotStore {
    /// Create a keyed store at `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layout: StoreLayout::Keyed,
            pretty: true,
        }
    }

    /// Set the top-level file layout.
    pub fn with_layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Write indented JSON (the default) or compact JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    /// Read every group in the store.
    ///
    /// A missing file, an empty file and a JSON `null` all read as an empty
    /// store. Anything else that does not parse fails the whole load.
    pub fn load_all(&self) -> Result<StoreContents, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.path.display(),
                    "Snapshot store not found, starting empty"
                );
                return Ok(StoreContents::new());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(StoreContents::new());
        }

        let corrupt = |source| CorruptStoreError {
            path: self.path.clone(),
            source,
        };

        let contents = match self.layout {
            StoreLayout::Keyed => serde_json::from_str::<Option<StoreContents>>(&content)
                .map_err(corrupt)?
                .unwrap_or_default(),
            StoreLayout::SingleGroup => serde_json::from_str::<Option<SnapshotGroup>>(&content)
                .map_err(corrupt)?
                .map(|group| StoreContents::from([(group.identity.clone(), group)]))
                .unwrap_or_default(),
        };

        for (key, group) in &contents {
            if *key != group.identity {
                tracing::warn!(
                    key = %key,
                    target_id = %group.identity,
                    "Snapshot group is filed under a different identity than it names"
                );
            }
        }

        Ok(contents)
    }

    /// Add or overwrite the snapshot `name` of `identity` and write the store.
    ///
    /// On failure the file on disk is left as it was.
    pub fn upsert(
        &self,
        identity: &ObjectIdentity,
        name: &str,
        fields: SnapshotFields,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut contents = self.load_all()?;

        if self.layout == StoreLayout::SingleGroup {
            if let Some(stored) = contents.keys().find(|k| *k != identity) {
                return Err(StoreError::LayoutConflict {
                    stored: stored.clone(),
                    requested: identity.clone(),
                });
            }
        }

        let group = contents
            .entry(identity.clone())
            .or_insert_with(|| SnapshotGroup::new(identity.clone()));
        let outcome = group.upsert(name, fields);

        self.write_all(&contents)?;
        tracing::info!(
            identity = %identity,
            snapshot = name,
            outcome = ?outcome,
            path = %self.path.display(),
            "Snapshot stored"
        );
        Ok(outcome)
    }

    /// Snapshot names of `identity` in store order; empty when unknown.
    pub fn list_names(&self, identity: &ObjectIdentity) -> Result<Vec<String>, StoreError> {
        Ok(self
            .load_all()?
            .get(identity)
            .map(SnapshotGroup::names)
            .unwrap_or_default())
    }

    /// The snapshot `name` of `identity`, matched exactly.
    pub fn get(
        &self,
        identity: &ObjectIdentity,
        name: &str,
    ) -> Result<Option<Snapshot>, StoreError> {
        let mut contents = self.load_all()?;
        Ok(contents.remove(identity).and_then(|group| {
            group.snapshots.into_iter().find(|s| s.name == name)
        }))
    }

    /// Replace the store file with `contents`.
    fn write_all(&self, contents: &StoreContents) -> Result<(), StoreError> {
        let json = match self.layout {
            StoreLayout::Keyed => self.to_json(contents)?,
            StoreLayout::SingleGroup => match contents.values().next() {
                Some(group) => self.to_json(group)?,
                None => "null".to_string(),
            },
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        Ok(())
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String, StoreError> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }
}
