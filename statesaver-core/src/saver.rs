//! StateSaver - capture and apply snapshots on live objects.
//!
//! This is the entry point host tooling calls. It ties the field
//! reflector, the value codec and the snapshot store together:
//!
//! - `capture` reads every field, drops null and zero values, encodes the
//!   rest and stores them under a snapshot name;
//! - `apply` looks a snapshot up and writes each stored value back into the
//!   field of the same name, skipping anything that no longer fits.

use crate::codec::{self, DecodeError};
use crate::identity::{Identify, ObjectIdentity};
use crate::reflect::{self, FieldAccessError, Reflect, WriteOutcome};
use crate::store::{
    FieldKey, SnapshotFields, SnapshotStore, StoreError, StoreLayout, UpsertOutcome,
};
use std::cell::Cell;
use std::path::PathBuf;
use thiserror::Error;

/// Store path used when none is configured.
pub const DEFAULT_STORE_PATH: &str = "Assets/StateData.json";

/// Snapshot name used when the caller passes an empty one.
pub const DEFAULT_SNAPSHOT_NAME: &str = "NewState";

/// Environment variable overriding the store path.
pub const STORE_PATH_ENV: &str = "STATESAVER_STORE_PATH";

/// Environment variable overriding the default snapshot name.
pub const DEFAULT_NAME_ENV: &str = "STATESAVER_DEFAULT_NAME";

/// Errors from StateSaver operations.
#[derive(Debug, Error)]
pub enum SaverError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No snapshot named '{name}' for {identity}")]
    SnapshotNotFound {
        identity: ObjectIdentity,
        name: String,
    },

    #[error("Another capture or apply is already running ({phase:?})")]
    Busy { phase: Phase },
}

/// Configuration for a [`StateSaver`].
#[derive(Debug, Clone)]
pub struct SaverConfig {
    /// Path of the JSON store file.
    pub store_path: PathBuf,

    /// Name used when a capture is requested with an empty name.
    pub default_name: String,

    /// Top-level layout of the store file.
    pub layout: StoreLayout,

    /// Write indented JSON.
    pub pretty: bool,
}

impl SaverConfig {
    /// Create a config for the store at `store_path`.
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            default_name: DEFAULT_SNAPSHOT_NAME.to_string(),
            layout: StoreLayout::Keyed,
            pretty: true,
        }
    }

    /// Defaults, overridden by `STATESAVER_STORE_PATH` and
    /// `STATESAVER_DEFAULT_NAME` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            config.store_path = path.into();
        }
        if let Ok(name) = std::env::var(DEFAULT_NAME_ENV) {
            if !name.is_empty() {
                config.default_name = name;
            }
        }
        config
    }

    /// Set the name used for empty snapshot names.
    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Set the store file layout.
    pub fn with_layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Choose between indented and compact JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

/// Where an operation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Reflecting,
    Encoding,
    Persisting,
    Decoding,
    Mutating,
}

/// A field that could not be captured or applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub field: String,
    pub reason: FieldFailureReason,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldFailureReason {
    #[error(transparent)]
    Access(#[from] FieldAccessError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Summary of a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub identity: ObjectIdentity,
    /// The name the snapshot was stored under.
    pub name: String,
    /// Fields written to the snapshot.
    pub stored: Vec<String>,
    /// Fields left out because they were null or zero.
    pub skipped: Vec<String>,
    /// Fields that could not be read.
    pub unreadable: Vec<FieldFailure>,
    pub outcome: UpsertOutcome,
}

/// Summary of an apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Fields written back onto the target.
    pub applied: Vec<String>,
    /// Stored fields the target no longer has.
    pub not_present: Vec<String>,
    /// Fields whose stored value could not be decoded or written.
    pub failed: Vec<FieldFailure>,
    /// Stored keys that are not plain fields.
    pub ignored_keys: Vec<String>,
}

impl ApplyReport {
    /// Whether every stored plain field was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_present.is_empty()
    }
}

/// Resets the phase to idle when an operation ends, however it ends.
struct PhaseGuard<'a> {
    phase: &'a Cell<Phase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a Cell<Phase>, first: Phase) -> Result<Self, SaverError> {
        match phase.get() {
            Phase::Idle => {
                phase.set(first);
                Ok(Self { phase })
            }
            busy => Err(SaverError::Busy { phase: busy }),
        }
    }

    fn advance(&self, next: Phase) {
        tracing::trace!(from = ?self.phase.get(), to = ?next, "Phase change");
        self.phase.set(next);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.set(Phase::Idle);
    }
}

/// Captures and applies snapshots against one store.
///
/// Operations run to completion on the calling thread. A saver refuses to
/// start an operation while another one is in flight.
pub struct StateSaver {
    store: SnapshotStore,
    default_name: String,
    phase: Cell<Phase>,
}

impl StateSaver {
    /// Create a saver from configuration. The store is not touched yet.
    pub fn new(config: SaverConfig) -> Self {
        let store = SnapshotStore::new(config.store_path)
            .with_layout(config.layout)
            .with_pretty(config.pretty);
        Self {
            store,
            default_name: config.default_name,
            phase: Cell::new(Phase::Idle),
        }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Current phase, `Idle` between operations.
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Capture `target` under `name`, keyed by the target's own identity.
    pub fn capture<T>(&self, target: &T, name: &str) -> Result<CaptureReport, SaverError>
    where
        T: Reflect + Identify,
    {
        self.capture_as(target, &target.identity(), name)
    }

    /// Capture `target` under `name`, keyed by a caller-supplied identity.
    pub fn capture_as(
        &self,
        target: &dyn Reflect,
        identity: &ObjectIdentity,
        name: &str,
    ) -> Result<CaptureReport, SaverError> {
        let guard = PhaseGuard::enter(&self.phase, Phase::Reflecting)?;
        let name = if name.is_empty() {
            self.default_name.as_str()
        } else {
            name
        };

        tracing::debug!(
            identity = %identity,
            snapshot = name,
            type_name = target.type_name(),
            "Capturing snapshot"
        );

        let mut fields = SnapshotFields::new();
        let mut stored = Vec::new();
        let mut skipped = Vec::new();
        let mut unreadable = Vec::new();

        for reading in reflect::enumerate(target) {
            let field = reading.descriptor.name;
            match reading.value {
                Ok(Some(value)) if !value.is_default() => {
                    guard.advance(Phase::Encoding);
                    fields.insert(FieldKey::field(field), codec::encode(&value));
                    stored.push(field.to_string());
                }
                Ok(_) => skipped.push(field.to_string()),
                Err(err) => {
                    tracing::warn!(
                        field,
                        expected = %reading.descriptor.value_type,
                        error = %err,
                        "Could not read field, leaving it out of the snapshot"
                    );
                    unreadable.push(FieldFailure {
                        field: field.to_string(),
                        reason: err.into(),
                    });
                }
            }
            guard.advance(Phase::Reflecting);
        }

        guard.advance(Phase::Persisting);
        let outcome = self.store.upsert(identity, name, fields)?;

        Ok(CaptureReport {
            identity: identity.clone(),
            name: name.to_string(),
            stored,
            skipped,
            unreadable,
            outcome,
        })
    }

    /// Apply the snapshot `name` of `identity` onto `target`.
    ///
    /// Fails without touching `target` when the snapshot does not exist.
    /// Otherwise every field is attempted; per-field failures are logged
    /// and reported but never stop the remaining fields.
    pub fn apply(
        &self,
        target: &mut dyn Reflect,
        identity: &ObjectIdentity,
        name: &str,
    ) -> Result<ApplyReport, SaverError> {
        let guard = PhaseGuard::enter(&self.phase, Phase::Reflecting)?;

        let snapshot = self
            .store
            .get(identity, name)?
            .ok_or_else(|| SaverError::SnapshotNotFound {
                identity: identity.clone(),
                name: name.to_string(),
            })?;

        tracing::debug!(
            identity = %identity,
            snapshot = name,
            type_name = target.type_name(),
            fields = snapshot.fields.len(),
            "Applying snapshot"
        );

        let mut report = ApplyReport::default();

        for (key, encoded) in &snapshot.fields {
            let Some(field) = key.field_name() else {
                tracing::debug!(key = %key, "Skipping non-field entry");
                report.ignored_keys.push(key.to_string());
                continue;
            };

            guard.advance(Phase::Reflecting);
            let Some(value_type) = target.field_type(field) else {
                tracing::debug!(field, "Stored field no longer exists on target, dropping it");
                report.not_present.push(field.to_string());
                continue;
            };

            guard.advance(Phase::Decoding);
            let value = match codec::decode(encoded, &value_type) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        field,
                        expected = %value_type,
                        error = %err,
                        "Could not decode stored value"
                    );
                    report.failed.push(FieldFailure {
                        field: field.to_string(),
                        reason: err.into(),
                    });
                    continue;
                }
            };

            guard.advance(Phase::Mutating);
            match target.write_field(field, value) {
                Ok(WriteOutcome::Written) => report.applied.push(field.to_string()),
                Ok(WriteOutcome::NotPresent) => {
                    tracing::debug!(field, "Target refused unknown field, dropping it");
                    report.not_present.push(field.to_string());
                }
                Err(err) => {
                    tracing::warn!(
                        field,
                        expected = %value_type,
                        error = %err,
                        "Could not write field"
                    );
                    report.failed.push(FieldFailure {
                        field: field.to_string(),
                        reason: err.into(),
                    });
                }
            }
        }

        tracing::info!(
            identity = %identity,
            snapshot = name,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "Snapshot applied"
        );
        Ok(report)
    }

    /// Snapshot names stored for `identity`, in store order.
    pub fn list_names(&self, identity: &ObjectIdentity) -> Result<Vec<String>, SaverError> {
        Ok(self.store.list_names(identity)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Gait, Mover};
    use tempfile::TempDir;

    fn temp_saver() -> (TempDir, StateSaver) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let saver = StateSaver::new(SaverConfig::new(temp_dir.path().join("StateData.json")));
        (temp_dir, saver)
    }

    #[test]
    fn test_config_builder() {
        let config = SaverConfig::new("snapshots.json")
            .with_default_name("Untitled")
            .with_layout(StoreLayout::SingleGroup)
            .with_pretty(false);

        assert_eq!(config.store_path, PathBuf::from("snapshots.json"));
        assert_eq!(config.default_name, "Untitled");
        assert_eq!(config.layout, StoreLayout::SingleGroup);
        assert!(!config.pretty);
    }

    #[test]
    fn test_config_defaults() {
        let config = SaverConfig::default();
        assert_eq!(config.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.default_name, DEFAULT_SNAPSHOT_NAME);
        assert!(config.pretty);
    }

    #[test]
    fn test_empty_name_uses_default() {
        let (_dir, saver) = temp_saver();
        let mover = Mover::new(5.0, "idle");

        let report = saver.capture(&mover, "").expect("Capture should succeed");

        assert_eq!(report.name, DEFAULT_SNAPSHOT_NAME);
        assert_eq!(
            saver.list_names(&mover.identity()).unwrap(),
            vec![DEFAULT_SNAPSHOT_NAME]
        );
    }

    #[test]
    fn test_capture_skips_defaults() {
        let (_dir, saver) = temp_saver();
        let mover = Mover::new(5.0, "idle");

        let report = saver.capture(&mover, "a").unwrap();

        assert_eq!(report.stored, vec!["speed", "label"]);
        assert_eq!(report.skipped, vec!["count", "gait", "heading", "tint"]);
        assert!(report.unreadable.is_empty());
        assert_eq!(report.outcome, UpsertOutcome::Created);
    }

    #[test]
    fn test_apply_missing_snapshot_does_not_mutate() {
        let (_dir, saver) = temp_saver();
        let mut mover = Mover::new(5.0, "idle");
        let id = mover.identity();

        let err = saver.apply(&mut mover, &id, "nope").unwrap_err();

        assert!(matches!(err, SaverError::SnapshotNotFound { .. }));
        assert_eq!(mover.speed, 5.0);
        assert_eq!(saver.phase(), Phase::Idle);
    }

    #[test]
    fn test_apply_reports_decode_failure_and_continues() {
        let (dir, saver) = temp_saver();
        let mut mover = Mover::new(1.0, "walk");
        let id = mover.identity();
        std::fs::write(
            dir.path().join("StateData.json"),
            serde_json::json!({
                id.as_str(): {
                    "targetId": id.as_str(),
                    "states": [{
                        "stateName": "bad",
                        "variables": {
                            "FIELD&gait": "Gallop",
                            "FIELD&speed": 3.5,
                            "FIELD&heading": {"x": 1.0},
                            "FIELD&legacy": 12,
                            "PROP&m_Enabled&Boolean": "True"
                        }
                    }]
                }
            })
            .to_string(),
        )
        .unwrap();

        let report = saver.apply(&mut mover, &id, "bad").expect("Apply should succeed");

        assert_eq!(report.applied, vec!["speed"]);
        assert_eq!(report.not_present, vec!["legacy"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.ignored_keys, vec!["PROP&m_Enabled&Boolean"]);
        assert!(!report.is_complete());
        assert_eq!(mover.speed, 3.5);
        assert_eq!(mover.gait, Gait::Stand);
    }

    #[test]
    fn test_reentrant_call_is_refused() {
        let (_dir, saver) = temp_saver();
        let guard = PhaseGuard::enter(&saver.phase, Phase::Persisting).unwrap();

        let mover = Mover::new(1.0, "x");
        let err = saver.capture(&mover, "a").unwrap_err();
        assert!(matches!(
            err,
            SaverError::Busy {
                phase: Phase::Persisting
            }
        ));

        drop(guard);
        assert!(saver.capture(&mover, "a").is_ok());
    }
}
