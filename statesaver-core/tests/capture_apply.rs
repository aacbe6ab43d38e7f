//! End-to-end tests for capturing and applying snapshots.
//!
//! These tests drive `StateSaver` against a real store file in a temp
//! directory and check what ends up on disk and on the target object.
//! Run with: `cargo test -p statesaver-core --test capture_apply`

use statesaver_core::testing::{Beacon, FlakySensor, Gait, Mover, SlimMover};
use statesaver_core::{
    Color, FieldKey, Identify, ObjectIdentity, Quat, SaverConfig, SaverError, StateSaver,
    StoreError, Transform, Vec3,
};
use std::fs;
use tempfile::TempDir;

/// Route tracing output through the test harness.
fn setup() -> (TempDir, StateSaver) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let saver = StateSaver::new(SaverConfig::new(temp_dir.path().join("StateData.json")));
    (temp_dir, saver)
}

fn raw_store(dir: &TempDir) -> serde_json::Value {
    let content = fs::read_to_string(dir.path().join("StateData.json"))
        .expect("Store file should exist");
    serde_json::from_str(&content).expect("Store file should be valid JSON")
}

// =============================================================================
// TEST 1: Checkpoint scenario
// =============================================================================

#[test]
fn test_checkpoint_scenario() {
    let (dir, saver) = setup();

    let mut mover = Mover::new(5.0, "idle");
    let id = mover.identity();

    saver
        .capture(&mover, "checkpoint")
        .expect("Capture should succeed");

    let raw = raw_store(&dir);
    let group = &raw[id.as_str()];
    assert_eq!(group["targetId"], id.as_str());
    assert_eq!(group["states"].as_array().unwrap().len(), 1);
    assert_eq!(group["states"][0]["stateName"], "checkpoint");
    assert_eq!(
        group["states"][0]["variables"],
        serde_json::json!({ "FIELD&speed": 5.0, "FIELD&label": "idle" })
    );

    mover.speed = 9.0;
    mover.label = "run".to_string();
    mover.count = 3;

    let report = saver
        .apply(&mut mover, &id, "checkpoint")
        .expect("Apply should succeed");

    assert!(report.is_complete());
    assert_eq!(mover.speed, 5.0);
    assert_eq!(mover.label, "idle");
    assert_eq!(mover.count, 3, "Uncaptured field must stay untouched");
}

// =============================================================================
// TEST 2: Overwrite semantics
// =============================================================================

#[test]
fn test_capture_twice_overwrites() {
    let (_dir, saver) = setup();

    let mut mover = Mover::new(1.0, "first");
    saver.capture(&mover, "slot").unwrap();

    mover.speed = 2.0;
    mover.label = "second".to_string();
    mover.gait = Gait::Run;
    saver.capture(&mover, "slot").unwrap();

    let id = mover.identity();
    assert_eq!(saver.list_names(&id).unwrap(), vec!["slot"]);

    let snapshot = saver
        .store()
        .get(&id, "slot")
        .unwrap()
        .expect("Snapshot should exist");
    assert_eq!(snapshot.fields.len(), 3);
    assert!(snapshot.fields.contains_key(&FieldKey::field("gait")));

    let mut fresh = Mover::new(0.0, "");
    fresh.id = mover.id;
    saver.apply(&mut fresh, &id, "slot").unwrap();
    assert_eq!(fresh.speed, 2.0);
    assert_eq!(fresh.label, "second");
    assert_eq!(fresh.gait, Gait::Run);
}

// =============================================================================
// TEST 3: Defaults are neither stored nor applied
// =============================================================================

#[test]
fn test_default_fields_are_not_captured_or_applied() {
    let (_dir, saver) = setup();

    let mover = Mover::new(4.0, "steady");
    let report = saver.capture(&mover, "base").unwrap();
    assert!(report.skipped.contains(&"count".to_string()));

    let mut changed = mover.clone();
    changed.count = 12;
    changed.heading = Vec3::new(0.0, 1.0, 0.0);
    changed.gait = Gait::Sprint;
    changed.speed = 8.0;

    saver.apply(&mut changed, &mover.identity(), "base").unwrap();

    assert_eq!(changed.speed, 4.0);
    assert_eq!(changed.count, 12);
    assert_eq!(changed.heading, Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(changed.gait, Gait::Sprint);
}

// =============================================================================
// TEST 4: Composite values survive the store
// =============================================================================

#[test]
fn test_composite_values_round_trip_through_store() {
    let (_dir, saver) = setup();

    let mut mover = Mover::new(3.0, "scout");
    mover.heading = Vec3::new(0.25, -1.0, 12.5);
    mover.tint = Some(Color::rgba(0.1, 0.2, 0.3, 0.4));
    mover.gait = Gait::Sprint;
    let captured = mover.clone();

    saver.capture(&mover, "scouting").unwrap();

    let mut target = Mover::new(0.5, "other");
    target.id = mover.id;
    saver
        .apply(&mut target, &mover.identity(), "scouting")
        .unwrap();

    assert_eq!(target, captured);
}

#[test]
fn test_transform_and_rotation_round_trip() {
    let (_dir, saver) = setup();

    let beacon = Beacon {
        transform: Transform::from_position(Vec3::new(10.0, 0.0, -4.0))
            .with_rotation(Quat::new(0.0, 0.38268343, 0.0, 0.9238795))
            .with_scale(Vec3::new(1.0, 3.0, 1.0)),
        spin: Quat::IDENTITY,
        range: 42.5,
        channel: 200,
    };
    let id = ObjectIdentity::new("Beacon-north");

    saver.capture_as(&beacon, &id, "lit").unwrap();

    let mut restored = Beacon::default();
    let report = saver.apply(&mut restored, &id, "lit").unwrap();

    assert_eq!(report.applied.len(), 4);
    assert_eq!(restored, beacon);
}

// =============================================================================
// TEST 5: Schema drift
// =============================================================================

#[test]
fn test_apply_tolerates_missing_field_on_target() {
    let (_dir, saver) = setup();

    let mut mover = Mover::new(6.0, "legacy");
    mover.count = 2;
    saver.capture(&mover, "old").unwrap();

    let mut slim = SlimMover {
        id: mover.id,
        speed: 0.5,
        count: 9,
    };
    assert_eq!(slim.identity(), mover.identity());

    let report = saver
        .apply(&mut slim, &mover.identity(), "old")
        .expect("Apply should succeed despite the missing field");

    assert_eq!(report.not_present, vec!["label"]);
    assert!(report.failed.is_empty());
    assert_eq!(slim.speed, 6.0);
    assert_eq!(slim.count, 2);
}

#[test]
fn test_unreadable_field_does_not_abort_capture() {
    let (_dir, saver) = setup();

    let sensor = FlakySensor {
        name: "thermo".to_string(),
        reading: 21.5,
        offline: true,
    };

    let report = saver.capture(&sensor, "snapshot").unwrap();

    assert_eq!(report.stored, vec!["name"]);
    assert_eq!(report.unreadable.len(), 1);
    assert_eq!(report.unreadable[0].field, "reading");
    assert_eq!(
        saver.list_names(&sensor.identity()).unwrap(),
        vec!["snapshot"]
    );
}

// =============================================================================
// TEST 6: Identity isolation and listing
// =============================================================================

#[test]
fn test_capture_never_touches_other_identities() {
    let (dir, saver) = setup();

    let a = Mover::new(1.0, "a");
    let b = Mover::new(2.0, "b");
    saver.capture(&b, "keep").unwrap();
    let before = raw_store(&dir)[b.identity().as_str()].clone();

    saver.capture(&a, "keep").unwrap();
    saver.capture(&a, "second").unwrap();

    let after = raw_store(&dir);
    assert_eq!(after[b.identity().as_str()], before);
    assert_eq!(saver.list_names(&a.identity()).unwrap(), vec!["keep", "second"]);
    assert_eq!(saver.list_names(&b.identity()).unwrap(), vec!["keep"]);
    assert!(saver
        .list_names(&ObjectIdentity::new("Testing.Mover-unknown"))
        .unwrap()
        .is_empty());
}

#[test]
fn test_address_identity_is_stable_while_in_place() {
    let (_dir, saver) = setup();

    let mut beacon = Beacon::default();
    let id = beacon.identity();
    assert!(id.as_str().starts_with("Testing.Beacon"));

    saver.capture(&beacon, "home").unwrap();
    beacon.range = 99.0;
    assert_eq!(beacon.identity(), id);

    saver.apply(&mut beacon, &id, "home").unwrap();
    assert_eq!(beacon.range, 10.0);
}

// =============================================================================
// TEST 7: Store failures
// =============================================================================

#[test]
fn test_corrupt_store_aborts_capture_and_apply() {
    let (dir, saver) = setup();
    let path = dir.path().join("StateData.json");
    fs::write(&path, "{ this is not json").unwrap();

    let mut mover = Mover::new(5.0, "idle");
    let id = mover.identity();

    let err = saver.capture(&mover, "checkpoint").unwrap_err();
    assert!(matches!(err, SaverError::Store(StoreError::Corrupt(_))));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ this is not json");

    let err = saver.apply(&mut mover, &id, "checkpoint").unwrap_err();
    assert!(matches!(err, SaverError::Store(StoreError::Corrupt(_))));
    assert_eq!(mover.speed, 5.0);
}

#[test]
fn test_apply_unknown_snapshot_reports_not_found() {
    let (_dir, saver) = setup();

    let mut mover = Mover::new(5.0, "idle");
    saver.capture(&mover, "checkpoint").unwrap();
    let id = mover.identity();
    mover.speed = 1.0;

    let err = saver.apply(&mut mover, &id, "Checkpoint").unwrap_err();

    assert!(matches!(
        err,
        SaverError::SnapshotNotFound { ref name, .. } if name == "Checkpoint"
    ));
    assert_eq!(mover.speed, 1.0);
}
