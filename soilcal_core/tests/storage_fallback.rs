use soilcal_backends::{FsFileStore, FsKvStore, MemoryFileStore, MemoryKvStore};
use soilcal_core::{
    CalibrationPoint, CalibrationSnapshot, CalibrationStorage, OffsetCalibration, StorageError,
    StorageLayout,
};

fn sample() -> CalibrationSnapshot {
    let mut s = CalibrationSnapshot::new("node-9", 100);
    s.temperature = OffsetCalibration::valid(0.75, 101);
    s.ec.points.push(CalibrationPoint::new(1413.0, 1399.5, 102));
    s
}

#[test]
fn save_then_load_into_fresh_snapshot() {
    let mut st = CalibrationStorage::new(
        MemoryKvStore::new(),
        MemoryFileStore::new(),
        StorageLayout::default(),
    );
    st.init().unwrap();
    st.save(&sample()).unwrap();
    let mut out = CalibrationSnapshot::default();
    st.load(&mut out).unwrap();
    assert_eq!(out, sample());
}

#[test]
fn emptied_primary_falls_back_to_replica() {
    let kv = MemoryKvStore::new();
    let mut st =
        CalibrationStorage::new(kv.clone(), MemoryFileStore::new(), StorageLayout::default());
    st.init().unwrap();
    st.save(&sample()).unwrap();
    kv.wipe();

    assert!(st.has_data());
    let mut out = CalibrationSnapshot::default();
    st.load(&mut out).unwrap();
    assert_eq!(out, sample());
}

#[test]
fn nothing_persisted_is_not_found() {
    let mut st = CalibrationStorage::new(
        MemoryKvStore::new(),
        MemoryFileStore::new(),
        StorageLayout::default(),
    );
    st.init().unwrap();
    let mut out = CalibrationSnapshot::default();
    assert!(matches!(st.load(&mut out), Err(StorageError::NotFound)));
    assert!(!st.has_data());
    st.clear().unwrap();
}

#[test]
fn filesystem_backends_round_trip_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout {
        snapshot_path: "state/calibration.json".into(),
        ..StorageLayout::default()
    };
    let mut st = CalibrationStorage::new(
        FsKvStore::new(dir.path().join("kv")),
        FsFileStore::new(dir.path()),
        layout,
    );
    st.init().unwrap();
    st.save(&sample()).unwrap();
    assert!(dir.path().join("state/calibration.json").exists());

    // Remove the primary copy on disk; the replica still answers.
    std::fs::remove_dir_all(dir.path().join("kv")).unwrap();
    let mut out = CalibrationSnapshot::default();
    st.load(&mut out).unwrap();
    assert_eq!(out, sample());

    st.clear().unwrap();
    assert!(!st.has_data());
}
