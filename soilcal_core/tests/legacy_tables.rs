//! Per-soil-profile table loading and application.

use std::io::Write;

use soilcal_backends::{MemoryFileStore, MemoryKvStore};
use soilcal_core::{
    CalibrationEngine, CalibrationError, CalibrationStorage, EngineSettings, SensorKind,
    SensorReading, SoilProfile, StorageLayout, TablePoint,
};
use soilcal_traits::ManualClock;

type Engine = CalibrationEngine<MemoryKvStore, MemoryFileStore, ManualClock>;

const LOAM: &str = "\
sensor_type,raw_value,reference_value
ph,4.0,4.1
ph,7.0,7.0
ph,10.0,9.8
ec,0,0
ec,1000,1100
# field sample row with a typo below
ec,abc,1
nitrogen,10,12
";

fn engine() -> Engine {
    let storage = CalibrationStorage::new(
        MemoryKvStore::new(),
        MemoryFileStore::new(),
        StorageLayout::default(),
    );
    CalibrationEngine::new(storage, ManualClock::new(0), EngineSettings::default())
}

#[test]
fn load_counts_points_and_skips_bad_rows() {
    let mut e = engine();
    assert_eq!(e.load_calibration_table(SoilProfile::Loam, LOAM).unwrap(), 6);
    assert!(e.has_calibration_table(SoilProfile::Loam));
    assert!(!e.has_calibration_table(SoilProfile::Sand));
    assert_eq!(e.calibration_point_count(SoilProfile::Loam, SensorKind::Ph), 3);
    assert_eq!(e.calibration_point_count(SoilProfile::Loam, SensorKind::Ec), 2);
    assert_eq!(e.calibration_point_count(SoilProfile::Sand, SensorKind::Ph), 0);
}

#[test]
fn apply_interpolates_and_passes_through() {
    let mut e = engine();
    e.load_calibration_table(SoilProfile::Loam, LOAM).unwrap();
    let raw = SensorReading {
        temperature: 18.0,
        humidity: 40.0,
        ec: 500.0,
        ph: 5.5,
        nitrogen: 99.0,
        phosphorus: 7.0,
        potassium: 8.0,
    };
    let out = e.apply_calibration(&raw, SoilProfile::Loam);
    assert_eq!(out.ec, 550.0);
    assert!((out.ph - 5.55).abs() < 1e-5);
    assert_eq!(out.nitrogen, 12.0);
    assert_eq!(out.temperature, 18.0);
    assert_eq!(out.potassium, 8.0);

    assert_eq!(e.apply_calibration(&raw, SoilProfile::Peat), raw);
}

#[test]
fn reload_replaces_previous_table() {
    let mut e = engine();
    e.load_calibration_table(SoilProfile::Clay, LOAM).unwrap();
    e.load_calibration_table(SoilProfile::Clay, "h\ntemperature,0,1\n")
        .unwrap();
    assert_eq!(e.calibration_point_count(SoilProfile::Clay, SensorKind::Ph), 0);
    assert_eq!(
        e.calibration_point_count(SoilProfile::Clay, SensorKind::Temperature),
        1
    );
}

#[test]
fn rejected_table_keeps_the_old_one() {
    let mut e = engine();
    e.load_calibration_table(SoilProfile::Sand, LOAM).unwrap();
    let err = e
        .load_calibration_table(SoilProfile::Sand, "h\nph,7,7\nph,4,4\n")
        .expect_err("descending raw values");
    assert!(matches!(err, CalibrationError::UnorderedTable(SensorKind::Ph)));
    assert_eq!(e.calibration_point_count(SoilProfile::Sand, SensorKind::Ph), 3);

    let err = e
        .load_calibration_table(SoilProfile::Peat, "sensor_type,raw_value,reference_value\n")
        .expect_err("no rows");
    assert!(matches!(err, CalibrationError::EmptyTable { skipped: 0 }));
}

#[test]
fn export_and_remove() {
    let mut e = engine();
    assert!(e.export_calibration_table(SoilProfile::Loam).is_none());
    e.load_calibration_table(SoilProfile::Loam, "h\nnitrogen,10,12\nph,7,7.05\n")
        .unwrap();
    assert_eq!(
        e.export_calibration_table(SoilProfile::Loam).unwrap(),
        "sensor_type,raw_value,reference_value\nph,7.00,7.05\nnitrogen,10.00,12.00\n"
    );
    assert!(e.remove_calibration_table(SoilProfile::Loam));
    assert!(!e.remove_calibration_table(SoilProfile::Loam));
    assert!(!e.has_calibration_table(SoilProfile::Loam));
}

#[test]
fn clear_drops_every_profile() {
    let mut e = engine();
    e.load_calibration_table(SoilProfile::Loam, LOAM).unwrap();
    e.load_calibration_table(SoilProfile::SandPeat, LOAM).unwrap();
    assert_eq!(e.loaded_profiles().count(), 2);
    e.clear_calibration_tables();
    assert_eq!(e.loaded_profiles().count(), 0);
}

#[test]
fn load_from_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(LOAM.as_bytes()).unwrap();
    let mut e = engine();
    assert_eq!(
        e.load_calibration_table_file(SoilProfile::Clay, f.path())
            .unwrap(),
        6
    );
    let missing = e
        .load_calibration_table_file(SoilProfile::Clay, "/nonexistent/table.csv".as_ref())
        .expect_err("missing file");
    assert!(matches!(missing, CalibrationError::Io(_)));
}

#[test]
fn interpolation_helpers() {
    let pts = [TablePoint::new(10.0, 1.0), TablePoint::new(20.0, 2.0)];
    assert_eq!(Engine::apply_calibration_with_interpolation(15.0, &pts), 1.5);
    assert!(Engine::validate_calibration_points(&pts));
    assert!(!Engine::validate_calibration_points(&[pts[1], pts[0]]));
}
