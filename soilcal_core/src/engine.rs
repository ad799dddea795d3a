//! Sensor calibration service.
//!
//! [`CalibrationEngine`] owns everything calibration needs at runtime: the
//! device snapshot (loaded lazily on first use), the legacy per-profile
//! tables, the storage adapter and a clock. It is a plain `&mut self`
//! object with a single writer; hosts that share it across threads wrap the
//! whole engine in one `Mutex`, which also serializes the storage write.
//!
//! Every accepted snapshot mutation is validated, applied, stamped and
//! persisted before the call returns. A persistence error is reported after
//! the in-memory change has already happened.

use std::collections::BTreeMap;
use std::path::Path;

use soilcal_traits::{Clock, FileStore, KeyValueStore};

use crate::error::{CalibrationError, Result, StorageError};
use crate::math::{self, CalibrationStats};
use crate::model::{
    CalibrationPoint, CalibrationSnapshot, LinearCalibration, LinearCoefficients, NpkCalibration,
    OffsetCalibration,
};
use crate::sensor::{SensorKind, SensorReading, SoilProfile};
use crate::status::CalibrationStatus;
use crate::storage::CalibrationStorage;
use crate::table::{CalibrationTable, TablePoint};

/// Runtime knobs for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub device_id: String,
    /// Standard deviations for outlier rejection before a fit
    pub outlier_threshold: f32,
    /// Cap on stored pH/EC points per sensor
    pub max_points: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            device_id: "soil-node".to_string(),
            outlier_threshold: math::DEFAULT_OUTLIER_THRESHOLD,
            max_points: 20,
        }
    }
}

type OffsetField = fn(&mut CalibrationSnapshot) -> &mut OffsetCalibration;
type LinearField = fn(&mut CalibrationSnapshot) -> &mut LinearCalibration;

fn temperature_field(s: &mut CalibrationSnapshot) -> &mut OffsetCalibration {
    &mut s.temperature
}
fn humidity_field(s: &mut CalibrationSnapshot) -> &mut OffsetCalibration {
    &mut s.humidity
}
fn ph_field(s: &mut CalibrationSnapshot) -> &mut LinearCalibration {
    &mut s.ph
}
fn ec_field(s: &mut CalibrationSnapshot) -> &mut LinearCalibration {
    &mut s.ec
}

/// Re-apply the validity gates to data that came from outside the engine.
fn revalidate(snap: &mut CalibrationSnapshot) {
    for lin in [&mut snap.ph, &mut snap.ec] {
        lin.points
            .retain(|p| p.expected.is_finite() && p.measured.is_finite());
        if lin.coefficients.is_valid && !math::validate_coefficients(&lin.coefficients) {
            tracing::warn!(
                slope = lin.coefficients.slope,
                r_squared = lin.coefficients.r_squared,
                "dropping imported coefficients that fail validation"
            );
            lin.coefficients.is_valid = false;
        }
    }
    for off in [
        &mut snap.temperature,
        &mut snap.humidity,
        &mut snap.npk.nitrogen,
        &mut snap.npk.phosphorus,
        &mut snap.npk.potassium,
    ] {
        if !off.offset.is_finite() {
            *off = OffsetCalibration::default();
        }
    }
}

pub struct CalibrationEngine<K, F, C> {
    storage: CalibrationStorage<K, F>,
    clock: C,
    settings: EngineSettings,
    snapshot: Option<CalibrationSnapshot>,
    tables: BTreeMap<SoilProfile, CalibrationTable>,
}

impl<K: KeyValueStore, F: FileStore, C: Clock> CalibrationEngine<K, F, C> {
    pub fn new(storage: CalibrationStorage<K, F>, clock: C, settings: EngineSettings) -> Self {
        Self {
            storage,
            clock,
            settings,
            snapshot: None,
            tables: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn storage(&self) -> &CalibrationStorage<K, F> {
        &self.storage
    }

    /// Open storage eagerly so open failures surface before the first
    /// mutation. The engine keeps working in memory if this fails.
    pub fn init_storage(&mut self) -> Result<()> {
        self.storage.init().map_err(Into::into)
    }

    // ── Modern snapshot workflow ────────────────────────────────────────────

    fn load_or_default(&mut self) -> CalibrationSnapshot {
        let now = self.clock.now_secs();
        let mut snap = CalibrationSnapshot::new(self.settings.device_id.clone(), now);
        if let Err(e) = self.storage.init() {
            tracing::warn!(error = %e, "calibration storage unavailable; using defaults");
            return snap;
        }
        match self.storage.load(&mut snap) {
            Ok(()) => {
                revalidate(&mut snap);
                tracing::info!(
                    device_id = %snap.device_id,
                    complete = snap.is_complete(),
                    "calibration loaded"
                );
            }
            Err(StorageError::NotFound) => {
                tracing::info!("no persisted calibration; starting with defaults");
            }
            Err(e) => tracing::warn!(error = %e, "persisted calibration unreadable; using defaults"),
        }
        snap
    }

    fn snapshot_mut(&mut self) -> &mut CalibrationSnapshot {
        if self.snapshot.is_none() {
            let loaded = self.load_or_default();
            self.snapshot = Some(loaded);
        }
        self.snapshot.get_or_insert_with(CalibrationSnapshot::default)
    }

    /// Current snapshot, loading it on first use.
    pub fn snapshot(&mut self) -> &CalibrationSnapshot {
        self.snapshot_mut()
    }

    fn persist(&mut self) -> Result<()> {
        let Some(snap) = self.snapshot.as_ref() else {
            return Ok(());
        };
        self.storage.init()?;
        self.storage.save(snap)?;
        Ok(())
    }

    fn check_point(kind: SensorKind, expected: f32, measured: f32) -> Result<()> {
        if math::validate_point(expected, measured, kind) {
            return Ok(());
        }
        tracing::warn!(sensor = %kind, expected, measured, "calibration point rejected");
        Err(CalibrationError::InvalidPoint {
            sensor: kind,
            expected,
            measured,
        })
    }

    fn check_finite(name: &'static str, value: f32) -> Result<()> {
        if value.is_finite() {
            Ok(())
        } else {
            tracing::warn!(field = name, value, "non-finite calibration value rejected");
            Err(CalibrationError::InvalidValue(name))
        }
    }

    fn add_offset_point(
        &mut self,
        kind: SensorKind,
        field: OffsetField,
        expected: f32,
        measured: f32,
    ) -> Result<()> {
        Self::check_point(kind, expected, measured)?;
        let offset = expected - measured;
        self.store_offset(kind, field, offset)
    }

    fn store_offset(&mut self, kind: SensorKind, field: OffsetField, offset: f32) -> Result<()> {
        let now = self.clock.now_secs();
        let snap = self.snapshot_mut();
        *field(snap) = OffsetCalibration::valid(offset, now);
        snap.touch(now);
        tracing::info!(sensor = %kind, offset, "offset calibration set");
        self.persist()
    }

    pub fn add_temperature_calibration_point(&mut self, expected: f32, measured: f32) -> Result<()> {
        self.add_offset_point(SensorKind::Temperature, temperature_field, expected, measured)
    }

    pub fn add_humidity_calibration_point(&mut self, expected: f32, measured: f32) -> Result<()> {
        self.add_offset_point(SensorKind::Humidity, humidity_field, expected, measured)
    }

    pub fn set_temperature_offset(&mut self, offset: f32) -> Result<()> {
        Self::check_finite("temperature offset", offset)?;
        self.store_offset(SensorKind::Temperature, temperature_field, offset)
    }

    pub fn set_humidity_offset(&mut self, offset: f32) -> Result<()> {
        Self::check_finite("humidity offset", offset)?;
        self.store_offset(SensorKind::Humidity, humidity_field, offset)
    }

    fn add_linear_point(
        &mut self,
        kind: SensorKind,
        field: LinearField,
        expected: f32,
        measured: f32,
    ) -> Result<()> {
        Self::check_point(kind, expected, measured)?;
        let max = self.settings.max_points;
        let now = self.clock.now_secs();
        let snap = self.snapshot_mut();
        let cal = field(snap);
        if cal.points.len() >= max {
            tracing::warn!(sensor = %kind, max, "calibration point buffer full");
            return Err(CalibrationError::TooManyPoints { sensor: kind, max });
        }
        cal.points.push(CalibrationPoint::new(expected, measured, now));
        let count = cal.points.len();
        snap.touch(now);
        tracing::info!(sensor = %kind, expected, measured, count, "calibration point added");
        self.persist()
    }

    pub fn add_ph_calibration_point(&mut self, expected: f32, measured: f32) -> Result<()> {
        self.add_linear_point(SensorKind::Ph, ph_field, expected, measured)
    }

    pub fn add_ec_calibration_point(&mut self, expected: f32, measured: f32) -> Result<()> {
        self.add_linear_point(SensorKind::Ec, ec_field, expected, measured)
    }

    /// Outlier rejection then least squares over the stored points.
    ///
    /// Needs two points before and after rejection. Only an accepted fit
    /// changes the snapshot: survivors replace the stored points and the
    /// coefficients are stored and persisted.
    fn calculate_linear(&mut self, kind: SensorKind, field: LinearField) -> Result<LinearCoefficients> {
        let threshold = self.settings.outlier_threshold;
        let now = self.clock.now_secs();
        let snap = self.snapshot_mut();
        let cal = field(snap);

        let have = cal.points.len();
        if have < 2 {
            tracing::warn!(sensor = %kind, have, "not enough calibration points");
            return Err(CalibrationError::InsufficientPoints { sensor: kind, have });
        }
        let mut working = cal.points.clone();
        math::remove_outliers(&mut working, threshold);
        if working.len() < 2 {
            tracing::warn!(sensor = %kind, have = working.len(), "too few points after outlier removal");
            return Err(CalibrationError::InsufficientPoints {
                sensor: kind,
                have: working.len(),
            });
        }

        let coefficients = math::calculate_linear_regression(&working);
        if !coefficients.is_valid {
            tracing::warn!(
                sensor = %kind,
                slope = coefficients.slope,
                intercept = coefficients.intercept,
                r_squared = coefficients.r_squared,
                "calibration fit rejected"
            );
            return Err(CalibrationError::FitRejected {
                sensor: kind,
                coefficients,
            });
        }

        let kept = working.len();
        cal.points = working;
        cal.coefficients = coefficients;
        snap.touch(now);
        tracing::info!(
            sensor = %kind,
            points = kept,
            removed = have - kept,
            slope = coefficients.slope,
            intercept = coefficients.intercept,
            r_squared = coefficients.r_squared,
            "calibration fit accepted"
        );
        self.persist()?;
        Ok(coefficients)
    }

    pub fn calculate_ph_calibration(&mut self) -> Result<LinearCoefficients> {
        self.calculate_linear(SensorKind::Ph, ph_field)
    }

    pub fn calculate_ec_calibration(&mut self) -> Result<LinearCoefficients> {
        self.calculate_linear(SensorKind::Ec, ec_field)
    }

    /// Zero-point NPK calibration from one reading of distilled water.
    pub fn set_npk_calibration_point(
        &mut self,
        nitrogen: f32,
        phosphorus: f32,
        potassium: f32,
    ) -> Result<()> {
        Self::check_point(SensorKind::Nitrogen, 0.0, nitrogen)?;
        Self::check_point(SensorKind::Phosphorus, 0.0, phosphorus)?;
        Self::check_point(SensorKind::Potassium, 0.0, potassium)?;
        let now = self.clock.now_secs();
        let snap = self.snapshot_mut();
        snap.npk = NpkCalibration::from_zero_point(nitrogen, phosphorus, potassium, now);
        snap.touch(now);
        tracing::info!(nitrogen, phosphorus, potassium, "npk zero point set");
        self.persist()
    }

    /// Set the three NPK offsets directly.
    pub fn set_npk_coefficients(
        &mut self,
        nitrogen_offset: f32,
        phosphorus_offset: f32,
        potassium_offset: f32,
    ) -> Result<()> {
        Self::check_finite("nitrogen offset", nitrogen_offset)?;
        Self::check_finite("phosphorus offset", phosphorus_offset)?;
        Self::check_finite("potassium offset", potassium_offset)?;
        let now = self.clock.now_secs();
        let snap = self.snapshot_mut();
        snap.npk =
            NpkCalibration::from_offsets(nitrogen_offset, phosphorus_offset, potassium_offset, now);
        snap.touch(now);
        tracing::info!(
            nitrogen_offset,
            phosphorus_offset,
            potassium_offset,
            "npk offsets set"
        );
        self.persist()
    }

    /// Back to an empty calibration: defaults in memory, both backends
    /// cleared, then the empty snapshot persisted.
    pub fn reset_calibration(&mut self) -> Result<()> {
        let now = self.clock.now_secs();
        self.snapshot = Some(CalibrationSnapshot::new(self.settings.device_id.clone(), now));
        self.storage.init()?;
        self.storage.clear()?;
        tracing::info!("calibration reset");
        self.persist()
    }

    pub fn export_calibration_json(&mut self) -> Result<String> {
        self.snapshot_mut().to_json()
    }

    /// Merge a JSON snapshot into the current one and persist.
    ///
    /// Malformed JSON leaves the snapshot untouched.
    pub fn import_calibration_json(&mut self, text: &str) -> Result<()> {
        let now = self.clock.now_secs();
        let mut candidate = self.snapshot_mut().clone();
        candidate.apply_json(text)?;
        self.commit_import(candidate, now)
    }

    fn commit_import(&mut self, mut candidate: CalibrationSnapshot, now: u32) -> Result<()> {
        revalidate(&mut candidate);
        candidate.touch(now);
        tracing::info!(
            device_id = %candidate.device_id,
            complete = candidate.is_complete(),
            "calibration imported"
        );
        self.snapshot = Some(candidate);
        self.persist()
    }

    pub fn export_calibration_to_file(&mut self, path: &Path) -> Result<()> {
        self.snapshot_mut();
        let Some(snap) = self.snapshot.as_ref() else {
            return Ok(());
        };
        self.storage.export_to_file(path, snap)?;
        Ok(())
    }

    /// Restore from a manual backup and persist it to the default location.
    pub fn import_calibration_from_file(&mut self, path: &Path) -> Result<()> {
        let now = self.clock.now_secs();
        let mut candidate = self.snapshot_mut().clone();
        self.storage.import_from_file(path, &mut candidate)?;
        self.commit_import(candidate, now)
    }

    pub fn calibration_status(&mut self) -> CalibrationStatus {
        CalibrationStatus::from(&*self.snapshot_mut())
    }

    pub fn is_calibration_complete(&mut self) -> bool {
        self.snapshot_mut().is_complete()
    }

    pub fn ph_calibration_stats(&mut self) -> CalibrationStats {
        let snap = self.snapshot_mut();
        math::calibration_stats(&snap.ph.points, &snap.ph.coefficients)
    }

    pub fn ec_calibration_stats(&mut self) -> CalibrationStats {
        let snap = self.snapshot_mut();
        math::calibration_stats(&snap.ec.points, &snap.ec.coefficients)
    }

    /// Correct a reading with the device snapshot. Channels without a valid
    /// calibration pass through.
    pub fn apply_device_calibration(&mut self, reading: &SensorReading) -> SensorReading {
        let snap = self.snapshot_mut();
        SensorReading {
            temperature: math::apply_offset_calibration(reading.temperature, &snap.temperature),
            humidity: math::apply_offset_calibration(reading.humidity, &snap.humidity),
            ec: math::apply_calibration(reading.ec, &snap.ec.coefficients),
            ph: math::apply_calibration(reading.ph, &snap.ph.coefficients),
            nitrogen: math::apply_offset_calibration(reading.nitrogen, &snap.npk.nitrogen),
            phosphorus: math::apply_offset_calibration(reading.phosphorus, &snap.npk.phosphorus),
            potassium: math::apply_offset_calibration(reading.potassium, &snap.npk.potassium),
        }
    }

    /// Reading pipeline entry point: the profile's legacy table when one is
    /// loaded, the device snapshot otherwise.
    pub fn correct_reading(&mut self, reading: &SensorReading, profile: SoilProfile) -> SensorReading {
        if self.has_calibration_table(profile) {
            return self.apply_calibration(reading, profile);
        }
        self.apply_device_calibration(reading)
    }

    // ── Legacy table application ────────────────────────────────────────────

    /// Parse and install the table for `profile`, replacing any previous
    /// one. Returns the number of points loaded.
    pub fn load_calibration_table(&mut self, profile: SoilProfile, csv_text: &str) -> Result<usize> {
        let parsed = soilcal_config::parse_calibration_table(csv_text);
        self.install_table(profile, &parsed)
    }

    pub fn load_calibration_table_file(&mut self, profile: SoilProfile, path: &Path) -> Result<usize> {
        let parsed = soilcal_config::load_calibration_table_csv(path)
            .map_err(|e| CalibrationError::Io(e.to_string()))?;
        self.install_table(profile, &parsed)
    }

    fn install_table(
        &mut self,
        profile: SoilProfile,
        parsed: &soilcal_config::ParsedTable,
    ) -> Result<usize> {
        if parsed.skipped > 0 {
            tracing::debug!(%profile, skipped = parsed.skipped, "malformed table rows skipped");
        }
        let table = CalibrationTable::from_parsed(parsed).inspect_err(|e| {
            tracing::warn!(%profile, error = %e, "calibration table rejected");
        })?;
        let points = table.total_points();
        self.tables.insert(profile, table);
        tracing::info!(%profile, points, "calibration table loaded");
        Ok(points)
    }

    /// Apply the legacy table for `profile`. Fail-open: without a table, or
    /// for channels the table does not cover, values pass through.
    pub fn apply_calibration(&self, reading: &SensorReading, profile: SoilProfile) -> SensorReading {
        match self.tables.get(&profile) {
            Some(table) if table.is_valid() => table.apply(reading),
            _ => *reading,
        }
    }

    pub fn apply_calibration_with_interpolation(raw: f32, points: &[TablePoint]) -> f32 {
        math::interpolate(raw, points)
    }

    pub fn validate_calibration_points(points: &[TablePoint]) -> bool {
        math::validate_table_points(points)
    }

    pub fn has_calibration_table(&self, profile: SoilProfile) -> bool {
        self.tables.get(&profile).is_some_and(CalibrationTable::is_valid)
    }

    pub fn calibration_table(&self, profile: SoilProfile) -> Option<&CalibrationTable> {
        self.tables.get(&profile)
    }

    pub fn remove_calibration_table(&mut self, profile: SoilProfile) -> bool {
        let removed = self.tables.remove(&profile).is_some();
        if removed {
            tracing::info!(%profile, "calibration table removed");
        }
        removed
    }

    pub fn clear_calibration_tables(&mut self) {
        self.tables.clear();
    }

    pub fn calibration_point_count(&self, profile: SoilProfile, kind: SensorKind) -> usize {
        self.tables
            .get(&profile)
            .map_or(0, |t| t.point_count(kind))
    }

    pub fn loaded_profiles(&self) -> impl Iterator<Item = SoilProfile> + '_ {
        self.tables.keys().copied()
    }

    /// CSV for `profile`, or `None` when no table is loaded.
    pub fn export_calibration_table(&self, profile: SoilProfile) -> Option<String> {
        self.tables.get(&profile).map(CalibrationTable::to_csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageLayout;
    use soilcal_backends::{MemoryFileStore, MemoryKvStore};
    use soilcal_traits::ManualClock;

    type Engine = CalibrationEngine<MemoryKvStore, MemoryFileStore, ManualClock>;

    fn engine() -> (Engine, MemoryKvStore, ManualClock) {
        let kv = MemoryKvStore::new();
        let clock = ManualClock::new(1_000);
        let storage =
            CalibrationStorage::new(kv.clone(), MemoryFileStore::new(), StorageLayout::default());
        let e = CalibrationEngine::new(storage, clock.clone(), EngineSettings::default());
        (e, kv, clock)
    }

    #[test]
    fn first_use_creates_default_snapshot() {
        let (mut e, _, _) = engine();
        let snap = e.snapshot();
        assert_eq!(snap.device_id, "soil-node");
        assert_eq!(snap.created_at, 1_000);
        assert!(!snap.is_complete());
    }

    #[test]
    fn mutation_touches_and_persists() {
        let (mut e, kv, clock) = engine();
        e.snapshot();
        clock.advance(60);
        e.add_temperature_calibration_point(25.0, 24.2).unwrap();
        let snap = e.snapshot();
        assert_eq!(snap.updated_at, 1_060);
        assert_eq!(snap.created_at, 1_000);
        assert!((snap.temperature.offset - 0.8).abs() < 1e-5);
        let stored = kv.peek("calibration", "snapshot").expect("persisted");
        assert!(stored.contains("\"updated_at\": 1060"));
    }

    #[test]
    fn revalidate_drops_bad_imported_coefficients() {
        let mut snap = CalibrationSnapshot::default();
        snap.ph.coefficients = LinearCoefficients {
            slope: 50.0,
            intercept: 0.0,
            r_squared: 0.99,
            is_valid: true,
        };
        revalidate(&mut snap);
        assert!(!snap.ph.coefficients.is_valid);
    }

    #[test]
    fn storage_open_failure_keeps_engine_usable_in_memory() {
        let (mut e, kv, _) = engine();
        kv.set_fail_open(true);
        let err = e
            .add_humidity_calibration_point(50.0, 48.0)
            .expect_err("persist must fail");
        assert!(matches!(err, CalibrationError::Storage(StorageError::Open { .. })));
        assert!(e.snapshot().humidity.is_valid);
    }
}
