#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration table parsing for the soil sensor node.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration table CSV parsing is lenient: the header row is skipped and
//!   malformed rows are dropped and counted rather than failing the import.
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Header emitted on export; any first line is accepted on import.
pub const TABLE_CSV_HEADER: &str = "sensor_type,raw_value,reference_value";

/// One data row of a calibration table CSV.
///
/// Example:
/// sensor_type,raw_value,reference_value
/// ph,4.10,4.00
/// ph,6.95,7.00
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub sensor_type: String,
    pub raw_value: f32,
    pub reference_value: f32,
}

/// Result of parsing a table: accepted rows in file order, and how many
/// data rows were dropped as malformed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedTable {
    pub rows: Vec<TableRow>,
    pub skipped: usize,
}

fn parse_row(rec: &csv::StringRecord) -> Option<TableRow> {
    if rec.len() < 3 {
        return None;
    }
    let sensor_type = rec.get(0)?.trim().to_ascii_lowercase();
    if sensor_type.is_empty() {
        return None;
    }
    let raw_value: f32 = rec.get(1)?.trim().parse().ok()?;
    let reference_value: f32 = rec.get(2)?.trim().parse().ok()?;
    if !raw_value.is_finite() || !reference_value.is_finite() {
        return None;
    }
    Some(TableRow {
        sensor_type,
        raw_value,
        reference_value,
    })
}

/// Parse calibration table text. Never fails. The first physical line is
/// always the header, whatever it holds. Later rows that do not carry a
/// sensor type plus two finite numbers are skipped and counted.
pub fn parse_calibration_table(text: &str) -> ParsedTable {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut out = ParsedTable::default();
    for rec in rdr.records() {
        match rec.ok().as_ref().and_then(parse_row) {
            Some(row) => out.rows.push(row),
            None => out.skipped += 1,
        }
    }
    out
}

pub fn load_calibration_table_csv(path: &Path) -> eyre::Result<ParsedTable> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("open calibration table {:?}: {}", path, e))?;
    Ok(parse_calibration_table(&text))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Identifier written into every persisted snapshot
    pub id: String,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            id: "soil-node".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
    /// Base directory for the key-value namespace and the snapshot file
    pub root: PathBuf,
    /// Key-value namespace (max 15 chars)
    pub namespace: String,
    /// Key holding the primary snapshot copy (max 15 chars)
    pub key: String,
    /// Replica snapshot file, relative to `root` unless absolute
    pub snapshot_file: PathBuf,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            namespace: "calibration".to_string(),
            key: "snapshot".to_string(),
            snapshot_file: PathBuf::from("calibration.json"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Standard deviations beyond which a point is dropped before fitting
    pub outlier_threshold: f32,
    /// Cap on stored pH/EC points per sensor
    pub max_points: usize,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            outlier_threshold: 2.0,
            max_points: 20,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Legacy calibration table to load at startup for a soil profile.
#[derive(Debug, Deserialize, Clone)]
pub struct TableSource {
    pub profile: String,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub storage: StorageCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
    pub tables: Vec<TableSource>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn is_store_key(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 15
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.id.trim().is_empty() {
            eyre::bail!("device.id must not be empty");
        }
        if self.device.id.len() > 32 {
            eyre::bail!("device.id must be at most 32 characters");
        }

        // Storage
        if !is_store_key(&self.storage.namespace) {
            eyre::bail!("storage.namespace must be 1..=15 chars of [A-Za-z0-9_-]");
        }
        if !is_store_key(&self.storage.key) {
            eyre::bail!("storage.key must be 1..=15 chars of [A-Za-z0-9_-]");
        }
        if self.storage.snapshot_file.as_os_str().is_empty() {
            eyre::bail!("storage.snapshot_file must not be empty");
        }

        // Calibration
        let thr = self.calibration.outlier_threshold;
        if !(thr.is_finite() && thr > 0.0 && thr <= 10.0) {
            eyre::bail!("calibration.outlier_threshold must be in (0.0, 10.0]");
        }
        if !(2..=64).contains(&self.calibration.max_points) {
            eyre::bail!("calibration.max_points must be in [2, 64]");
        }

        // Logging
        if let Some(level) = self.logging.level.as_deref()
            && !matches!(level, "error" | "warn" | "info" | "debug" | "trace")
        {
            eyre::bail!("logging.level must be one of error|warn|info|debug|trace");
        }
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Tables
        for (i, t) in self.tables.iter().enumerate() {
            if t.profile.trim().is_empty() {
                eyre::bail!("tables[{i}].profile must not be empty");
            }
            if t.path.as_os_str().is_empty() {
                eyre::bail!("tables[{i}].path must not be empty");
            }
        }

        Ok(())
    }

    /// Replica snapshot path, resolved against `storage.root`.
    pub fn snapshot_path(&self) -> PathBuf {
        if self.storage.snapshot_file.is_absolute() {
            self.storage.snapshot_file.clone()
        } else {
            self.storage.root.join(&self.storage.snapshot_file)
        }
    }
}
