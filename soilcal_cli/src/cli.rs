//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use soilcal_core::{SensorKind, SoilProfile};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "soilcal", version, about = "Soil sensor calibration CLI")]
pub struct Cli {
    /// Path to config TOML; a missing file means built-in defaults
    #[arg(long, value_name = "FILE", default_value = "etc/soilcal.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Sensors that take reference/measured calibration pairs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PointSensor {
    Temperature,
    Humidity,
    Ph,
    Ec,
}

/// Sensors calibrated by a least-squares fit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FitSensor {
    Ph,
    Ec,
}

/// Sensors calibrated by a plain offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OffsetSensor {
    Temperature,
    Humidity,
}

impl From<PointSensor> for SensorKind {
    fn from(s: PointSensor) -> Self {
        match s {
            PointSensor::Temperature => SensorKind::Temperature,
            PointSensor::Humidity => SensorKind::Humidity,
            PointSensor::Ph => SensorKind::Ph,
            PointSensor::Ec => SensorKind::Ec,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show per-sensor calibration readiness
    Status,
    /// Record one reference/measured pair
    AddPoint {
        #[arg(long, value_enum)]
        sensor: PointSensor,
        /// Reference value (buffer solution, reference thermometer, ...)
        #[arg(long, allow_negative_numbers = true)]
        expected: f32,
        /// Raw sensor output for the same sample
        #[arg(long, allow_negative_numbers = true)]
        measured: f32,
    },
    /// Fit pH or EC coefficients from the recorded points
    Fit {
        #[arg(long, value_enum)]
        sensor: FitSensor,
    },
    /// Set a temperature or humidity offset directly
    SetOffset {
        #[arg(long, value_enum)]
        sensor: OffsetSensor,
        #[arg(long, allow_negative_numbers = true)]
        offset: f32,
    },
    /// Zero-point NPK calibration from a distilled water reading
    NpkZero {
        #[arg(long)]
        nitrogen: f32,
        #[arg(long)]
        phosphorus: f32,
        #[arg(long)]
        potassium: f32,
    },
    /// Set the NPK offsets directly
    NpkOffsets {
        #[arg(long, allow_negative_numbers = true)]
        nitrogen: f32,
        #[arg(long, allow_negative_numbers = true)]
        phosphorus: f32,
        #[arg(long, allow_negative_numbers = true)]
        potassium: f32,
    },
    /// Discard all calibration and clear both storage backends
    Reset,
    /// Write the calibration snapshot to a backup file
    Export {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Restore the calibration snapshot from a backup file
    Import {
        #[arg(long, value_name = "FILE")]
        from: PathBuf,
    },
    /// Correct one raw reading (profile table first, device calibration otherwise)
    Correct {
        /// Soil profile (sand|loam|clay|peat|sand-peat)
        #[arg(long)]
        profile: SoilProfile,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        temperature: f32,
        #[arg(long, default_value_t = 0.0)]
        humidity: f32,
        #[arg(long, default_value_t = 0.0)]
        ec: f32,
        #[arg(long, default_value_t = 0.0)]
        ph: f32,
        #[arg(long, default_value_t = 0.0)]
        nitrogen: f32,
        #[arg(long, default_value_t = 0.0)]
        phosphorus: f32,
        #[arg(long, default_value_t = 0.0)]
        potassium: f32,
    },
    /// Print a loaded profile table as CSV
    TableExport {
        #[arg(long)]
        profile: SoilProfile,
        /// Write to FILE instead of stdout
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Summarize the scientific reference tables
    ScienceReport,
    /// Check a compensation formula against its published source
    CheckFormula {
        #[arg(long)]
        source: String,
        #[arg(long)]
        formula: String,
    },
}
