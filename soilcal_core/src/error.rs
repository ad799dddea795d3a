use thiserror::Error;

use crate::model::LinearCoefficients;
use crate::sensor::SensorKind;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("invalid {sensor} calibration point: expected={expected}, measured={measured}")]
    InvalidPoint {
        sensor: SensorKind,
        expected: f32,
        measured: f32,
    },
    #[error("invalid value for {0}: must be finite")]
    InvalidValue(&'static str),
    #[error("{sensor} calibration needs at least 2 points, have {have}")]
    InsufficientPoints { sensor: SensorKind, have: usize },
    #[error(
        "{sensor} fit rejected: slope={:.4}, intercept={:.4}, r_squared={:.4}",
        .coefficients.slope, .coefficients.intercept, .coefficients.r_squared
    )]
    FitRejected {
        sensor: SensorKind,
        coefficients: LinearCoefficients,
    },
    #[error("{sensor} calibration is full ({max} points)")]
    TooManyPoints { sensor: SensorKind, max: usize },
    #[error("{0} table raw values must be strictly increasing")]
    UnorderedTable(SensorKind),
    #[error("calibration table has no usable rows ({skipped} skipped)")]
    EmptyTable { skipped: usize },
    #[error("unknown soil profile {0:?}")]
    UnknownProfile(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Which backend a write went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    KeyValue,
    File,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::KeyValue => "key-value",
            Backend::File => "file",
        })
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage not initialized")]
    NotInitialized,
    #[error("failed to open storage namespace {namespace:?}: {reason}")]
    Open { namespace: String, reason: String },
    #[error("snapshot write failed on both backends (key-value: {primary}; file: {replica})")]
    WriteFailed { primary: String, replica: String },
    #[error("snapshot write only reached the {written} backend: {reason}")]
    PartialWrite { written: Backend, reason: String },
    #[error("{backend} backend write failed: {reason}")]
    Write { backend: Backend, reason: String },
    #[error("no persisted calibration found")]
    NotFound,
    #[error("{backend} backend read failed: {reason}")]
    Read { backend: Backend, reason: String },
    #[error("persisted calibration is malformed: {0}")]
    Parse(String),
    #[error("{backend} backend remove failed: {reason}")]
    Remove { backend: Backend, reason: String },
}

pub type Result<T> = std::result::Result<T, CalibrationError>;
