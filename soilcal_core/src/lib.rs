#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Soil sensor calibration (storage-agnostic).
//!
//! This crate turns raw soil probe readings into corrected values. All
//! persistence goes through the `soilcal_traits::KeyValueStore` and
//! `soilcal_traits::FileStore` traits, and time through `Clock`.
//!
//! ## Architecture
//!
//! - **Model**: calibration snapshot and its JSON form (`model`)
//! - **Math**: least squares, outlier rejection, interpolation (`math`)
//! - **Tables**: legacy per-soil-profile interpolation tables (`table`)
//! - **Storage**: dual-backend snapshot persistence (`storage`)
//! - **Engine**: the calibration service tying it together (`engine`)
//! - **Science**: reference tables for agronomic sanity checks (`science`)
//!
//! Two correction tiers coexist: a loaded table for the active soil profile
//! takes precedence, otherwise the device snapshot is applied. See
//! [`CalibrationEngine::correct_reading`].

pub mod conversions;
pub mod engine;
pub mod error;
pub mod math;
pub mod model;
pub mod science;
pub mod sensor;
pub mod status;
pub mod storage;
pub mod table;

pub use engine::{CalibrationEngine, EngineSettings};
pub use error::{Backend, CalibrationError, Result, StorageError};
pub use math::CalibrationStats;
pub use model::{
    CalibrationPoint, CalibrationSnapshot, LinearCalibration, LinearCoefficients, NpkCalibration,
    OffsetCalibration,
};
pub use sensor::{SensorKind, SensorReading, SoilProfile};
pub use status::CalibrationStatus;
pub use storage::{CalibrationStorage, StorageLayout, WriteOutcome};
pub use table::{CalibrationTable, TablePoint};
