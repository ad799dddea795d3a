//! Calibration data model and its persisted JSON form.
//!
//! Every struct carries `#[serde(default)]` so a record missing nested
//! fields still decodes; top-level merging is handled by
//! [`CalibrationSnapshot::apply_json`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CalibrationError, Result};

/// One reference/raw pair. `measured` is the sensor output, `expected` the
/// ground-truth reference (e.g. a pH 7.00 buffer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationPoint {
    pub expected: f32,
    pub measured: f32,
    pub timestamp: u32,
}

impl CalibrationPoint {
    pub fn new(expected: f32, measured: f32, timestamp: u32) -> Self {
        Self {
            expected,
            measured,
            timestamp,
        }
    }
}

/// Fitted model `corrected = slope * raw + intercept`.
///
/// `is_valid` is only ever set by [`crate::math::validate_coefficients`];
/// invalid coefficients are never applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearCoefficients {
    pub slope: f32,
    pub intercept: f32,
    pub r_squared: f32,
    pub is_valid: bool,
}

impl Default for LinearCoefficients {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
            r_squared: 0.0,
            is_valid: false,
        }
    }
}

/// Additive model `corrected = raw + offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetCalibration {
    pub offset: f32,
    pub is_valid: bool,
    pub timestamp: u32,
}

impl OffsetCalibration {
    pub fn valid(offset: f32, timestamp: u32) -> Self {
        Self {
            offset,
            is_valid: true,
            timestamp,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.is_valid
    }
}

/// Multi-point calibration (pH, EC): points in arrival order plus the last
/// accepted fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearCalibration {
    pub points: Vec<CalibrationPoint>,
    pub coefficients: LinearCoefficients,
}

impl LinearCalibration {
    pub fn is_ready(&self) -> bool {
        self.points.len() >= 2 && self.coefficients.is_valid
    }
}

/// Zero-point NPK calibration; the three offsets are always set together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpkCalibration {
    pub last_calibration: u32,
    pub nitrogen: OffsetCalibration,
    pub phosphorus: OffsetCalibration,
    pub potassium: OffsetCalibration,
}

impl NpkCalibration {
    pub fn is_ready(&self) -> bool {
        self.nitrogen.is_valid && self.phosphorus.is_valid && self.potassium.is_valid
    }

    /// Offsets from one reading of a known-zero reference (distilled water).
    pub fn from_zero_point(nitrogen: f32, phosphorus: f32, potassium: f32, now: u32) -> Self {
        Self::from_offsets(0.0 - nitrogen, 0.0 - phosphorus, 0.0 - potassium, now)
    }

    pub fn from_offsets(nitrogen: f32, phosphorus: f32, potassium: f32, now: u32) -> Self {
        Self {
            last_calibration: now,
            nitrogen: OffsetCalibration::valid(nitrogen, now),
            phosphorus: OffsetCalibration::valid(phosphorus, now),
            potassium: OffsetCalibration::valid(potassium, now),
        }
    }
}

/// Full device calibration, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSnapshot {
    pub device_id: String,
    pub created_at: u32,
    pub updated_at: u32,
    pub temperature: OffsetCalibration,
    pub humidity: OffsetCalibration,
    pub ph: LinearCalibration,
    pub ec: LinearCalibration,
    pub npk: NpkCalibration,
}

impl CalibrationSnapshot {
    /// Fresh, empty calibration stamped at `now`.
    pub fn new(device_id: impl Into<String>, now: u32) -> Self {
        Self {
            device_id: device_id.into(),
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// True iff temperature, humidity, pH, EC and NPK are all ready.
    pub fn is_complete(&self) -> bool {
        self.temperature.is_ready()
            && self.humidity.is_ready()
            && self.ph.is_ready()
            && self.ec.is_ready()
            && self.npk.is_ready()
    }

    /// Stamp `updated_at`. Called on every mutation, before persisting.
    #[inline]
    pub fn touch(&mut self, now: u32) {
        self.updated_at = now;
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CalibrationError::Parse(e.to_string()))
    }

    /// Decode onto a default snapshot.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut snap = Self::default();
        snap.apply_json(text)?;
        Ok(snap)
    }

    /// Merge a persisted snapshot into `self`.
    ///
    /// Only malformed JSON or a non-object top level is an error, and then
    /// `self` is untouched. Missing keys keep their current value; a key
    /// whose value does not decode is skipped with a warning.
    pub fn apply_json(&mut self, text: &str) -> Result<()> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CalibrationError::Parse(e.to_string()))?;
        let Value::Object(obj) = value else {
            return Err(CalibrationError::Parse(
                "calibration snapshot must be a JSON object".into(),
            ));
        };

        merge_field(&obj, "device_id", &mut self.device_id);
        merge_field(&obj, "created_at", &mut self.created_at);
        merge_field(&obj, "updated_at", &mut self.updated_at);
        merge_field(&obj, "temperature", &mut self.temperature);
        merge_field(&obj, "humidity", &mut self.humidity);
        merge_field(&obj, "ph", &mut self.ph);
        merge_field(&obj, "ec", &mut self.ec);
        merge_field(&obj, "npk", &mut self.npk);
        Ok(())
    }
}

fn merge_field<T: serde::de::DeserializeOwned>(obj: &Map<String, Value>, key: &str, slot: &mut T) {
    let Some(v) = obj.get(key) else {
        return;
    };
    match T::deserialize(v) {
        Ok(decoded) => *slot = decoded,
        Err(e) => tracing::warn!(key, error = %e, "ignoring undecodable snapshot field"),
    }
}
