//! Read-only calibration status report.

use serde::Serialize;

use crate::model::{
    CalibrationSnapshot, LinearCalibration, LinearCoefficients, NpkCalibration, OffsetCalibration,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetStatus {
    pub ready: bool,
    pub offset: f32,
    pub timestamp: u32,
}

impl From<&OffsetCalibration> for OffsetStatus {
    fn from(o: &OffsetCalibration) -> Self {
        Self {
            ready: o.is_ready(),
            offset: o.offset,
            timestamp: o.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearStatus {
    pub ready: bool,
    pub point_count: usize,
    pub coefficients: LinearCoefficients,
}

impl From<&LinearCalibration> for LinearStatus {
    fn from(l: &LinearCalibration) -> Self {
        Self {
            ready: l.is_ready(),
            point_count: l.points.len(),
            coefficients: l.coefficients,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpkStatus {
    pub ready: bool,
    pub last_calibration: u32,
    pub nitrogen: OffsetStatus,
    pub phosphorus: OffsetStatus,
    pub potassium: OffsetStatus,
}

impl From<&NpkCalibration> for NpkStatus {
    fn from(n: &NpkCalibration) -> Self {
        Self {
            ready: n.is_ready(),
            last_calibration: n.last_calibration,
            nitrogen: (&n.nitrogen).into(),
            phosphorus: (&n.phosphorus).into(),
            potassium: (&n.potassium).into(),
        }
    }
}

/// Summary of a snapshot, per-sensor readiness first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationStatus {
    pub device_id: String,
    pub complete: bool,
    pub created_at: u32,
    pub updated_at: u32,
    pub temperature: OffsetStatus,
    pub humidity: OffsetStatus,
    pub ph: LinearStatus,
    pub ec: LinearStatus,
    pub npk: NpkStatus,
}

impl From<&CalibrationSnapshot> for CalibrationStatus {
    fn from(s: &CalibrationSnapshot) -> Self {
        Self {
            device_id: s.device_id.clone(),
            complete: s.is_complete(),
            created_at: s.created_at,
            updated_at: s.updated_at,
            temperature: (&s.temperature).into(),
            humidity: (&s.humidity).into(),
            ph: (&s.ph).into(),
            ec: (&s.ec).into(),
            npk: (&s.npk).into(),
        }
    }
}

impl CalibrationStatus {
    /// Names of the sensors that still need calibrating.
    pub fn pending(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.temperature.ready {
            out.push("temperature");
        }
        if !self.humidity.ready {
            out.push("humidity");
        }
        if !self.ph.ready {
            out.push("ph");
        }
        if !self.ec.ready {
            out.push("ec");
        }
        if !self.npk.ready {
            out.push("npk");
        }
        out
    }
}
