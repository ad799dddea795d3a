//! Sensor channels, readings and soil profiles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The seven channels of the soil probe, in table export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Ec,
    Ph,
    Nitrogen,
    Phosphorus,
    Potassium,
}

impl SensorKind {
    pub const ALL: [SensorKind; 7] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Ec,
        SensorKind::Ph,
        SensorKind::Nitrogen,
        SensorKind::Phosphorus,
        SensorKind::Potassium,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Ec => "ec",
            SensorKind::Ph => "ph",
            SensorKind::Nitrogen => "nitrogen",
            SensorKind::Phosphorus => "phosphorus",
            SensorKind::Potassium => "potassium",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Physical range accepted for calibration inputs.
    pub fn valid_range(self) -> (f32, f32) {
        match self {
            SensorKind::Ph => (0.0, 14.0),
            SensorKind::Ec => (0.0, 20_000.0),
            SensorKind::Temperature => (-40.0, 80.0),
            SensorKind::Humidity => (0.0, 100.0),
            SensorKind::Nitrogen | SensorKind::Phosphorus | SensorKind::Potassium => {
                (0.0, 2_000.0)
            }
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        SensorKind::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| format!("unknown sensor type {s:?}"))
    }
}

/// One reading from the probe, all channels in engineering units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
    pub ec: f32,
    pub ph: f32,
    pub nitrogen: f32,
    pub phosphorus: f32,
    pub potassium: f32,
}

impl SensorReading {
    pub fn get(&self, kind: SensorKind) -> f32 {
        match kind {
            SensorKind::Temperature => self.temperature,
            SensorKind::Humidity => self.humidity,
            SensorKind::Ec => self.ec,
            SensorKind::Ph => self.ph,
            SensorKind::Nitrogen => self.nitrogen,
            SensorKind::Phosphorus => self.phosphorus,
            SensorKind::Potassium => self.potassium,
        }
    }

    pub fn set(&mut self, kind: SensorKind, value: f32) {
        let slot = match kind {
            SensorKind::Temperature => &mut self.temperature,
            SensorKind::Humidity => &mut self.humidity,
            SensorKind::Ec => &mut self.ec,
            SensorKind::Ph => &mut self.ph,
            SensorKind::Nitrogen => &mut self.nitrogen,
            SensorKind::Phosphorus => &mut self.phosphorus,
            SensorKind::Potassium => &mut self.potassium,
        };
        *slot = value;
    }
}

/// Soil deployment context. Keys both the legacy calibration tables and the
/// soil coefficient reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilProfile {
    Sand,
    Loam,
    Clay,
    Peat,
    SandPeat,
}

impl SoilProfile {
    pub const ALL: [SoilProfile; 5] = [
        SoilProfile::Sand,
        SoilProfile::Loam,
        SoilProfile::Clay,
        SoilProfile::Peat,
        SoilProfile::SandPeat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SoilProfile::Sand => "sand",
            SoilProfile::Loam => "loam",
            SoilProfile::Clay => "clay",
            SoilProfile::Peat => "peat",
            SoilProfile::SandPeat => "sandpeat",
        }
    }
}

impl fmt::Display for SoilProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoilProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        SoilProfile::ALL
            .into_iter()
            .find(|p| p.name() == lower)
            .ok_or_else(|| format!("unknown soil profile {s:?}"))
    }
}
