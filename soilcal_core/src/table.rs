//! Legacy per-soil-profile calibration tables.
//!
//! A table holds one ascending sequence of `(raw, reference)` points per
//! sensor channel and is applied by piecewise-linear interpolation.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use soilcal_config::{ParsedTable, TABLE_CSV_HEADER};

use crate::error::{CalibrationError, Result};
use crate::math;
use crate::sensor::{SensorKind, SensorReading};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePoint {
    pub raw_value: f32,
    pub reference_value: f32,
}

impl TablePoint {
    pub fn new(raw_value: f32, reference_value: f32) -> Self {
        Self {
            raw_value,
            reference_value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    sequences: [Vec<TablePoint>; 7],
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from parsed CSV rows.
    ///
    /// Rows for unknown sensor types are dropped. Fails when no row survives
    /// or when a channel's raw values are not strictly increasing.
    pub fn from_parsed(parsed: &ParsedTable) -> Result<Self> {
        let mut table = Self::new();
        let mut skipped = parsed.skipped;
        for row in &parsed.rows {
            match row.sensor_type.parse::<SensorKind>() {
                Ok(kind) => table.sequences[kind.index()]
                    .push(TablePoint::new(row.raw_value, row.reference_value)),
                Err(_) => {
                    tracing::debug!(sensor_type = %row.sensor_type, "skipping row for unknown sensor");
                    skipped += 1;
                }
            }
        }
        if !table.is_valid() {
            return Err(CalibrationError::EmptyTable { skipped });
        }
        for kind in SensorKind::ALL {
            if !math::validate_table_points(table.points(kind)) {
                return Err(CalibrationError::UnorderedTable(kind));
            }
        }
        Ok(table)
    }

    /// Valid iff at least one channel has points.
    pub fn is_valid(&self) -> bool {
        self.sequences.iter().any(|s| !s.is_empty())
    }

    pub fn points(&self, kind: SensorKind) -> &[TablePoint] {
        &self.sequences[kind.index()]
    }

    pub fn point_count(&self, kind: SensorKind) -> usize {
        self.sequences[kind.index()].len()
    }

    pub fn total_points(&self) -> usize {
        self.sequences.iter().map(Vec::len).sum()
    }

    /// Correct every channel that has points; the rest pass through.
    pub fn apply(&self, reading: &SensorReading) -> SensorReading {
        let mut out = *reading;
        if !self.is_valid() {
            return out;
        }
        for kind in SensorKind::ALL {
            let pts = self.points(kind);
            if !pts.is_empty() {
                out.set(kind, math::interpolate(reading.get(kind), pts));
            }
        }
        out
    }

    /// CSV export: header, then every channel in fixed order, two decimals.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(40 + self.total_points() * 24);
        out.push_str(TABLE_CSV_HEADER);
        out.push('\n');
        for kind in SensorKind::ALL {
            for p in self.points(kind) {
                let _ = writeln!(out, "{},{:.2},{:.2}", kind, p.raw_value, p.reference_value);
            }
        }
        out
    }
}
