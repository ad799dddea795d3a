//! Calibration math: least-squares fit, fit gating, offsets, interpolation
//! and outlier rejection.
//!
//! All functions are pure. Inputs are `f32` like the stored model; sums are
//! accumulated in `f64` for numerical stability.

use crate::model::{CalibrationPoint, LinearCoefficients, OffsetCalibration};
use crate::sensor::SensorKind;
use crate::table::TablePoint;

/// Default outlier threshold, in standard deviations.
pub const DEFAULT_OUTLIER_THRESHOLD: f32 = 2.0;

/// Fits whose `n·Σx² − (Σx)²` falls below this are degenerate.
pub const DEGENERATE_DENOMINATOR: f64 = 1e-6;

/// Accepted sensor gain range for a fitted slope.
pub const MIN_SLOPE: f32 = 0.1;
pub const MAX_SLOPE: f32 = 10.0;

/// Minimum R² for a fit to be accepted.
pub const MIN_R_SQUARED: f32 = 0.5;

/// Ordinary least squares with `measured` as x and `expected` as y.
///
/// Returns default (invalid) coefficients for fewer than two points or a
/// degenerate spread of measured values; never returns NaN fields.
/// `is_valid` is the verdict of [`validate_coefficients`].
pub fn calculate_linear_regression(points: &[CalibrationPoint]) -> LinearCoefficients {
    if points.len() < 2 {
        return LinearCoefficients::default();
    }

    let n = points.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xx, mut sum_xy) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for p in points {
        let x = f64::from(p.measured);
        let y = f64::from(p.expected);
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }

    let denom = n * sum_xx - sum_x * sum_x;
    if !denom.is_finite() || denom.abs() < DEGENERATE_DENOMINATOR {
        tracing::debug!(denom, "degenerate regression: measured values coincide");
        return LinearCoefficients::default();
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let (mut ss_res, mut ss_tot) = (0.0f64, 0.0f64);
    for p in points {
        let x = f64::from(p.measured);
        let y = f64::from(p.expected);
        let r = y - (slope * x + intercept);
        ss_res += r * r;
        let d = y - mean_y;
        ss_tot += d * d;
    }
    let r_squared = if ss_tot < 1e-10 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    let mut coeffs = LinearCoefficients {
        slope: slope as f32,
        intercept: intercept as f32,
        r_squared: r_squared as f32,
        is_valid: false,
    };
    if !(coeffs.slope.is_finite() && coeffs.intercept.is_finite()) {
        return LinearCoefficients::default();
    }
    coeffs.is_valid = validate_coefficients(&coeffs);
    coeffs
}

/// Gate for `is_valid`: no NaN, `0.1 <= |slope| <= 10`, `r_squared >= 0.5`.
pub fn validate_coefficients(c: &LinearCoefficients) -> bool {
    if c.slope.is_nan() || c.intercept.is_nan() || c.r_squared.is_nan() {
        return false;
    }
    let gain = c.slope.abs();
    if !(MIN_SLOPE..=MAX_SLOPE).contains(&gain) {
        return false;
    }
    c.r_squared >= MIN_R_SQUARED
}

/// `slope * raw + intercept`, or `raw` unchanged when the fit is invalid.
#[inline]
pub fn apply_calibration(raw: f32, coeffs: &LinearCoefficients) -> f32 {
    if !coeffs.is_valid {
        return raw;
    }
    coeffs.slope * raw + coeffs.intercept
}

/// `raw + offset`, or `raw` unchanged when the offset is invalid.
#[inline]
pub fn apply_offset_calibration(raw: f32, offset: &OffsetCalibration) -> f32 {
    if !offset.is_valid {
        return raw;
    }
    raw + offset.offset
}

/// Range-check one calibration pair for a known sensor.
pub fn validate_point(expected: f32, measured: f32, kind: SensorKind) -> bool {
    if !expected.is_finite() || !measured.is_finite() {
        return false;
    }
    let (lo, hi) = kind.valid_range();
    (lo..=hi).contains(&expected) && (lo..=hi).contains(&measured)
}

/// String-keyed form of [`validate_point`].
///
/// `"npk"` checks the shared N/P/K range. Unknown sensor types only get the
/// finiteness check.
pub fn validate_calibration_point(expected: f32, measured: f32, sensor_type: &str) -> bool {
    if !expected.is_finite() || !measured.is_finite() {
        return false;
    }
    if sensor_type.trim().eq_ignore_ascii_case("npk") {
        return validate_point(expected, measured, SensorKind::Nitrogen);
    }
    match sensor_type.parse::<SensorKind>() {
        Ok(kind) => validate_point(expected, measured, kind),
        Err(_) => true,
    }
}

/// Drop points whose `expected/measured` ratio lies `threshold` or more
/// population standard deviations from the mean ratio.
///
/// No-op below 3 points or when the ratios do not spread. Points with a zero
/// `measured` have no ratio and are always kept. Survivors keep their order.
/// The boundary is inclusive: a single gross outlier among `n` otherwise
/// equal ratios sits at exactly `sqrt(n - 1)` deviations.
pub fn remove_outliers(points: &mut Vec<CalibrationPoint>, threshold: f32) {
    if points.len() < 3 {
        return;
    }

    let ratios: Vec<Option<f64>> = points
        .iter()
        .map(|p| (p.measured != 0.0).then(|| f64::from(p.expected) / f64::from(p.measured)))
        .collect();
    let present: Vec<f64> = ratios.iter().flatten().copied().collect();
    if present.is_empty() {
        return;
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let var = present.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / n;
    let std_dev = var.sqrt();
    if !std_dev.is_finite() || std_dev < 1e-12 {
        return;
    }

    let limit = f64::from(threshold) * std_dev;
    let before = points.len();
    let mut it = ratios.iter();
    points.retain(|_| match it.next() {
        Some(Some(r)) => (r - mean).abs() < limit,
        _ => true,
    });
    if points.len() != before {
        tracing::debug!(
            removed = before - points.len(),
            mean_ratio = mean,
            std_dev,
            "calibration outliers removed"
        );
    }
}

/// Fit quality summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct CalibrationStats {
    pub count: usize,
    pub mean_error: f32,
    pub max_error: f32,
    pub r_squared: f32,
    pub is_reliable: bool,
}

/// Residual statistics of `coeffs` over `points`.
///
/// Errors are `|expected - (slope·measured + intercept)|`, regardless of
/// `is_valid`. Reliable iff `r_squared > 0.8` and `mean_error < 0.5`.
pub fn calibration_stats(points: &[CalibrationPoint], coeffs: &LinearCoefficients) -> CalibrationStats {
    if points.is_empty() {
        return CalibrationStats {
            r_squared: coeffs.r_squared,
            ..CalibrationStats::default()
        };
    }

    let slope = f64::from(coeffs.slope);
    let intercept = f64::from(coeffs.intercept);
    let mut sum = 0.0f64;
    let mut max = 0.0f64;
    for p in points {
        let predicted = slope * f64::from(p.measured) + intercept;
        let err = (f64::from(p.expected) - predicted).abs();
        sum += err;
        max = max.max(err);
    }
    let mean_error = (sum / points.len() as f64) as f32;
    CalibrationStats {
        count: points.len(),
        mean_error,
        max_error: max as f32,
        r_squared: coeffs.r_squared,
        is_reliable: coeffs.r_squared > 0.8 && mean_error < 0.5,
    }
}

/// Piecewise-linear table lookup.
///
/// - 0 points: `raw` unchanged
/// - 1 point: that point's reference value
/// - otherwise (ascending raw values required): interpolate inside the
///   bracketing pair; clamp flat to the first/last reference outside
pub fn interpolate(raw: f32, points: &[TablePoint]) -> f32 {
    let (first, last) = match points {
        [] => return raw,
        [only] => return only.reference_value,
        [first, .., last] => (first, last),
    };
    if raw <= first.raw_value {
        return first.reference_value;
    }
    if raw >= last.raw_value {
        return last.reference_value;
    }
    for pair in points.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if raw >= lo.raw_value && raw <= hi.raw_value {
            let span = hi.raw_value - lo.raw_value;
            if span == 0.0 {
                return lo.reference_value;
            }
            let t = (raw - lo.raw_value) / span;
            return lo.reference_value + t * (hi.reference_value - lo.reference_value);
        }
    }
    raw
}

/// True for an empty sequence or strictly increasing raw values.
pub fn validate_table_points(points: &[TablePoint]) -> bool {
    points.windows(2).all(|w| w[0].raw_value < w[1].raw_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(pairs: &[(f32, f32)]) -> Vec<CalibrationPoint> {
        pairs
            .iter()
            .map(|&(e, m)| CalibrationPoint::new(e, m, 0))
            .collect()
    }

    #[test]
    fn single_point_regression_is_invalid() {
        let c = calculate_linear_regression(&pts(&[(7.0, 6.9)]));
        assert!(!c.is_valid);
        assert_eq!(c, LinearCoefficients::default());
    }

    #[test]
    fn collinear_points_fit_exactly() {
        let c = calculate_linear_regression(&pts(&[(2.0, 1.0), (4.0, 2.0), (6.0, 3.0)]));
        assert!((c.slope - 2.0).abs() < 1e-6);
        assert!(c.intercept.abs() < 1e-6);
        assert!((c.r_squared - 1.0).abs() < 1e-6);
        assert!(c.is_valid);
    }

    #[test]
    fn flat_reference_counts_as_perfect_fit_but_fails_gain_gate() {
        // SStot == 0 -> R² defined as 1; slope 0 is rejected
        let c = calculate_linear_regression(&pts(&[(5.0, 1.0), (5.0, 2.0), (5.0, 3.0)]));
        assert_eq!(c.r_squared, 1.0);
        assert!(c.slope.abs() < 1e-6);
        assert!(!c.is_valid);
    }

    #[test]
    fn validate_coefficients_gates() {
        let ok = LinearCoefficients {
            slope: 1.0,
            intercept: 0.0,
            r_squared: 0.9,
            is_valid: false,
        };
        assert!(validate_coefficients(&ok));
        assert!(!validate_coefficients(&LinearCoefficients { slope: 0.05, ..ok }));
        assert!(!validate_coefficients(&LinearCoefficients { slope: -12.0, ..ok }));
        assert!(validate_coefficients(&LinearCoefficients { slope: -2.0, ..ok }));
        assert!(!validate_coefficients(&LinearCoefficients { r_squared: 0.49, ..ok }));
        assert!(!validate_coefficients(&LinearCoefficients { intercept: f32::NAN, ..ok }));
    }

    #[test]
    fn offset_passthrough_when_invalid() {
        let off = OffsetCalibration {
            offset: 3.0,
            is_valid: false,
            timestamp: 0,
        };
        assert_eq!(apply_offset_calibration(20.0, &off), 20.0);
        let off = OffsetCalibration::valid(3.0, 0);
        assert_eq!(apply_offset_calibration(20.0, &off), 23.0);
    }

    #[test]
    fn outliers_skip_zero_measured_points() {
        let mut p = pts(&[(1.0, 1.0), (2.0, 0.0), (2.0, 2.0), (3.0, 3.0)]);
        remove_outliers(&mut p, DEFAULT_OUTLIER_THRESHOLD);
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn outliers_noop_for_two_points() {
        let mut p = pts(&[(1.0, 1.0), (100.0, 1.0)]);
        remove_outliers(&mut p, DEFAULT_OUTLIER_THRESHOLD);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn stats_on_empty_input() {
        let s = calibration_stats(&[], &LinearCoefficients::default());
        assert_eq!(s.count, 0);
        assert!(!s.is_reliable);
    }

    #[test]
    fn interpolate_single_point_is_constant() {
        let t = [TablePoint::new(10.0, 3.0)];
        assert_eq!(interpolate(-100.0, &t), 3.0);
        assert_eq!(interpolate(100.0, &t), 3.0);
    }

    #[test]
    fn interpolate_hits_interior_knots() {
        let t = [
            TablePoint::new(0.0, 0.0),
            TablePoint::new(10.0, 20.0),
            TablePoint::new(20.0, 25.0),
        ];
        assert_eq!(interpolate(10.0, &t), 20.0);
        assert_eq!(interpolate(15.0, &t), 22.5);
    }

    #[test]
    fn table_points_must_strictly_increase() {
        assert!(validate_table_points(&[]));
        assert!(validate_table_points(&[TablePoint::new(1.0, 1.0)]));
        assert!(!validate_table_points(&[
            TablePoint::new(1.0, 1.0),
            TablePoint::new(1.0, 2.0)
        ]));
        assert!(!validate_table_points(&[
            TablePoint::new(2.0, 1.0),
            TablePoint::new(1.0, 2.0)
        ]));
    }
}
