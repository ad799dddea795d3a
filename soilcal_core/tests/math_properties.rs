//! Numeric properties of the calibration math.

use proptest::prelude::*;
use rstest::rstest;
use soilcal_core::math::{
    DEFAULT_OUTLIER_THRESHOLD, apply_calibration, calculate_linear_regression, interpolate,
    remove_outliers, validate_calibration_point, validate_coefficients, validate_table_points,
};
use soilcal_core::{CalibrationPoint, LinearCoefficients, TablePoint};

fn pts(pairs: &[(f32, f32)]) -> Vec<CalibrationPoint> {
    pairs
        .iter()
        .map(|&(e, m)| CalibrationPoint::new(e, m, 0))
        .collect()
}

proptest! {
    // Two points with distinct measured values define the line exactly.
    #[test]
    fn two_point_fit_is_exact(
        x1 in -100.0f32..100.0,
        dx in 0.5f32..50.0,
        y1 in -100.0f32..100.0,
        y2 in -100.0f32..100.0,
    ) {
        let x2 = x1 + dx;
        let c = calculate_linear_regression(&pts(&[(y1, x1), (y2, x2)]));
        let slope = (f64::from(y2) - f64::from(y1)) / (f64::from(x2) - f64::from(x1));
        let intercept = f64::from(y1) - slope * f64::from(x1);
        prop_assert!((f64::from(c.slope) - slope).abs() <= 1e-3 * (1.0 + slope.abs()));
        prop_assert!((f64::from(c.intercept) - intercept).abs() <= 1e-3 * (1.0 + intercept.abs()));
        prop_assert!((c.r_squared - 1.0).abs() < 1e-4);
    }

    #[test]
    fn coincident_measured_values_are_invalid(
        x in -1000.0f32..1000.0,
        ys in proptest::collection::vec(-100.0f32..100.0, 2..10),
    ) {
        let points: Vec<_> = ys.iter().map(|&y| CalibrationPoint::new(y, x, 0)).collect();
        let c = calculate_linear_regression(&points);
        prop_assert!(!c.is_valid);
        prop_assert!(c.slope.is_finite() && c.intercept.is_finite() && c.r_squared.is_finite());
    }

    #[test]
    fn invalid_coefficients_are_identity(
        raw in proptest::num::f32::ANY,
        slope in -20.0f32..20.0,
        intercept in -20.0f32..20.0,
    ) {
        let c = LinearCoefficients { slope, intercept, r_squared: 0.9, is_valid: false };
        let out = apply_calibration(raw, &c);
        prop_assert!(out.to_bits() == raw.to_bits());
    }

    #[test]
    fn interpolation_stays_within_reference_bounds(
        raw in -1000.0f32..1000.0,
        refs in proptest::collection::vec(-50.0f32..50.0, 2..8),
    ) {
        let table: Vec<_> = refs
            .iter()
            .enumerate()
            .map(|(i, &r)| TablePoint::new(i as f32 * 10.0, r))
            .collect();
        let lo = refs.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = refs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let out = interpolate(raw, &table);
        prop_assert!(out >= lo - 1e-4 && out <= hi + 1e-4);
    }
}

#[rstest]
#[case(15.0, 1.5)]
#[case(5.0, 1.0)]
#[case(25.0, 2.0)]
#[case(10.0, 1.0)]
#[case(20.0, 2.0)]
fn two_point_table_interpolates_and_clamps(#[case] raw: f32, #[case] expected: f32) {
    let table = [TablePoint::new(10.0, 1.0), TablePoint::new(20.0, 2.0)];
    assert_eq!(interpolate(raw, &table), expected);
}

#[test]
fn empty_and_single_point_tables() {
    assert_eq!(interpolate(3.3, &[]), 3.3);
    assert_eq!(interpolate(3.3, &[TablePoint::new(100.0, 7.0)]), 7.0);
}

#[test]
fn gross_outlier_is_removed_and_order_kept() {
    let mut p = pts(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0), (50.0, 5.0)]);
    remove_outliers(&mut p, DEFAULT_OUTLIER_THRESHOLD);
    let expected: Vec<f32> = p.iter().map(|c| c.expected).collect();
    assert_eq!(expected, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn consistent_points_survive_outlier_removal() {
    let mut p = pts(&[(7.0, 6.9), (4.0, 4.2), (10.0, 9.7)]);
    remove_outliers(&mut p, DEFAULT_OUTLIER_THRESHOLD);
    assert_eq!(p.len(), 3);
}

#[rstest]
#[case(200.0, 50.0, "ph", false)]
#[case(7.0, 6.8, "ph", true)]
#[case(7.0, 6.8, "PH", true)]
#[case(25.0, 90.0, "temperature", false)]
#[case(1500.0, 1400.0, "ec", true)]
#[case(2500.0, 10.0, "npk", false)]
#[case(120.0, 110.0, "npk", true)]
#[case(1e9, 1.0, "salinity", true)]
#[case(f32::NAN, 1.0, "salinity", false)]
fn calibration_point_ranges(
    #[case] expected: f32,
    #[case] measured: f32,
    #[case] sensor: &str,
    #[case] ok: bool,
) {
    assert_eq!(validate_calibration_point(expected, measured, sensor), ok);
}

#[rstest]
#[case(1.0, 0.9, true)]
#[case(0.1, 0.5, true)]
#[case(-2.0, 0.8, true)]
#[case(0.05, 0.9, false)]
#[case(12.0, 0.9, false)]
#[case(1.0, 0.49, false)]
#[case(f32::NAN, 0.9, false)]
fn coefficient_gate(#[case] slope: f32, #[case] r_squared: f32, #[case] ok: bool) {
    let c = LinearCoefficients {
        slope,
        intercept: 0.0,
        r_squared,
        is_valid: false,
    };
    assert_eq!(validate_coefficients(&c), ok);
}

#[test]
fn table_points_must_strictly_increase() {
    assert!(validate_table_points(&[]));
    assert!(validate_table_points(&[TablePoint::new(1.0, 0.0)]));
    assert!(validate_table_points(&[
        TablePoint::new(1.0, 5.0),
        TablePoint::new(2.0, 0.0)
    ]));
    assert!(!validate_table_points(&[
        TablePoint::new(1.0, 0.0),
        TablePoint::new(1.0, 1.0)
    ]));
}
