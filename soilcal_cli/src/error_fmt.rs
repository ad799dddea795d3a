//! Human-readable error descriptions and structured JSON error formatting.

use soilcal_core::{CalibrationError, StorageError};

/// Exit codes. clap usage errors keep clap's own code 2.
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_REJECTED_INPUT: i32 = 3;
pub const EXIT_FIT: i32 = 4;
pub const EXIT_STORAGE: i32 = 5;
pub const EXIT_TABLE: i32 = 6;

fn find_calibration_error(err: &eyre::Report) -> Option<&CalibrationError> {
    err.chain()
        .find_map(|e| e.downcast_ref::<CalibrationError>())
}

fn find_storage_error(err: &eyre::Report) -> Option<&StorageError> {
    err.chain().find_map(|e| e.downcast_ref::<StorageError>())
}

fn describe_storage(se: &StorageError) -> String {
    match se {
        StorageError::Open { namespace, reason } => format!(
            "What happened: Could not open calibration storage namespace {namespace:?} ({reason}).\nLikely causes: storage.root is not writable or the namespace name is invalid.\nHow to fix: Check [storage] in the config and the directory permissions."
        ),
        StorageError::PartialWrite { written, reason } => format!(
            "What happened: The calibration was changed but only the {written} copy was saved ({reason}).\nLikely causes: One storage location is full or read-only.\nHow to fix: Free space or fix permissions, then repeat the last command to write both copies."
        ),
        StorageError::WriteFailed { primary, replica } => format!(
            "What happened: The calibration could not be saved (key-value: {primary}; file: {replica}).\nLikely causes: storage.root is missing or read-only.\nHow to fix: Check the storage directory; the change is lost when this process exits."
        ),
        StorageError::Write { backend, reason } => format!(
            "What happened: Writing to the {backend} store failed ({reason}).\nLikely causes: The target directory is missing or read-only.\nHow to fix: Pick a writable path; the stored calibration itself is unchanged."
        ),
        StorageError::NotFound => "What happened: No calibration file was found.\nLikely causes: Wrong path passed to import, or nothing was saved yet.\nHow to fix: Check the path and try again.".to_string(),
        StorageError::Parse(msg) => format!(
            "What happened: The calibration file is not valid JSON ({msg}).\nLikely causes: The file was truncated or edited by hand.\nHow to fix: Restore it from a backup with `soilcal import --from FILE`."
        ),
        other => format!(
            "What happened: Storage error ({other}).\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for details."
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = find_calibration_error(err) {
        return match ce {
            CalibrationError::InvalidPoint {
                sensor,
                expected,
                measured,
            } => {
                let (lo, hi) = sensor.valid_range();
                format!(
                    "What happened: The {sensor} calibration point (expected {expected}, measured {measured}) was rejected.\nLikely causes: A value outside the {sensor} range [{lo}, {hi}] or a typo.\nHow to fix: Re-take the reading and pass values within range."
                )
            }
            CalibrationError::InvalidValue(what) => format!(
                "What happened: The {what} is not a finite number.\nHow to fix: Pass a plain decimal value."
            ),
            CalibrationError::TooManyPoints { sensor, max } => format!(
                "What happened: The {sensor} calibration already holds {max} points.\nLikely causes: Points from several sessions accumulated.\nHow to fix: Run `soilcal fit --sensor {sensor}` or `soilcal reset`, or raise calibration.max_points."
            ),
            CalibrationError::InsufficientPoints { sensor, have } => format!(
                "What happened: The {sensor} fit needs at least 2 usable points, found {have}.\nLikely causes: Too few points recorded, or outlier removal discarded them.\nHow to fix: Add more points with `soilcal add-point --sensor {sensor}`."
            ),
            CalibrationError::FitRejected {
                sensor,
                coefficients,
            } => format!(
                "What happened: The {sensor} fit was rejected (slope {:.4}, R² {:.4}).\nLikely causes: Mixed-up buffer solutions, a drifting probe, or points too close together.\nHow to fix: Reset and re-record points spanning the sensor range. A slope within [0.1, 10] and R² of at least 0.5 are required.",
                coefficients.slope, coefficients.r_squared
            ),
            CalibrationError::UnorderedTable(sensor) => format!(
                "What happened: The {sensor} rows of a calibration table are not in ascending raw_value order.\nHow to fix: Sort the table rows by raw_value and remove duplicates."
            ),
            CalibrationError::EmptyTable { skipped } => format!(
                "What happened: A calibration table has no usable rows ({skipped} skipped).\nLikely causes: Wrong file, or rows not in `sensor_type,raw_value,reference_value` form.\nHow to fix: Check the CSV referenced in [[tables]]."
            ),
            CalibrationError::UnknownProfile(name) => format!(
                "What happened: Unknown soil profile {name:?}.\nHow to fix: Use one of sand, loam, clay, peat, sand-peat in [[tables]].profile."
            ),
            CalibrationError::Io(msg) => format!(
                "What happened: A calibration table could not be read ({msg}).\nHow to fix: Check the path in [[tables]] and file permissions."
            ),
            CalibrationError::Parse(msg) => format!(
                "What happened: Calibration data could not be decoded ({msg}).\nHow to fix: Check that the file holds a calibration JSON object."
            ),
            CalibrationError::Storage(se) => describe_storage(se),
        };
    }
    if let Some(se) = find_storage_error(err) {
        return describe_storage(se);
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("parse config") || lower.contains("invalid configuration") {
        let cause = err
            .chain()
            .nth(1)
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid{cause}.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes by failure class.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = find_calibration_error(err) {
        return match ce {
            CalibrationError::InvalidPoint { .. }
            | CalibrationError::InvalidValue(_)
            | CalibrationError::TooManyPoints { .. } => EXIT_REJECTED_INPUT,
            CalibrationError::InsufficientPoints { .. } | CalibrationError::FitRejected { .. } => {
                EXIT_FIT
            }
            CalibrationError::Storage(_) => EXIT_STORAGE,
            CalibrationError::UnorderedTable(_)
            | CalibrationError::EmptyTable { .. }
            | CalibrationError::UnknownProfile(_)
            | CalibrationError::Io(_) => EXIT_TABLE,
            CalibrationError::Parse(_) => EXIT_GENERIC,
        };
    }
    if find_storage_error(err).is_some() {
        return EXIT_STORAGE;
    }
    EXIT_GENERIC
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match find_calibration_error(err) {
        Some(CalibrationError::InvalidPoint { .. }) => "InvalidPoint",
        Some(CalibrationError::InvalidValue(_)) => "InvalidValue",
        Some(CalibrationError::TooManyPoints { .. }) => "TooManyPoints",
        Some(CalibrationError::InsufficientPoints { .. }) => "InsufficientPoints",
        Some(CalibrationError::FitRejected { .. }) => "FitRejected",
        Some(CalibrationError::UnorderedTable(_)) => "UnorderedTable",
        Some(CalibrationError::EmptyTable { .. }) => "EmptyTable",
        Some(CalibrationError::UnknownProfile(_)) => "UnknownProfile",
        Some(CalibrationError::Io(_)) => "Io",
        Some(CalibrationError::Parse(_)) => "Parse",
        Some(CalibrationError::Storage(_)) => "Storage",
        None if find_storage_error(err).is_some() => "Storage",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(CalibrationError::FitRejected { coefficients, .. }) = find_calibration_error(err) {
        obj["details"] = json!(coefficients);
    }
    obj.to_string()
}
