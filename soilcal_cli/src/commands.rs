//! Subcommand execution against a filesystem-backed calibration engine.

use crate::cli::{Commands, FitSensor, OffsetSensor, PointSensor};
use eyre::WrapErr;
use std::fmt::Write as _;
use serde_json::json;
use soilcal_backends::{FsFileStore, FsKvStore};
use soilcal_config::Config;
use soilcal_core::science;
use soilcal_core::{
    CalibrationEngine, CalibrationError, CalibrationStatus, CalibrationStorage, LinearCoefficients,
    SensorKind, SensorReading, SoilProfile,
};
use soilcal_traits::SystemClock;

pub type Engine = CalibrationEngine<FsKvStore, FsFileStore, SystemClock>;

/// Primary copy under `<root>/kv/<namespace>/`, replica relative to `<root>`.
pub fn build_engine(cfg: &Config) -> Engine {
    let root = &cfg.storage.root;
    let storage = CalibrationStorage::new(
        FsKvStore::new(root.join("kv")),
        FsFileStore::new(root),
        (&cfg.storage).into(),
    );
    CalibrationEngine::new(storage, SystemClock::new(), cfg.into())
}

/// Load the `[[tables]]` entries into the engine.
///
/// A broken entry is logged and skipped so readings for other profiles keep
/// flowing. Only a failure on `required` is returned.
pub fn load_tables(
    engine: &mut Engine,
    cfg: &Config,
    required: Option<SoilProfile>,
) -> eyre::Result<usize> {
    let mut loaded = 0;
    for t in &cfg.tables {
        let Ok(profile) = t.profile.parse::<SoilProfile>() else {
            tracing::warn!(
                profile = %t.profile,
                error = %CalibrationError::UnknownProfile(t.profile.clone()),
                "skipping table"
            );
            continue;
        };
        match engine.load_calibration_table_file(profile, &t.path) {
            Ok(points) => {
                tracing::debug!(%profile, points, "table ready");
                loaded += 1;
            }
            Err(e) if required == Some(profile) => {
                return Err(e)
                    .wrap_err_with(|| format!("load {profile} table from {}", t.path.display()));
            }
            Err(e) => {
                tracing::warn!(%profile, path = %t.path.display(), error = %e, "skipping table");
            }
        }
    }
    Ok(loaded)
}

fn emit(json_mode: bool, value: &serde_json::Value, text: impl FnOnce() -> String) {
    if json_mode {
        println!("{value}");
    } else {
        println!("{}", text());
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

fn render_status(s: &CalibrationStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "device: {}  complete: {}", s.device_id, yes_no(s.complete));
    for (name, off) in [("temperature", &s.temperature), ("humidity", &s.humidity)] {
        let _ = writeln!(
            out,
            "{:<12} ready={} offset={:+.3}",
            format!("{name}:"),
            yes_no(off.ready),
            off.offset
        );
    }
    for (name, lin) in [("ph", &s.ph), ("ec", &s.ec)] {
        let _ = writeln!(
            out,
            "{:<12} ready={} points={} slope={:.4} intercept={:.4} r2={:.4}",
            format!("{name}:"),
            yes_no(lin.ready),
            lin.point_count,
            lin.coefficients.slope,
            lin.coefficients.intercept,
            lin.coefficients.r_squared
        );
    }
    let _ = write!(
        out,
        "{:<12} ready={} offsets=({:+.2}, {:+.2}, {:+.2})",
        "npk:",
        yes_no(s.npk.ready),
        s.npk.nitrogen.offset,
        s.npk.phosphorus.offset,
        s.npk.potassium.offset
    );
    let pending = s.pending();
    if !pending.is_empty() {
        let _ = write!(out, "\npending: {}", pending.join(", "));
    }
    out
}

fn render_fit(kind: SensorKind, c: &LinearCoefficients) -> String {
    format!(
        "{kind} fit accepted: slope={:.4} intercept={:.4} r2={:.4}",
        c.slope, c.intercept, c.r_squared
    )
}

fn ok_json(command: &str) -> serde_json::Value {
    json!({ "command": command, "result": "ok" })
}

pub fn dispatch(cmd: &Commands, cfg: &Config, engine: &mut Engine, json_mode: bool) -> eyre::Result<()> {
    match cmd {
        Commands::Status => {
            let status = engine.calibration_status();
            emit(json_mode, &serde_json::to_value(&status)?, || {
                render_status(&status)
            });
        }
        Commands::AddPoint {
            sensor,
            expected,
            measured,
        } => {
            let (e, m) = (*expected, *measured);
            match sensor {
                PointSensor::Temperature => engine.add_temperature_calibration_point(e, m)?,
                PointSensor::Humidity => engine.add_humidity_calibration_point(e, m)?,
                PointSensor::Ph => engine.add_ph_calibration_point(e, m)?,
                PointSensor::Ec => engine.add_ec_calibration_point(e, m)?,
            }
            let kind = SensorKind::from(*sensor);
            emit(
                json_mode,
                &json!({ "command": "add-point", "result": "ok", "sensor": kind, "expected": e, "measured": m }),
                || format!("{kind} point recorded: expected={e} measured={m}"),
            );
        }
        Commands::Fit { sensor } => {
            let (kind, coeffs) = match sensor {
                FitSensor::Ph => (SensorKind::Ph, engine.calculate_ph_calibration()?),
                FitSensor::Ec => (SensorKind::Ec, engine.calculate_ec_calibration()?),
            };
            let stats = match sensor {
                FitSensor::Ph => engine.ph_calibration_stats(),
                FitSensor::Ec => engine.ec_calibration_stats(),
            };
            emit(
                json_mode,
                &json!({ "command": "fit", "sensor": kind, "coefficients": coeffs, "stats": stats }),
                || render_fit(kind, &coeffs),
            );
        }
        Commands::SetOffset { sensor, offset } => {
            match sensor {
                OffsetSensor::Temperature => engine.set_temperature_offset(*offset)?,
                OffsetSensor::Humidity => engine.set_humidity_offset(*offset)?,
            }
            emit(json_mode, &ok_json("set-offset"), || {
                format!("offset set to {offset:+.3}")
            });
        }
        Commands::NpkZero {
            nitrogen,
            phosphorus,
            potassium,
        } => {
            engine.set_npk_calibration_point(*nitrogen, *phosphorus, *potassium)?;
            emit(json_mode, &ok_json("npk-zero"), || {
                "npk zero point recorded".to_string()
            });
        }
        Commands::NpkOffsets {
            nitrogen,
            phosphorus,
            potassium,
        } => {
            engine.set_npk_coefficients(*nitrogen, *phosphorus, *potassium)?;
            emit(json_mode, &ok_json("npk-offsets"), || {
                "npk offsets set".to_string()
            });
        }
        Commands::Reset => {
            engine.reset_calibration()?;
            emit(json_mode, &ok_json("reset"), || {
                "calibration reset".to_string()
            });
        }
        Commands::Export { out } => {
            engine.export_calibration_to_file(out)?;
            emit(json_mode, &ok_json("export"), || {
                format!("calibration exported to {}", out.display())
            });
        }
        Commands::Import { from } => {
            engine.import_calibration_from_file(from)?;
            let complete = engine.is_calibration_complete();
            emit(
                json_mode,
                &json!({ "command": "import", "result": "ok", "complete": complete }),
                || format!("calibration imported (complete: {})", yes_no(complete)),
            );
        }
        Commands::Correct {
            profile,
            temperature,
            humidity,
            ec,
            ph,
            nitrogen,
            phosphorus,
            potassium,
        } => {
            load_tables(engine, cfg, None)?;
            let raw = SensorReading {
                temperature: *temperature,
                humidity: *humidity,
                ec: *ec,
                ph: *ph,
                nitrogen: *nitrogen,
                phosphorus: *phosphorus,
                potassium: *potassium,
            };
            let source = if engine.has_calibration_table(*profile) {
                "table"
            } else {
                "device"
            };
            let corrected = engine.correct_reading(&raw, *profile);
            emit(
                json_mode,
                &json!({ "profile": profile, "source": source, "raw": raw, "corrected": corrected }),
                || {
                    let mut out = format!("profile: {profile} ({source} calibration)\n");
                    for kind in SensorKind::ALL {
                        let _ = writeln!(
                            out,
                            "{:<11} {:>10.3} -> {:>10.3}",
                            kind.name(),
                            raw.get(kind),
                            corrected.get(kind)
                        );
                    }
                    out.trim_end().to_string()
                },
            );
        }
        Commands::TableExport { profile, file } => {
            load_tables(engine, cfg, Some(*profile))?;
            let Some(csv) = engine.export_calibration_table(*profile) else {
                eyre::bail!("no calibration table configured for profile {profile}");
            };
            match file {
                Some(path) => {
                    std::fs::write(path, &csv)
                        .wrap_err_with(|| format!("write table to {}", path.display()))?;
                    emit(json_mode, &ok_json("table-export"), || {
                        format!("{profile} table written to {}", path.display())
                    });
                }
                None => print!("{csv}"),
            }
        }
        Commands::ScienceReport => {
            let report = science::validation_report();
            let crops: Vec<&str> = science::crop_names().collect();
            emit(
                json_mode,
                &json!({ "report": report, "crops": crops }),
                || {
                    format!(
                        "sources: {}/{} verified ({:.1}%)\ncrops: {} ({})\nseasons: {}\nenvironments: {}",
                        report.verified_sources,
                        report.total_sources,
                        report.compatibility_rate,
                        report.total_crops,
                        crops.join(", "),
                        report.total_seasons,
                        report.total_environments
                    )
                },
            );
        }
        Commands::CheckFormula { source, formula } => {
            if !science::validate_compensation_formula(source, formula) {
                eyre::bail!("formula does not match the reference for source {source:?}");
            }
            emit(
                json_mode,
                &json!({ "command": "check-formula", "result": "match" }),
                || "formula matches the reference".to_string(),
            );
        }
    }
    Ok(())
}
