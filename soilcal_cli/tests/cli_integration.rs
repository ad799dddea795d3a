use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

// Config with storage and tables inside the temp dir
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let root = dir.join("state");
    let toml = format!(
        r#"
[device]
id = "test-node"

[storage]
root = "{}"

[calibration]
outlier_threshold = 2.0
max_points = 5
{extra}
"#,
        root.display().to_string().replace('\\', "/")
    );
    let path = dir.join("soilcal.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn soilcal(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("soilcal").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

fn run_ok(cfg: &Path, args: &[&str]) -> String {
    let out = soilcal(cfg).args(args).assert().success().get_output().stdout.clone();
    String::from_utf8_lossy(&out).into_owned()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["status"], 0, "complete: no", "stdout")]
#[case(&["add-point", "--sensor", "ph", "--expected", "200", "--measured", "50"], 3, "What happened", "stderr")]
#[case(&["fit", "--sensor", "ec"], 4, "at least 2", "stderr")]
#[case(&["add-point", "--sensor", "ph"], 2, "required", "stderr")]
#[case(&["check-formula", "--source", "nope", "--formula", "x"], 1, "does not match", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    let assert = soilcal(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn full_calibration_session_persists_between_runs() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    run_ok(&cfg, &["add-point", "--sensor", "temperature", "--expected", "25", "--measured", "24.5"]);
    run_ok(&cfg, &["set-offset", "--sensor", "humidity", "--offset", "-1.5"]);
    for (e, m) in [("7.0", "6.9"), ("4.0", "4.2"), ("10.0", "9.7")] {
        run_ok(&cfg, &["add-point", "--sensor", "ph", "--expected", e, "--measured", m]);
    }
    let fit = run_ok(&cfg, &["fit", "--sensor", "ph"]);
    assert!(fit.contains("ph fit accepted"), "{fit}");
    run_ok(&cfg, &["add-point", "--sensor", "ec", "--expected", "1413", "--measured", "1380"]);
    run_ok(&cfg, &["add-point", "--sensor", "ec", "--expected", "12880", "--measured", "12500"]);
    run_ok(&cfg, &["fit", "--sensor", "ec"]);
    run_ok(&cfg, &["npk-zero", "--nitrogen", "3", "--phosphorus", "1", "--potassium", "2"]);

    let status = run_ok(&cfg, &["status"]);
    assert!(status.contains("complete: yes"), "{status}");
    assert!(dir.path().join("state/calibration.json").exists());
    assert!(dir.path().join("state/kv/calibration/snapshot.kv").exists());

    run_ok(&cfg, &["reset"]);
    let status = run_ok(&cfg, &["status"]);
    assert!(status.contains("complete: no"), "{status}");
}

#[test]
fn point_limit_comes_from_config() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    for i in 1..=5 {
        let v = format!("{}", i * 100);
        run_ok(&cfg, &["add-point", "--sensor", "ec", "--expected", &v, "--measured", &v]);
    }
    soilcal(&cfg)
        .args(["add-point", "--sensor", "ec", "--expected", "600", "--measured", "600"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already holds 5 points"));
}

#[test]
fn backup_moves_calibration_between_nodes() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    let cfg_a = write_config(a.path(), "");
    let cfg_b = write_config(b.path(), "");
    let backup = a.path().join("backup.json");

    run_ok(&cfg_a, &["set-offset", "--sensor", "temperature", "--offset", "0.75"]);
    run_ok(&cfg_a, &["export", "--out", backup.to_str().unwrap()]);
    assert!(backup.exists());

    run_ok(&cfg_b, &["import", "--from", backup.to_str().unwrap()]);
    let status = run_ok(&cfg_b, &["status"]);
    assert!(status.contains("offset=+0.750"), "{status}");

    soilcal(&cfg_b)
        .args(["import", "--from", "/nonexistent/backup.json"])
        .assert()
        .code(5);
}

#[test]
fn correct_uses_profile_table() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("loam.csv");
    fs::write(
        &csv,
        "sensor_type,raw_value,reference_value\nph,4.0,4.1\nph,7.0,7.0\nbad,row\n",
    )
    .unwrap();
    let tables = format!(
        "\n[[tables]]\nprofile = \"loam\"\npath = \"{}\"\n",
        csv.display().to_string().replace('\\', "/")
    );
    let cfg = write_config(dir.path(), &tables);

    let out = run_ok(&cfg, &["--json", "correct", "--profile", "loam", "--ph", "5.5"]);
    let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(v["source"], "table");
    assert!((v["corrected"]["ph"].as_f64().unwrap() - 5.55).abs() < 1e-4);

    let out = run_ok(&cfg, &["--json", "correct", "--profile", "clay", "--ph", "5.5"]);
    let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(v["source"], "device");
    assert!((v["corrected"]["ph"].as_f64().unwrap() - 5.5).abs() < 1e-6);

    let exported = run_ok(&cfg, &["table-export", "--profile", "loam"]);
    assert_eq!(
        exported,
        "sensor_type,raw_value,reference_value\nph,4.00,4.10\nph,7.00,7.00\n"
    );
}

fn table_entry(profile: &str, path: &Path) -> String {
    format!(
        "\n[[tables]]\nprofile = \"{profile}\"\npath = \"{}\"\n",
        path.display().to_string().replace('\\', "/")
    )
}

#[test]
fn broken_table_does_not_block_other_profiles() {
    let dir = tempdir().unwrap();
    let loam = dir.path().join("loam.csv");
    fs::write(&loam, "h\nph,7,7\nph,4,4\n").unwrap();
    let sand = dir.path().join("sand.csv");
    fs::write(&sand, "h\nph,4.0,4.1\nph,7.0,7.0\n").unwrap();
    let tables = format!(
        "{}{}{}{}",
        table_entry("loam", &loam),
        table_entry("peat", &dir.path().join("missing.csv")),
        table_entry("gravel", &sand),
        table_entry("sand", &sand)
    );
    let cfg = write_config(dir.path(), &tables);

    let out = run_ok(&cfg, &["--json", "correct", "--profile", "sand", "--ph", "5.5"]);
    let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(v["source"], "table");
    assert!((v["corrected"]["ph"].as_f64().unwrap() - 5.55).abs() < 1e-4);

    let out = run_ok(&cfg, &["--json", "correct", "--profile", "clay", "--ph", "5.5"]);
    let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(v["source"], "device");
    assert!((v["corrected"]["ph"].as_f64().unwrap() - 5.5).abs() < 1e-6);

    // The broken profile itself still gets a reading, uncorrected by its table.
    let out = run_ok(&cfg, &["--json", "correct", "--profile", "loam", "--ph", "5.5"]);
    let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(v["source"], "device");
}

#[test]
fn exporting_an_unordered_table_is_reported() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("sand.csv");
    fs::write(&csv, "h\nec,200,210\nec,100,105\n").unwrap();
    let cfg = write_config(dir.path(), &table_entry("sand", &csv));
    soilcal(&cfg)
        .args(["table-export", "--profile", "sand"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("ascending"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[calibration]\nmax_points = 1\n").unwrap();
    soilcal(&cfg)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_points"));
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("soilcal")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "missing.toml", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("device: soil-node"));
}

#[test]
fn science_report_and_formula_check() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let out = run_ok(&cfg, &["science-report"]);
    assert!(out.contains("sources: 4/5 verified"), "{out}");
    run_ok(
        &cfg,
        &[
            "check-formula",
            "--source",
            "Rhoades 1999, Soil salinity assessment",
            "--formula",
            "EC25 = ECt / (1 + 0.021 * (T - 25))",
        ],
    );
}
