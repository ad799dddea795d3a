mod cli;
mod commands;
mod error_fmt;
mod logging;

use clap::Parser;
use cli::{Cli, JSON_MODE};
use eyre::WrapErr;
use soilcal_config::Config;
use std::path::Path;

/// Read and validate the config; a missing file yields defaults.
fn load_config(path: &Path) -> eyre::Result<Config> {
    let cfg = if path.exists() {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("read config {}", path.display()))?;
        soilcal_config::load_toml(&text)
            .wrap_err_with(|| format!("parse config {}", path.display()))?
    } else {
        Config::default()
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn run(cli: &Cli) -> eyre::Result<()> {
    color_eyre::install()?;
    let cfg = load_config(&cli.config)?;
    logging::init(cli.log_level.as_deref(), cli.json, &cfg.logging)?;
    if !cli.config.exists() {
        tracing::info!(path = %cli.config.display(), "config not found; using defaults");
    }

    let mut engine = commands::build_engine(&cfg);
    if let Err(e) = engine.init_storage() {
        tracing::warn!(error = %e, "calibration storage unavailable");
    }
    commands::dispatch(&cli.cmd, &cfg, &mut engine, cli.json)
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}
