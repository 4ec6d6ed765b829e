// src/main.rs

//! Agent entry-point: report on (and optionally repair) the service table.
//!
//! 1. Load configuration (first argument, or `default.toml` next to the exe)
//! 2. Set up structured logging
//! 3. Build the simulated table and start the unhooker device
//! 4. Run one pass, or keep watching on the configured interval
//! 5. Drop the device, which stops its worker thread
//!
// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::Context;
use chrono::Local;
use std::{
    env,
    path::{Path, PathBuf},
};

// ───── local imports ────────────────────────────────────────────────────────
use agent::config::{self, Config};
use agent::logging::setup_logging;
use agent::monitor::Monitor;
use agent::render::render_report;
use agent::sim::Simulation;
use unhooker_driver::UnhookerDevice;

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Directory that contains the running executable.
fn exe_dir() -> anyhow::Result<PathBuf> {
    let exe = env::current_exe().context("cannot determine exe path")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable must live in some directory")
}

/// Config path from the command line, else `default.toml` next to the exe.
fn config_path() -> anyhow::Result<PathBuf> {
    match env::args_os().nth(1) {
        Some(arg) => Ok(PathBuf::from(arg)),
        None => Ok(exe_dir()?.join("default.toml")),
    }
}

// ───── agent logic ──────────────────────────────────────────────────────────

fn run(cfg: Config) -> anyhow::Result<()> {
    let sim = Simulation::from_config(&cfg.table);
    log::info!("Simulated service table: {} slot(s)", cfg.table.current.len());

    let device = UnhookerDevice::create(sim.collaborators.clone(), cfg.device.clone())
        .context("unhooker device failed to start")?;
    let monitor = Monitor::new(device, cfg.monitor.clone());

    let passes = monitor.run(|pass, outcome| {
        println!("── pass {} ──", pass);
        print!("{}", render_report(&outcome.report));
        if let Some(after) = &outcome.after {
            println!("after repair:");
            print!("{}", render_report(after));
        }
    })?;

    drop(monitor);
    log::info!(
        "Finished after {} pass(es); {} baseline context(s) outstanding",
        passes,
        sim.baseline.outstanding()
    );
    Ok(())
}

fn main() {
    // 1 ─ Configuration
    let path = config_path().unwrap_or_else(|e| fatal!("config", "{:#}", e));
    let cfg = config::load(&path).unwrap_or_else(|e| fatal!("config", "{}", e));

    // 2 ─ Logging
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    setup_logging(&base_dir, &cfg.logging).unwrap_or_else(|e| fatal!("logging", "{}", e));
    log::info!("Agent started with {:?}", path);

    // 3 ─ Passes
    if let Err(e) = run(cfg) {
        fatal!("monitor", "{:#}", e);
    }
    log::info!("Agent stopped cleanly");
}
