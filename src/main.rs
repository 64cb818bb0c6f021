//! scrcpy-fleet - keeps scrcpy mirroring sessions in sync with attached devices
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scrcpy_fleet::{inventory, Overrides, Startup};
use tracing::info;

/// scrcpy-fleet - mirror every attached Android device with scrcpy
#[derive(Parser, Debug)]
#[command(name = "sfleet", version)]
#[command(about = "Keeps scrcpy mirroring sessions in sync with attached Android devices", long_about = None)]
struct Args {
    /// Configuration directory (default: platform config dir/scrcpy-fleet)
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Settings document (default: settings.json in the config directory)
    #[arg(long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    /// Path to the scrcpy executable
    #[arg(long, value_name = "PATH", global = true)]
    scrcpy: Option<PathBuf>,

    /// Path to the adb executable
    #[arg(long, value_name = "PATH", global = true)]
    adb: Option<PathBuf>,

    /// Seconds between discovery polls
    #[arg(long, value_name = "SECS", global = true)]
    interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd {
    /// Run the engine headless: NDJSON events on stdout, commands on stdin (default)
    Run,
    /// Discover once and print the device list as JSON
    Devices,
    /// Print where scrcpy, adb and the log file are
    Tools,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            config_dir: self.config_dir.clone(),
            settings_path: self.settings.clone(),
            scrcpy: self.scrcpy.clone(),
            adb: self.adb.clone(),
            interval_secs: self.interval,
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Log to file; stdout carries NDJSON
    sfleet_core::logging::init()?;
    info!("sfleet {} starting", env!("CARGO_PKG_VERSION"));

    let startup = Startup::resolve(&args.overrides());

    match args.command.unwrap_or(Cmd::Run) {
        Cmd::Run => scrcpy_fleet::run_headless(startup).await?,
        Cmd::Devices => {
            let store = startup.settings_store();
            let devices = inventory::snapshot(&startup.adb_bridge(), &store).await;
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        Cmd::Tools => {
            let mut report = serde_json::to_value(&startup.tools)?;
            if let Ok(log_file) = sfleet_core::logging::get_current_log_file() {
                report["logFile"] = serde_json::json!(log_file);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
