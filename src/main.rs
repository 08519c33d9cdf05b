//! HIL Monitor
//!
//! Watches a PX4/NuttX target's serial console right after a firmware
//! upload and exits with a status that CI can act on.
//!
//! # Usage
//!
//! ```bash
//! # Monitor the only USB UART adapter attached
//! hil-monitor
//!
//! # Monitor an explicit port at a custom baud rate
//! hil-monitor -d /dev/ttyUSB0 -b 115200
//!
//! # Use a rig settings file, without the spy log
//! hil-monitor --config rig.toml --no-spy-log
//!
//! # List available serial ports
//! hil-monitor --list-ports
//! ```
//!
//! Exit code is 0 when the NuttShell prompt is reached with no `ERROR`
//! in the boot log, non-zero otherwise.

use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use log::info;
use std::path::PathBuf;

use hil_monitor::serial::{monitor, port, spy};
use hil_monitor::Settings;

/// Serial console monitor for firmware upload checks
#[derive(Parser)]
#[command(name = "hil-monitor")]
#[command(author = "Prasanna Gautam")]
#[command(version)]
#[command(about = "Monitor a target's serial console until it reaches the NuttShell prompt")]
struct Cli {
    /// Serial device path (default: the only port matching --device-match)
    #[arg(short, long)]
    device: Option<String>,

    /// Serial port baud rate (default: 57600)
    #[arg(short, long = "baudrate")]
    baudrate: Option<u32>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pattern used to auto-detect the device
    #[arg(long)]
    device_match: Option<String>,

    /// Spy log path (default: serial_spy_file.txt in the temp directory)
    #[arg(long, conflicts_with = "no_spy_log")]
    spy_log: Option<PathBuf>,

    /// Do not record serial traffic
    #[arg(long)]
    no_spy_log: bool,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer command line flags over the settings file
    fn resolve_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load_or_default(self.config.as_deref())?;

        if let Some(ref device) = self.device {
            settings.device = Some(device.clone());
        }
        if let Some(baud) = self.baudrate {
            settings.baud_rate = baud;
        }
        if let Some(ref pattern) = self.device_match {
            settings.device_match = pattern.clone();
        }
        if let Some(ref path) = self.spy_log {
            settings.spy_log = Some(path.clone());
        }

        settings.validate()?;
        Ok(settings)
    }

    fn spy_log_path(&self, settings: &Settings) -> Option<PathBuf> {
        if self.no_spy_log {
            return None;
        }
        Some(settings.spy_log.clone().unwrap_or_else(spy::default_spy_path))
    }
}

fn resolve_device(settings: &Settings) -> Result<String> {
    if let Some(ref device) = settings.device {
        return Ok(device.clone());
    }

    match port::discover_default_device(&settings.device_match)? {
        Some(found) => {
            port::print_default_device(&found);
            Ok(found.path)
        }
        None => bail!(
            "no unique serial port matches {:?}; pass --device (see --list-ports)",
            settings.device_match
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // CI logs render ANSI, so color even when stdout is not a terminal
    colored::control::set_override(!cli.no_color);

    if cli.list_ports {
        return port::print_ports();
    }

    let settings = cli.resolve_settings()?;
    let device = resolve_device(&settings)?;
    let spy_log = cli.spy_log_path(&settings);

    println!(
        "{} {} @ {} baud (spy log: {})",
        "Serial port:".cyan().bold(),
        device.white(),
        settings.baud_rate,
        spy_log
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );

    let outcome = monitor::run_monitor(
        settings.port_config(&device),
        settings.monitor_config(),
        spy_log.as_deref(),
    )?;

    info!("exiting with code {}", outcome.exit_code());
    std::process::exit(outcome.exit_code());
}
