//! HIL Monitor
//!
//! Watches the serial console of an embedded target while its freshly
//! uploaded firmware boots, mirrors the output to the operator with
//! colorized severity markers, and reports whether the boot reached a
//! NuttShell prompt cleanly.
//!
//! # Overview
//!
//! - [`classify`]: marker colorization and timestamped line printing
//! - [`serial::monitor`]: the bounded-time read/classify/decide loop
//! - [`serial::port`]: serial connection, port listing and default device discovery
//! - [`serial::spy`]: traffic log wrapper for any endpoint
//! - [`config`]: settings resolved from defaults and an optional TOML file
//!
//! The monitor can be embedded; it returns an [`Outcome`] instead of exiting
//! the process:
//!
//! ```no_run
//! use hil_monitor::serial::{BootMonitor, MonitorConfig, PortConfig, SerialConnection};
//!
//! # fn main() -> anyhow::Result<()> {
//! let conn = SerialConnection::open(PortConfig::new("/dev/ttyUSB0"))?;
//! let outcome = BootMonitor::new(conn, MonitorConfig::default()).run()?;
//! println!("exit code: {}", outcome.exit_code());
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod serial;

pub use config::Settings;
pub use serial::{BootMonitor, Endpoint, MonitorConfig, MonitorError, Outcome};
