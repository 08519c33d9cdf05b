//! Monitor settings file (TOML) parser
//!
//! Every key is optional and falls back to the defaults used on the HIL
//! rigs. Command line flags override whatever the file says.
//!
//! ```toml
//! device = "/dev/ttyUSB0"
//! baud_rate = 57600
//! overall_timeout_secs = 300
//! terminal_markers = ["NuttShell (NSH)", "nsh>"]
//! ```

use crate::serial::monitor::{MonitorConfig, NSH_BANNER, NSH_PROMPT};
use crate::serial::port::{PortConfig, DEFAULT_BAUD, DEFAULT_DEVICE_MATCH};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest timeout accepted for any setting: one day
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Resolved monitor settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Serial device path; auto-detected when unset
    pub device: Option<String>,
    /// Pattern used to auto-detect the device
    pub device_match: String,
    /// Console baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Inter-byte timeout in milliseconds
    pub inter_byte_timeout_ms: u64,
    /// Total run deadline in seconds
    pub overall_timeout_secs: u64,
    /// Quiet period before a keepalive, in seconds
    pub keepalive_interval_secs: u64,
    /// Marker that fails the run
    pub error_marker: String,
    /// Markers that end the run
    pub terminal_markers: Vec<String>,
    /// Spy log location
    pub spy_log: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            device_match: DEFAULT_DEVICE_MATCH.to_string(),
            baud_rate: DEFAULT_BAUD,
            read_timeout_ms: 3000,
            inter_byte_timeout_ms: 1000,
            overall_timeout_secs: 180,
            keepalive_interval_secs: 10,
            error_marker: "ERROR".to_string(),
            terminal_markers: vec![NSH_BANNER.to_string(), NSH_PROMPT.to_string()],
            spy_log: None,
        }
    }
}

impl Settings {
    /// Load and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    /// Load a settings file if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Parse settings from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the monitor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            bail!("baud_rate must be non-zero");
        }
        if self.read_timeout_ms == 0 || self.inter_byte_timeout_ms == 0 {
            bail!("read timeouts must be non-zero");
        }
        if self.overall_timeout_secs == 0 || self.keepalive_interval_secs == 0 {
            bail!("overall_timeout_secs and keepalive_interval_secs must be non-zero");
        }
        let longest_ms = self.read_timeout_ms.max(self.inter_byte_timeout_ms);
        let longest_secs = self.overall_timeout_secs.max(self.keepalive_interval_secs);
        if longest_ms / 1000 > MAX_TIMEOUT_SECS || longest_secs > MAX_TIMEOUT_SECS {
            bail!("timeouts must not exceed {} seconds", MAX_TIMEOUT_SECS);
        }
        if self.error_marker.is_empty() {
            bail!("error_marker must not be empty");
        }
        if self.terminal_markers.is_empty() {
            bail!("at least one terminal marker is required");
        }
        if self.terminal_markers.iter().any(|m| m.trim().is_empty()) {
            bail!("terminal markers must not be blank");
        }
        Ok(())
    }

    /// Port configuration for the given device
    pub fn port_config(&self, device: &str) -> PortConfig {
        PortConfig::new(device)
            .with_baud_rate(self.baud_rate)
            .with_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_inter_byte_timeout(Duration::from_millis(self.inter_byte_timeout_ms))
    }

    /// Monitor loop configuration
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            overall_timeout: Duration::from_secs(self.overall_timeout_secs),
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            error_marker: self.error_marker.clone(),
            terminal_markers: self.terminal_markers.clone(),
        }
    }
}
