//! Boot monitor for firmware upload checks
//!
//! Reads the target console until it reaches a NuttShell prompt, with:
//! - Timestamped, colorized mirroring of every line
//! - Sticky failure once an `ERROR` marker shows up
//! - A newline keepalive after a quiet spell, to coax output from the shell
//! - A hard overall deadline that keepalives never extend

use super::{Endpoint, PortConfig, SerialConnection, SpyLog};
use crate::classify;
use anyhow::Result;
use log::{debug, info, warn};
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

/// NuttShell banner printed once the shell starts
pub const NSH_BANNER: &str = "NuttShell (NSH)";

/// NuttShell prompt
pub const NSH_PROMPT: &str = "nsh>";

/// Byte written to the device when the console has been idle
pub const KEEPALIVE: &[u8] = b"\n";

/// Message printed when the overall deadline expires
pub const TIMEOUT_MESSAGE: &str = "Error, timeout";

/// Source of monotonic time for the monitor deadlines
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Configuration for the boot monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Total time allowed to reach a terminal marker
    pub overall_timeout: Duration,
    /// Quiet period after which a keepalive is sent
    pub keepalive_interval: Duration,
    /// Marker that flags the run as failed
    pub error_marker: String,
    /// Markers that end the run (shell banner, shell prompt)
    pub terminal_markers: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            overall_timeout: Duration::from_secs(180),
            keepalive_interval: Duration::from_secs(10),
            error_marker: "ERROR".to_string(),
            terminal_markers: vec![NSH_BANNER.to_string(), NSH_PROMPT.to_string()],
        }
    }
}

impl MonitorConfig {
    /// Does this line carry the error marker
    pub fn is_error(&self, line: &str) -> bool {
        line.contains(self.error_marker.as_str())
    }

    /// Does this line show the device reached its shell
    pub fn is_terminal(&self, line: &str) -> bool {
        self.terminal_markers
            .iter()
            .any(|marker| line.contains(marker.as_str()))
    }
}

/// Accumulated run status. Once an error is seen it stays seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Clean,
    ErrorSeen,
}

/// How a monitor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Shell reached, no error marker seen
    Success,
    /// Shell reached, but an error marker was seen on the way
    ContentError,
    /// Overall deadline expired before the shell showed up
    Timeout,
}

impl Outcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::ContentError | Outcome::Timeout => -1,
        }
    }
}

impl From<ExitStatus> for Outcome {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Clean => Outcome::Success,
            ExitStatus::ErrorSeen => Outcome::ContentError,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "shell reached"),
            Outcome::ContentError => write!(f, "shell reached after errors"),
            Outcome::Timeout => write!(f, "timed out"),
        }
    }
}

/// Failures that abort a monitor run
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("serial transport failed")]
    Transport(#[source] io::Error),

    #[error("failed to write console output")]
    Console(#[source] io::Error),
}

/// Deadlines and counters for one run
#[derive(Debug)]
struct LoopState {
    status: ExitStatus,
    overall_deadline: Instant,
    idle_deadline: Instant,
    lines: usize,
    keepalives: usize,
}

impl LoopState {
    fn start(now: Instant, config: &MonitorConfig) -> Self {
        Self {
            status: ExitStatus::Clean,
            overall_deadline: now + config.overall_timeout,
            idle_deadline: now + config.keepalive_interval,
            lines: 0,
            keepalives: 0,
        }
    }

    fn record_error(&mut self) {
        self.status = ExitStatus::ErrorSeen;
    }

    fn overall_expired(&self, now: Instant) -> bool {
        now > self.overall_deadline
    }

    fn idle_expired(&self, now: Instant) -> bool {
        now > self.idle_deadline
    }

    fn reset_idle(&mut self, now: Instant, config: &MonitorConfig) {
        self.idle_deadline = now + config.keepalive_interval;
    }
}

/// Serial boot monitor over any endpoint
pub struct BootMonitor<E> {
    endpoint: E,
    config: MonitorConfig,
}

impl<E: Endpoint> BootMonitor<E> {
    /// Create a new monitor that owns the endpoint for the whole run
    pub fn new(endpoint: E, config: MonitorConfig) -> Self {
        Self { endpoint, config }
    }

    /// Monitor until the shell is reached or the deadline expires, printing to stdout
    pub fn run(&mut self) -> Result<Outcome, MonitorError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_with(&SystemClock, &mut out)
    }

    /// Monitor with an explicit clock and console
    pub fn run_with<C: Clock, W: Write>(
        &mut self,
        clock: &C,
        out: &mut W,
    ) -> Result<Outcome, MonitorError> {
        let mut state = LoopState::start(clock.now(), &self.config);

        let outcome = loop {
            let line = self.endpoint.read_line().map_err(MonitorError::Transport)?;

            if !line.is_empty() {
                state.lines += 1;

                if self.config.is_error(&line) {
                    state.record_error();
                }

                classify::write_line(out, &line).map_err(MonitorError::Console)?;

                if self.config.is_terminal(&line) {
                    break Outcome::from(state.status);
                }
                continue;
            }

            let now = clock.now();
            if state.overall_expired(now) {
                writeln!(out, "{}", TIMEOUT_MESSAGE)
                    .and_then(|_| out.flush())
                    .map_err(MonitorError::Console)?;
                warn!(
                    "no shell after {:?}, giving up",
                    self.config.overall_timeout
                );
                break Outcome::Timeout;
            }

            if state.idle_expired(now) {
                state.reset_idle(now, &self.config);
                self.endpoint
                    .send(KEEPALIVE)
                    .map_err(MonitorError::Transport)?;
                state.keepalives += 1;
                debug!("console idle, sent keepalive #{}", state.keepalives);
            }
        };

        debug!(
            "monitor finished: {} ({} lines, {} keepalives)",
            outcome, state.lines, state.keepalives
        );

        Ok(outcome)
    }
}

/// Open the console, optionally tee it into a spy log, and monitor it
pub fn run_monitor(
    port_config: PortConfig,
    config: MonitorConfig,
    spy_log: Option<&Path>,
) -> Result<Outcome> {
    let connection = SerialConnection::open(port_config)?;

    let endpoint: Box<dyn Endpoint> = match spy_log {
        Some(path) => {
            let spy = SpyLog::create(connection, path)?;
            debug!("recording serial traffic to {}", spy.path().display());
            Box::new(spy)
        }
        None => Box::new(connection),
    };

    let mut monitor = BootMonitor::new(endpoint, config);
    let outcome = monitor.run()?;
    info!("boot monitor: {}", outcome);

    Ok(outcome)
}
