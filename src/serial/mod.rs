//! Serial console access for boot monitoring
//!
//! This module provides functionality for:
//! - Opening the target's serial console and reading it line by line
//! - Discovering the default USB UART adapter
//! - Recording console traffic to a spy log
//! - Running the boot monitor loop against any [`Endpoint`]

pub mod monitor;
pub mod port;
pub mod spy;

pub use monitor::{BootMonitor, Clock, MonitorConfig, MonitorError, Outcome, SystemClock};
pub use port::{PortConfig, PortInfo, SerialConnection};
pub use spy::SpyLog;

use std::io;

/// A duplex, line-oriented connection to the device under test
pub trait Endpoint {
    /// Read one decoded line, including its `\n` terminator.
    ///
    /// Returns a partial fragment if the sender paused mid-line, and an
    /// empty string if the read timed out with no data at all.
    fn read_line(&mut self) -> io::Result<String>;

    /// Write raw bytes to the device
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<E: Endpoint + ?Sized> Endpoint for &mut E {
    fn read_line(&mut self) -> io::Result<String> {
        (**self).read_line()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }
}

impl<E: Endpoint + ?Sized> Endpoint for Box<E> {
    fn read_line(&mut self) -> io::Result<String> {
        (**self).read_line()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }
}

/// Decode console bytes as ASCII, silently dropping anything else
pub fn decode_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| char::from(b))
        .collect()
}
