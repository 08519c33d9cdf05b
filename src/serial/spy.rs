//! Serial traffic spy log
//!
//! Records everything received from and sent to the device, so a failed
//! HIL run can be inspected after the fact.

use super::Endpoint;
use anyhow::{Context, Result};
use chrono::Local;
use log::warn;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Spy log file name inside the temp directory
pub const DEFAULT_SPY_FILE: &str = "serial_spy_file.txt";

/// Default spy log location
pub fn default_spy_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_SPY_FILE)
}

/// Endpoint wrapper that logs RX fragments and TX bytes to a file
pub struct SpyLog<E> {
    inner: E,
    writer: BufWriter<File>,
    path: PathBuf,
    broken: bool,
}

impl<E: Endpoint> SpyLog<E> {
    /// Wrap an endpoint, truncating any previous log at `path`
    pub fn create(inner: E, path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create spy log: {}", path.display()))?;

        Ok(Self {
            inner,
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            broken: false,
        })
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give back the wrapped endpoint
    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Whether recording stopped after a write failure
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Append a record. A failing log never interrupts the device link;
    /// recording stops after the first failure.
    fn record(&mut self, direction: &str, text: &str) {
        if self.broken {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let written = writeln!(self.writer, "[{}] {} {:?}", timestamp, direction, text)
            .and_then(|_| self.writer.flush());

        if let Err(e) = written {
            warn!(
                "spy log {} stopped recording: {}",
                self.path.display(),
                e
            );
            self.broken = true;
        }
    }
}

impl<E: Endpoint> Endpoint for SpyLog<E> {
    fn read_line(&mut self) -> io::Result<String> {
        let line = self.inner.read_line()?;
        if !line.is_empty() {
            self.record("RX", &line);
        }
        Ok(line)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.send(bytes)?;
        self.record("TX", &String::from_utf8_lossy(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    struct Canned {
        lines: VecDeque<&'static str>,
        sent: Vec<u8>,
    }

    impl Endpoint for Canned {
        fn read_line(&mut self) -> io::Result<String> {
            Ok(self.lines.pop_front().unwrap_or_default().to_string())
        }

        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_default_spy_path() {
        let path = default_spy_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.ends_with(DEFAULT_SPY_FILE));
    }

    #[test]
    fn test_records_rx_and_tx() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spy.txt");
        let inner = Canned {
            lines: VecDeque::from(vec!["Booting...\r\n", "", "nsh> "]),
            sent: Vec::new(),
        };

        let mut spy = SpyLog::create(inner, &path).unwrap();
        assert_eq!(spy.path(), path.as_path());

        assert_eq!(spy.read_line().unwrap(), "Booting...\r\n");
        assert_eq!(spy.read_line().unwrap(), "");
        spy.send(b"\n").unwrap();
        assert_eq!(spy.read_line().unwrap(), "nsh> ");

        let inner = spy.into_inner();
        assert_eq!(inner.sent, b"\n");

        let log = std::fs::read_to_string(&path).unwrap();
        let records: Vec<&str> = log.lines().collect();
        assert_eq!(records.len(), 3);
        assert!(records[0].ends_with(r#"RX "Booting...\r\n""#));
        assert!(records[1].ends_with(r#"TX "\n""#));
        assert!(records[2].ends_with(r#"RX "nsh> ""#));
    }

    #[test]
    fn test_create_fails_for_missing_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("spy.txt");
        let inner = Canned {
            lines: VecDeque::new(),
            sent: Vec::new(),
        };

        assert!(SpyLog::create(inner, &path).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_log_failure_keeps_link_alive() {
        let inner = Canned {
            lines: VecDeque::from(vec!["Booting...\n", "nsh> \n"]),
            sent: Vec::new(),
        };

        // Every write to /dev/full fails with ENOSPC
        let mut spy = SpyLog::create(inner, Path::new("/dev/full")).unwrap();
        assert!(!spy.is_broken());

        assert_eq!(spy.read_line().unwrap(), "Booting...\n");
        assert!(spy.is_broken());

        spy.send(b"\n").unwrap();
        assert_eq!(spy.read_line().unwrap(), "nsh> \n");
        assert_eq!(spy.into_inner().sent, b"\n");
    }
}
