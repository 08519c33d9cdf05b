//! Severity marker colorization for console lines
//!
//! Device output is annotated by wrapping known marker tokens in ANSI color
//! codes. Markers are organized in priority groups: within a group the first
//! marker found wins, and every group is evaluated on its own.

use chrono::{DateTime, Local};
use colored::{Color, Colorize};
use std::io::{self, Write};

/// Timestamp prefix format, millisecond precision local time
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A token that gets colorized when it appears in a line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub token: &'static str,
    pub color: Color,
}

impl Marker {
    const fn new(token: &'static str, color: Color) -> Self {
        Self { token, color }
    }

    /// The token wrapped in its color escape codes
    pub fn paint(&self) -> String {
        self.token.color(self.color).to_string()
    }
}

/// Severity markers. `WARNING` must come before `WARN`.
const SEVERITY: &[Marker] = &[
    Marker::new("WARNING", Color::Yellow),
    Marker::new("WARN", Color::Yellow),
    Marker::new("ERROR", Color::Red),
    Marker::new("INFO", Color::White),
];

const PASSED: &[Marker] = &[Marker::new("PASSED", Color::Green)];

const FAILED: &[Marker] = &[Marker::new("FAILED", Color::Red)];

/// Marker priority groups, applied in order
pub const MARKER_GROUPS: &[&[Marker]] = &[SEVERITY, PASSED, FAILED];

/// Colorize the first occurrence of each matched marker.
///
/// A marker that already appears in painted form counts as the group's
/// match but is left alone, so feeding the output back in changes nothing.
pub fn colorize(line: &str) -> String {
    let mut text = line.to_string();

    for group in MARKER_GROUPS {
        if let Some(marker) = group.iter().find(|m| text.contains(m.token)) {
            let painted = marker.paint();
            if !text.contains(&painted) {
                text = text.replacen(marker.token, &painted, 1);
            }
        }
    }

    text
}

/// Format a fragment for display.
///
/// Complete lines get a `[timestamp] ` prefix; partial fragments (no newline
/// yet) pass through so the rest of the line can follow on the same row.
pub fn format_line(line: &str, now: &DateTime<Local>) -> String {
    let text = colorize(line);
    if line.contains('\n') {
        format!("[{}] {}", now.format(TIMESTAMP_FORMAT), text)
    } else {
        text
    }
}

/// Write a fragment to the console, stamped with the current local time
pub fn write_line<W: Write>(out: &mut W, line: &str) -> io::Result<()> {
    write!(out, "{}", format_line(line, &Local::now()))?;
    out.flush()
}
