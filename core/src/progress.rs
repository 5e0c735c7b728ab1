//! Parsing of the transcoder's textual output.
//!
//! The only markers relied upon are `Duration: HH:MM:SS.cc` for the total
//! length and `time=HH:MM:SS.cc` for the current position.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::events::LogCategory;
use crate::utils::parse_timestamp;

static DURATION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("duration pattern is valid")
});

static TIME_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("time pattern is valid")
});

// One `key=value` pair per line, as written by `-progress`.
static PROGRESS_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+=\S*$").expect("progress key pattern is valid"));

const INFO_KEYWORDS: &[&str] = &["duration", "stream", "video:", "audio:", "input #", "output #"];

/// What to do with one line of tool output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineOutcome {
    /// New completion fraction in `[0, 1]`
    pub progress: Option<f64>,
    /// Forward the line verbatim with this category; `None` suppresses it
    pub log: Option<LogCategory>,
}

/// Tracks total and elapsed time across the lines of one job
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    total_duration: f64,
    elapsed: f64,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total length in seconds; 0 while unknown
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Parse one line of tool output
    pub fn feed(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::default();
        }

        if line.contains("Duration:") {
            // Only the first duration counts; later inputs or outputs may repeat it.
            if self.total_duration <= 0.0 {
                if let Some(total) = capture_seconds(&DURATION_MARKER, line) {
                    self.total_duration = total;
                }
            }
            return LineOutcome {
                progress: None,
                log: Some(LogCategory::Info),
            };
        }

        if line.contains("time=") {
            let mut progress = None;
            if let Some(current) = capture_seconds(&TIME_MARKER, line) {
                self.elapsed = current;
                if self.total_duration > 0.0 {
                    progress = Some((current / self.total_duration).min(1.0));
                }
            }
            let log = (!is_counter_line(line)).then_some(LogCategory::Progress);
            return LineOutcome { progress, log };
        }

        if is_counter_line(line) {
            return LineOutcome::default();
        }

        LineOutcome {
            progress: None,
            log: Some(classify(line)),
        }
    }
}

/// Per-frame statistics and `-progress` key lines, which would flood the log
pub fn is_counter_line(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("frame=") || PROGRESS_KEY.is_match(line)
}

/// Log category of a diagnostic line
pub fn classify(line: &str) -> LogCategory {
    let lower = line.to_lowercase();
    if lower.contains("error") {
        LogCategory::Error
    } else if lower.contains("warning") {
        LogCategory::Warning
    } else if INFO_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        LogCategory::Info
    } else {
        LogCategory::Generic
    }
}

fn capture_seconds(pattern: &Regex, line: &str) -> Option<f64> {
    pattern
        .captures(line)
        .and_then(|captures| parse_timestamp(&captures[1]))
}

/// Splits a byte stream into lines on `\n`, `\r\n` or a bare `\r`.
///
/// The tool rewrites its status line with carriage returns, so splitting
/// on `\n` alone would hold every status update until the job ends.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete lines found so far; a trailing partial line is kept
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Whatever is left after the stream closed
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}
