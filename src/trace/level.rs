//! Severity scale shared by action records and generic log records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log record severity.
///
/// `Trace` is reserved for action lifecycle records and the `trace_message`
/// helper. It sits between `Debug` and `Info` so a sink filtered at `Info`
/// drops it while a sink filtered at `Trace` keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Trace,
    Http,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown severity: {0}")]
pub struct ParseSeverityError(pub String);

impl Severity {
    /// All severities, lowest first
    pub const ALL: [Severity; 7] = [
        Severity::Debug,
        Severity::Trace,
        Severity::Http,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Numeric value, compatible with the conventional 10/20/30/40/50 scale
    pub fn value(self) -> u8 {
        match self {
            Severity::Debug => 10,
            Severity::Trace => 13,
            Severity::Http => 15,
            Severity::Info => 20,
            Severity::Warning => 30,
            Severity::Error => 40,
            Severity::Critical => 50,
        }
    }

    /// Upper-case name written into the `level` field
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Trace => "TRACE",
            Severity::Http => "HTTP",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Whether this is the severity reserved for action lifecycle records
    pub fn is_action_trace(self) -> bool {
        self == Severity::Trace
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let severity = match normalized.as_str() {
            "DEBUG" => Severity::Debug,
            "TRACE" => Severity::Trace,
            "HTTP" => Severity::Http,
            "INFO" => Severity::Info,
            "WARN" | "WARNING" => Severity::Warning,
            "ERROR" => Severity::Error,
            "CRITICAL" => Severity::Critical,
            _ => return Err(ParseSeverityError(s.to_string())),
        };
        Ok(severity)
    }
}

/// `tracing` levels never map to `Trace`, which belongs to action records.
/// Both `TRACE` and `DEBUG` events become `Debug`.
impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::TRACE || level == tracing::Level::DEBUG {
            Severity::Debug
        } else if level == tracing::Level::INFO {
            Severity::Info
        } else if level == tracing::Level::WARN {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}
