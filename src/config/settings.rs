use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::trace::level::{ParseSeverityError, Severity};
use crate::trace::sink::JsonlSink;
use crate::util::paths::{config_path, trace_file_name, traces_dir};

/// Environment variable overriding the trace directory
pub const ENV_TRACE_DIR: &str = "ACTION_TRACE_DIR";
/// Environment variable overriding the minimum severity written to trace files
pub const ENV_TRACE_LEVEL: &str = "ACTION_TRACE_LEVEL";

/// Example configuration file contents
pub const EXAMPLE_CONFIG: &str = r#"[trace]
# Directory trace files are written to (defaults to <data_dir>/traces)
# dir = "/var/log/action-trace"

# Lowest severity written: debug, trace, http, info, warning, error, critical
level = "trace"

# File name inside the trace directory (defaults to trace-<pid>.log)
# file_name = "trace.log"
"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid trace level: {0}")]
    InvalidLevel(#[from] ParseSeverityError),
}

/// Where and what the trace sink writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Directory holding trace files
    pub trace_dir: PathBuf,
    /// Records below this severity are not written
    pub min_severity: Severity,
    /// Trace file name inside `trace_dir`
    pub file_name: String,
}

/// TOML representation of the `[trace]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTraceConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub file_name: Option<String>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub trace: Option<TomlTraceConfig>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            trace_dir: traces_dir(),
            min_severity: Severity::Trace,
            file_name: trace_file_name(std::process::id()),
        }
    }
}

impl TraceConfig {
    /// Defaults, then the config file in the data directory, then the environment
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&config_path())?.apply_env()
    }

    /// Defaults overlaid with `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let parsed: TomlConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(trace) = parsed.trace {
            config.apply_toml(trace)?;
        }
        Ok(config)
    }

    /// Overlay `ACTION_TRACE_DIR` and `ACTION_TRACE_LEVEL`
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup(ENV_TRACE_DIR).filter(|v| !v.trim().is_empty()) {
            self.trace_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_TRACE_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.min_severity = level.parse()?;
        }
        Ok(self)
    }

    fn apply_toml(&mut self, trace: TomlTraceConfig) -> Result<(), ConfigError> {
        if let Some(dir) = trace.dir {
            self.trace_dir = dir;
        }
        if let Some(level) = trace.level {
            self.min_severity = level.parse()?;
        }
        if let Some(file_name) = trace.file_name {
            self.file_name = file_name;
        }
        Ok(())
    }

    pub fn trace_file_path(&self) -> PathBuf {
        self.trace_dir.join(&self.file_name)
    }

    /// Open (creating if needed) the trace file for appending
    pub fn open_sink(&self) -> io::Result<JsonlSink> {
        let sink = JsonlSink::create(&self.trace_file_path())?.with_min_severity(self.min_severity);
        tracing::debug!(
            path = %self.trace_file_path().display(),
            level = %self.min_severity,
            "Opened trace file"
        );
        Ok(sink)
    }
}
