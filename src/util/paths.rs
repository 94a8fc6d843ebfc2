//! Path utilities for action-trace data directories

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Must be called early in main() before any other path functions are used.
/// If custom_path is None, uses the platform data directory.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

/// Platform data directory (e.g. ~/.local/share/action-trace), or
/// ./.action-trace when the platform has none
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("action-trace"))
        .unwrap_or_else(|| PathBuf::from(".action-trace"))
}

/// Get the base data directory.
/// Returns the custom path if set via init_data_dir(), otherwise the platform default
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the traces directory (<data_dir>/traces)
pub fn traces_dir() -> PathBuf {
    data_dir().join("traces")
}

/// Trace file name for one process (trace-<pid>.log)
pub fn trace_file_name(pid: u32) -> String {
    format!("trace-{pid}.log")
}

/// Get the config file path (<data_dir>/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Trace files in `dir`, newest first. A missing directory has no files.
pub fn list_trace_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_trace = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("trace") && n.ends_with(".log"));
        if !is_trace || !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        files.push((modified, path));
    }

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
