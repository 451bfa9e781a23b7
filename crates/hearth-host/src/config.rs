//! Layered host configuration.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults** — [`HostConfig::default()`]
//! 2. **Config file** — `~/.hearth/config.json` or an explicit `--config`
//!    path, merged field-by-field over the defaults
//! 3. **Environment variables** — `HEARTH_*` overrides (highest priority)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON of the expected shape.
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Directories scanned for installed extensions.
    pub extension_roots: Vec<PathBuf>,
    /// Elevation front end and arguments prefixed to the worker command;
    /// empty runs the worker unelevated.
    pub elevation_command: Vec<String>,
    /// Bound on the elevated worker's connect-back wait, in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long the startup routine waits for deferred ready callbacks,
    /// in milliseconds.
    pub ready_grace_ms: u64,
    /// Log filter applied when `HEARTH_LOG` is unset.
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            extension_roots: default_extension_roots(),
            elevation_command: vec!["pkexec".to_string()],
            connect_timeout_ms: 15_000,
            ready_grace_ms: 30_000,
            log_filter: "info".to_string(),
        }
    }
}

impl HostConfig {
    /// The worker connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The ready-callback grace period as a [`Duration`].
    pub fn ready_grace(&self) -> Duration {
        Duration::from_millis(self.ready_grace_ms)
    }
}

fn default_extension_roots() -> Vec<PathBuf> {
    match std::env::var_os("HOME") {
        Some(home) => vec![PathBuf::from(home).join(".hearth").join("extensions")],
        None => vec![PathBuf::from(".hearth/extensions")],
    }
}

/// Default config file location (`~/.hearth/config.json`).
pub fn config_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".hearth").join("config.json"),
        None => PathBuf::from(".hearth/config.json"),
    }
}

/// Load configuration: defaults, then the file (if present), then
/// environment overrides.
///
/// A missing file at the default location is not an error; an explicit
/// path that cannot be read or parsed is.
pub fn load_config(explicit: Option<&Path>) -> Result<HostConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => load_file(path)?,
        None => {
            let path = config_path();
            if path.is_file() {
                load_file(&path)?
            } else {
                HostConfig::default()
            }
        }
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn load_file(path: &Path) -> Result<HostConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn apply_env_overrides(config: &mut HostConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

fn apply_overrides_from(config: &mut HostConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(roots) = var("HEARTH_EXTENSION_ROOTS") {
        config.extension_roots = std::env::split_paths(&roots).collect();
    }
    if let Some(command) = var("HEARTH_ELEVATION_COMMAND") {
        config.elevation_command = command.split_whitespace().map(String::from).collect();
    }
    if let Some(timeout) = var("HEARTH_CONNECT_TIMEOUT_MS") {
        match timeout.parse() {
            Ok(ms) => config.connect_timeout_ms = ms,
            Err(_) => warn!(value = %timeout, "ignoring non-numeric HEARTH_CONNECT_TIMEOUT_MS"),
        }
    }
    if let Some(grace) = var("HEARTH_READY_GRACE_MS") {
        match grace.parse() {
            Ok(ms) => config.ready_grace_ms = ms,
            Err(_) => warn!(value = %grace, "ignoring non-numeric HEARTH_READY_GRACE_MS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = HostConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert!(!config.extension_roots.is_empty());
    }

    #[test]
    fn file_overrides_defaults_field_by_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"connectTimeoutMs": 500}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.connect_timeout_ms, 500);
        // Unnamed fields keep their defaults.
        assert_eq!(config.ready_grace_ms, HostConfig::default().ready_grace_ms);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/no/such/config.json")));
        assert_matches!(result, Err(ConfigError::Io(_)));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{broken").unwrap();
        assert_matches!(load_config(Some(&path)), Err(ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_take_priority_over_file_values() {
        let mut config = HostConfig {
            connect_timeout_ms: 500,
            ..HostConfig::default()
        };
        apply_overrides_from(&mut config, |name| match name {
            "HEARTH_CONNECT_TIMEOUT_MS" => Some("250".to_string()),
            "HEARTH_ELEVATION_COMMAND" => Some("sudo -n".to_string()),
            _ => None,
        });
        assert_eq!(config.connect_timeout_ms, 250);
        assert_eq!(config.elevation_command, vec!["sudo", "-n"]);
    }

    #[test]
    fn non_numeric_env_override_is_ignored() {
        let mut config = HostConfig::default();
        let before = config.connect_timeout_ms;
        apply_overrides_from(&mut config, |name| {
            (name == "HEARTH_CONNECT_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert_eq!(config.connect_timeout_ms, before);
    }
}
